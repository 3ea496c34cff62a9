pub use facematch_core::errors::*;
