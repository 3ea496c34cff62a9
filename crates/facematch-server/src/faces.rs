pub use facematch_core::faces::*;
