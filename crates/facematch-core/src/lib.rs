//! Face decoding, dlib encoding and DNI/selfie comparison for the facematch service.

pub mod errors;
pub mod faces;
