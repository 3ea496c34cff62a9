//! HTTP service and CLI that compare identity-document photos against selfies.

pub mod cli;
pub mod commands;
pub mod errors;
pub mod faces;
pub mod http;
pub mod output;
pub mod settings;
pub mod worker;
