#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod references;
pub mod session;
pub mod stream;
pub mod transport;

pub use config::ClientConfig;
pub use errors::{AppError, Result};
