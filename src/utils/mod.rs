//! Logging setup, developer traces and integer conversions.
pub mod devlog;
pub mod logger;
pub mod num;
