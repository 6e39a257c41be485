pub mod error;
pub mod logger;
pub mod monitor;
pub mod preflight;
pub mod redact;
pub mod validation;
