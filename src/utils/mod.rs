//! Utils Module
pub mod logging;
pub mod truncate;

pub use logging::{init_logging, LoggingGuard};
pub use truncate::{truncate_text, TruncationPolicy};
