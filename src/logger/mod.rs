//! Tracing setup with a filter that can be swapped once settings are read.
//! See `bin/logger_demo.rs` for a hand-run demonstration.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
