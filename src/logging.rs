//! Logging utilities for error-recovery
//!
//! Re-exports tracing macros under log_* names. The library never installs a
//! subscriber; host applications decide where events go.

pub use tracing::{debug as log_debug, error as log_error, info as log_info, warn as log_warn};
