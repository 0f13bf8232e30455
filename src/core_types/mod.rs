//! Core data model for the recovery engine
//!
//! ## Organization
//! - `errors` - Classified error values and the kind/severity taxonomy
//! - `context` - Provenance attached at the call boundary
//! - `outcome` - Results of scheduled operations

pub mod context;
pub mod errors;
pub mod outcome;

pub use context::{ContextDefaults, ContextOverrides, ErrorContext};
pub use errors::{AppError, ErrorKind, ErrorSeverity};
pub use outcome::{RecoveryResult, RecoverySummary};
