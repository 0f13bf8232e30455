//! Internal utilities for error-recovery
//!
//! Implementation details that are not part of the public API surface. The
//! clock types are re-exported through `lib.rs`.

pub mod clock;
