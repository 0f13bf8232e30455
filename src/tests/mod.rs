// Unit tests, one file per engine module. Each file opens with the unit it
// covers and the behaviour callers depend on.

// Test helper utilities (recording clocks, scripted operations)
pub mod helpers;

pub mod network;
pub mod notifier;
