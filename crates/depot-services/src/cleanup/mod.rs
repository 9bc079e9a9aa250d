mod service;

pub use service::{CleanupHandle, CleanupService, SweepStats};
