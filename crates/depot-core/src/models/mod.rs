//! Data models for the processing and delivery core
//!
//! Each sub-module represents one entity family: stored files, webhooks and
//! their deliveries, and the job payloads carried by the broker.

mod file;
mod job;
mod webhook;

pub use file::*;
pub use job::*;
pub use webhook::*;
