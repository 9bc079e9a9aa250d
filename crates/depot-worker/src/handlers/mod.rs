//! Handlers for the job kinds Depot runs

pub mod transform;
pub mod webhook;
