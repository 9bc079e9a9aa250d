//! Outbound webhook delivery

pub mod backoff;
pub mod delivery;
pub mod signature;

pub use backoff::{Backoff, FixedJitter, JitterSource, ThreadRngJitter};
pub use delivery::{DeliveryReport, WebhookDeliveryEngine};
pub use signature::{sign_payload, verify_signature, SignatureError};
