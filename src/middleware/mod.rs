//! Decorator stores
//!
//! Wrappers implementing the same store contract as the stores they hold,
//! composing behavior (metrics, encryption) onto any backend.

pub mod encrypted;
pub mod metrics;

pub use encrypted::EncryptedStore;
pub use metrics::MetricsStore;
