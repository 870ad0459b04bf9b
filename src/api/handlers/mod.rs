//! HTTP request handlers.

pub mod events;
pub mod fingerprints;
pub mod health;
pub mod stream;
