//! Domain models.

pub mod analysis;
pub mod event;
pub mod evidence;
pub mod fingerprint;
pub mod triage;
