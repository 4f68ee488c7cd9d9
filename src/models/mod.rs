//! Domain model for the classifieds backend.
//!
//! The listing aggregate owns its photos; idempotency records and audit
//! entries reference a listing by id only.

pub mod audit;
pub mod idempotency;
pub mod listing;
pub mod photo;
