//! In-memory adapters that live inside the domain crate for convenience.
//!
//! These back the unit tests and the local demo binary. Real adapters
//! (S3, Azure Blob, Pub/Sub) live in separate crates.

pub mod memory;
