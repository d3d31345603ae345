//! In-process adapters that live inside the domain crate for convenience.
//!
//! These back unit tests, the console demo and the `memory` storage mode of
//! the server. The durable adapter lives in `adapters/sqlite-adapter`.

pub mod memory_repo;
