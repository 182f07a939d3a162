//! Store record schema
//!
//! Loosely-typed check-in and consult documents as read from the event store,
//! and the adapter that validates them into strict entities.

mod adapter;
mod raw_record;

pub use adapter::*;
pub use raw_record::*;
