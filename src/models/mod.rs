//! View models shared by the store capability and the browser components.
//!
//! Everything here except [`bucket::Bucket`] is recomputed per request from
//! the live contents of the object store. Nothing is cached or written back.

pub mod bucket;
pub mod listing;
pub mod object;
