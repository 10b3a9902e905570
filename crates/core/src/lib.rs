//! Domain types for batch document conversion jobs.
//!
//! Everything in this crate is pure: job identity, per-file status
//! classification, batch summaries and the completion predicate, plus
//! the naming rules used for uploaded and downloaded files. Network and
//! scheduling concerns live in `batchconv-client`.

pub mod batch;
pub mod error;
pub mod naming;
pub mod status;
pub mod types;
