//! Core domain model for ritornello.
//!
//! This crate defines the canonical play record, the durable history
//! store (a CSV file plus a gzipped JSON snapshot), and the core error
//! type shared by the sync pipeline.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod store;

pub use error::{Error, Result};
pub use model::{assign_entry_ids, PlayRecord};
pub use store::{HistoryStore, StoredHistory};
