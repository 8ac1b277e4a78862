//! davenport — a client library for document-oriented databases.
//!
//! Presents one stable, type-safe surface (databases, result sets, change
//! feeds, bulk scans) over a pluggable backend layer, so application code
//! never depends on server-specific wire details. Backends implement the
//! contracts in [`davenport_driver`]; this crate adapts every backend feed
//! onto a single cancellable iterator core.

pub mod changes;
pub mod client;
pub mod db;
pub mod iterator;
pub mod resultset;
pub mod scan;
pub mod updates;

pub use davenport_driver as driver;
pub use davenport_driver::{Error, Options, Step, status, status_code};

pub use changes::Changes;
pub use client::Client;
pub use db::Database;
pub use iterator::{Feed, Iter, IterState};
pub use resultset::{Metadata, ResultSet};
pub use scan::{ScanDestination, scan_all_docs, scan_all_values};
pub use updates::DbUpdates;
