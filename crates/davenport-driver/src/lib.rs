//! Backend contract for the davenport document-database client.
//!
//! A concrete backend ("driver") implements [`Client`] and the feed traits in
//! this crate; application code talks only to the `davenport` crate, which
//! adapts these contracts onto its iterator machinery. Feeds may block on
//! network I/O and make no concurrency guarantees of their own: each feed is
//! exclusively owned by one consumer and closed exactly once.

pub mod error;
pub mod options;
pub mod types;

pub use error::{Error, status, status_code};
pub use options::Options;
pub use types::{Change, DbUpdate, Row, Step, Version};

use async_trait::async_trait;

/// A connection to a document-database server.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    async fn version(&self) -> Result<Version, Error>;

    async fn all_dbs(&self, options: &Options) -> Result<Vec<String>, Error>;

    async fn db_exists(&self, name: &str) -> Result<bool, Error>;

    async fn create_db(&self, name: &str, options: &Options) -> Result<(), Error>;

    async fn destroy_db(&self, name: &str) -> Result<(), Error>;

    async fn db(&self, name: &str, options: &Options) -> Result<Box<dyn Database>, Error>;

    /// Opens the server-wide database updates feed. Optional capability;
    /// backends that do not support it inherit the 501 default.
    async fn db_updates(&self, options: &Options) -> Result<Box<dyn DbUpdates>, Error> {
        let _ = options;
        Err(Error::not_implemented(
            "driver does not support the database updates feed",
        ))
    }
}

/// A handle to one database on the server.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn all_docs(&self, options: &Options) -> Result<Box<dyn Rows>, Error>;

    /// Executes a view query. A single request may carry several queries, in
    /// which case the feed separates them with [`Step::EndOfQuery`].
    async fn query(
        &self,
        ddoc: &str,
        view: &str,
        options: &Options,
    ) -> Result<Box<dyn Rows>, Error>;

    /// Executes a declarative (Mango-style) find. Optional capability.
    async fn find(
        &self,
        selector: serde_json::Value,
        options: &Options,
    ) -> Result<Box<dyn Rows>, Error> {
        let _ = (selector, options);
        Err(Error::not_implemented("driver does not support find"))
    }

    /// Opens the document changes feed for this database. Optional capability.
    async fn changes(&self, options: &Options) -> Result<Box<dyn Changes>, Error> {
        let _ = options;
        Err(Error::not_implemented(
            "driver does not support the changes feed",
        ))
    }
}

/// The row feed backing a query result set.
///
/// The metadata reporters are optional capabilities: `None` means the backend
/// does not supply the figure, and the client leaves the corresponding
/// metadata field at its zero value. Reporters are only consulted after the
/// feed signals [`Step::EndOfQuery`] or [`Step::EndOfData`], since many
/// backends only reveal the figures at the end of the stream.
#[async_trait]
pub trait Rows: Send + Sync + 'static {
    async fn next(&mut self) -> Result<Step<Row>, Error>;

    /// Releases the underlying resources, unblocking any in-flight fetch.
    async fn close(&mut self) -> Result<(), Error>;

    fn offset(&self) -> Option<u64> {
        None
    }

    fn total_rows(&self) -> Option<u64> {
        None
    }

    fn update_seq(&self) -> Option<String> {
        None
    }

    fn warning(&self) -> Option<String> {
        None
    }

    fn bookmark(&self) -> Option<String> {
        None
    }

    /// Index of the query the current rows belong to, for multi-query
    /// requests.
    fn query_index(&self) -> Option<usize> {
        None
    }
}

/// The feed backing a database changes stream.
#[async_trait]
pub trait Changes: Send + Sync + 'static {
    async fn next(&mut self) -> Result<Step<Change>, Error>;

    async fn close(&mut self) -> Result<(), Error>;

    /// The last sequence id seen, reported once the feed is exhausted.
    fn last_seq(&self) -> Option<String> {
        None
    }

    /// Changes remaining on the server after this feed ended.
    fn pending(&self) -> Option<u64> {
        None
    }
}

/// The feed backing the server-wide database updates stream.
#[async_trait]
pub trait DbUpdates: Send + Sync + 'static {
    async fn next(&mut self) -> Result<Step<DbUpdate>, Error>;

    async fn close(&mut self) -> Result<(), Error>;
}
