//! The client handle: thin orchestration over a backend driver, plus
//! tracking of in-flight streams.

use crate::db::Database;
use crate::updates::DbUpdates;
use davenport_driver::{self as driver, Error, Options, Version};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

lazy_static! {
    // Database name grammar per the CouchDB API reference.
    static ref VALID_DB_NAME: Regex =
        Regex::new("^[a-z][a-z0-9_$()+/-]*$").expect("database name pattern");
}

/// Counts streams (result sets, feeds) currently open against a server.
///
/// Each stream decrements the counter through its iterator close hook, which
/// fires exactly once however the stream ends.
#[derive(Clone, Default)]
pub(crate) struct StreamCounter(Arc<AtomicUsize>);

impl StreamCounter {
    pub(crate) fn begin(&self) -> Box<dyn FnOnce() + Send + Sync + 'static> {
        self.0.fetch_add(1, Ordering::SeqCst);
        let counter = self.0.clone();
        Box::new(move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        })
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A client connection handle to a document-database server.
pub struct Client {
    driver: Arc<dyn driver::Client>,
    streams: StreamCounter,
}

impl Client {
    pub fn new(client: impl driver::Client) -> Self {
        Self {
            driver: Arc::new(client),
            streams: StreamCounter::default(),
        }
    }

    /// Version and vendor information reported by the server.
    pub async fn version(&self) -> Result<Version, Error> {
        self.driver.version().await
    }

    /// Lists all databases on the server.
    pub async fn all_dbs(&self, options: &Options) -> Result<Vec<String>, Error> {
        self.driver.all_dbs(options).await
    }

    pub async fn db_exists(&self, name: &str) -> Result<bool, Error> {
        self.driver.db_exists(name).await
    }

    /// Creates a database, validating the name against the server's
    /// database-name grammar first.
    pub async fn create_db(&self, name: &str, options: &Options) -> Result<(), Error> {
        if !VALID_DB_NAME.is_match(name) {
            return Err(Error::bad_request(format!("invalid database name: {name}")));
        }
        debug!(name, "creating database");
        self.driver.create_db(name, options).await
    }

    pub async fn destroy_db(&self, name: &str) -> Result<(), Error> {
        debug!(name, "destroying database");
        self.driver.destroy_db(name).await
    }

    /// A handle to the named database.
    pub async fn db(&self, name: &str) -> Result<Database, Error> {
        let db = self.driver.db(name, &Options::new()).await?;
        Ok(Database::new(name, db, self.streams.clone()))
    }

    /// Opens the server-wide database updates feed. Returns a 501 error for
    /// backends without the capability.
    pub async fn db_updates(
        &self,
        cancel: CancellationToken,
        options: &Options,
    ) -> Result<DbUpdates, Error> {
        let updates = self.driver.db_updates(options).await?;
        Ok(DbUpdates::with_close_hook(
            updates,
            cancel,
            self.streams.begin(),
        ))
    }

    /// Number of streams currently open against this client.
    pub fn in_flight(&self) -> usize {
        self.streams.count()
    }
}
