//! The database handle: opens row and change feeds against one database.

use crate::changes::Changes;
use crate::client::StreamCounter;
use crate::resultset::ResultSet;
use davenport_driver::{self as driver, Error, Options};
use tokio_util::sync::CancellationToken;

/// A handle to one database on the server.
///
/// Every method opening a stream takes the caller's cancellation scope;
/// cancelling it aborts the stream's next fetch with bounded latency and
/// releases the underlying query resources.
pub struct Database {
    name: String,
    driver: Box<dyn driver::Database>,
    streams: StreamCounter,
}

impl Database {
    pub(crate) fn new(
        name: impl Into<String>,
        driver: Box<dyn driver::Database>,
        streams: StreamCounter,
    ) -> Self {
        Self {
            name: name.into(),
            driver,
            streams,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Streams all documents in the database.
    pub async fn all_docs(
        &self,
        cancel: CancellationToken,
        options: &Options,
    ) -> Result<ResultSet, Error> {
        let rows = self.driver.all_docs(options).await?;
        Ok(ResultSet::with_close_hook(
            rows,
            cancel,
            self.streams.begin(),
        ))
    }

    /// Executes a view query. With a batched multi-query request the result
    /// set separates the queries; see [`ResultSet::next_result_set`].
    pub async fn query(
        &self,
        ddoc: &str,
        view: &str,
        cancel: CancellationToken,
        options: &Options,
    ) -> Result<ResultSet, Error> {
        let rows = self.driver.query(ddoc, view, options).await?;
        Ok(ResultSet::with_close_hook(
            rows,
            cancel,
            self.streams.begin(),
        ))
    }

    /// Executes a declarative (Mango-style) find against the database.
    /// Returns a 501 error for backends without the capability.
    pub async fn find(
        &self,
        selector: serde_json::Value,
        cancel: CancellationToken,
        options: &Options,
    ) -> Result<ResultSet, Error> {
        let rows = self.driver.find(selector, options).await?;
        Ok(ResultSet::with_close_hook(
            rows,
            cancel,
            self.streams.begin(),
        ))
    }

    /// Opens the document changes feed. Returns a 501 error for backends
    /// without the capability.
    pub async fn changes(
        &self,
        cancel: CancellationToken,
        options: &Options,
    ) -> Result<Changes, Error> {
        let changes = self.driver.changes(options).await?;
        Ok(Changes::with_close_hook(
            changes,
            cancel,
            self.streams.begin(),
        ))
    }
}
