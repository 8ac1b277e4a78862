//! The server-wide database updates feed, adapted onto the iterator core.

use crate::iterator::{Feed, Iter};
use async_trait::async_trait;
use davenport_driver::{self as driver, DbUpdate, Error, Step};
use tokio_util::sync::CancellationToken;

struct UpdatesFeed {
    updates: Box<dyn driver::DbUpdates>,
}

#[async_trait]
impl Feed for UpdatesFeed {
    type Item = DbUpdate;

    async fn next(&mut self) -> Result<Step<DbUpdate>, Error> {
        self.updates.next().await
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.updates.close().await
    }
}

/// An iterator over server-wide database lifecycle events.
pub struct DbUpdates {
    iter: Iter<UpdatesFeed>,
}

impl DbUpdates {
    pub fn new(updates: Box<dyn driver::DbUpdates>, cancel: CancellationToken) -> Self {
        Self {
            iter: Iter::new(UpdatesFeed { updates }, cancel),
        }
    }

    pub(crate) fn with_close_hook(
        updates: Box<dyn driver::DbUpdates>,
        cancel: CancellationToken,
        on_close: Box<dyn FnOnce() + Send + Sync + 'static>,
    ) -> Self {
        Self {
            iter: Iter::with_close_hook(UpdatesFeed { updates }, cancel, on_close),
        }
    }

    pub async fn advance(&self) -> bool {
        self.iter.advance().await
    }

    pub async fn err(&self) -> Option<Error> {
        self.iter.err().await
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.iter.close().await
    }

    /// Database name of the current update.
    pub async fn db_name(&self) -> Option<String> {
        self.iter.with_current(|u| u.db_name.clone()).await.ok()
    }

    /// Kind of the current update: "created", "updated", or "deleted".
    pub async fn kind(&self) -> Option<String> {
        self.iter.with_current(|u| u.kind.clone()).await.ok()
    }

    /// Update sequence of the current update.
    pub async fn seq(&self) -> Option<String> {
        self.iter
            .with_current(|u| u.seq.clone())
            .await
            .ok()
            .flatten()
    }
}
