//! The document changes feed, adapted onto the iterator core.

use crate::iterator::{Feed, Iter, IterState};
use async_trait::async_trait;
use davenport_driver::{self as driver, Change, Error, Step, status};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Figures some backends report only once the changes feed ends.
#[derive(Debug, Clone, Default)]
struct FeedFinish {
    last_seq: Option<String>,
    pending: Option<u64>,
}

type FinishSlot = Arc<Mutex<Option<FeedFinish>>>;

struct ChangesFeed {
    changes: Box<dyn driver::Changes>,
    finish: FinishSlot,
}

#[async_trait]
impl Feed for ChangesFeed {
    type Item = Change;

    async fn next(&mut self) -> Result<Step<Change>, Error> {
        let step = self.changes.next().await?;
        if matches!(step, Step::EndOfData) {
            let snapshot = FeedFinish {
                last_seq: self.changes.last_seq(),
                pending: self.changes.pending(),
            };
            *lock_slot(&self.finish) = Some(snapshot);
        }
        Ok(step)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.changes.close().await
    }
}

fn lock_slot(slot: &FinishSlot) -> std::sync::MutexGuard<'_, Option<FeedFinish>> {
    slot.lock().expect("changes finish lock poisoned")
}

/// An iterator over the changes to a database's documents.
///
/// Calling an accessor before the first [`Changes::advance`] performs the
/// one-shot convenience access: the first change is fetched and the feed is
/// closed.
pub struct Changes {
    iter: Iter<ChangesFeed>,
    finish: FinishSlot,
}

impl Changes {
    pub fn new(changes: Box<dyn driver::Changes>, cancel: CancellationToken) -> Self {
        Self::build(changes, cancel, None)
    }

    pub(crate) fn with_close_hook(
        changes: Box<dyn driver::Changes>,
        cancel: CancellationToken,
        on_close: Box<dyn FnOnce() + Send + Sync + 'static>,
    ) -> Self {
        Self::build(changes, cancel, Some(on_close))
    }

    fn build(
        changes: Box<dyn driver::Changes>,
        cancel: CancellationToken,
        on_close: Option<Box<dyn FnOnce() + Send + Sync + 'static>>,
    ) -> Self {
        let finish: FinishSlot = Arc::new(Mutex::new(None));
        let feed = ChangesFeed {
            changes,
            finish: finish.clone(),
        };
        let iter = match on_close {
            Some(hook) => Iter::with_close_hook(feed, cancel, hook),
            None => Iter::new(feed, cancel),
        };
        Self { iter, finish }
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

    /// Document id of the current change.
    pub async fn id(&self) -> Option<String> {
        self.iter.with_current(|c| c.id.clone()).await.ok()
    }

    /// Sequence id of the current change.
    pub async fn seq(&self) -> Option<String> {
        self.iter
            .with_current(|c| c.seq.clone())
            .await
            .ok()
            .flatten()
    }

    /// Whether the current change deleted the document.
    pub async fn deleted(&self) -> bool {
        self.iter
            .with_current(|c| c.deleted)
            .await
            .unwrap_or(false)
    }

    /// Revisions changed by the current change.
    pub async fn changes(&self) -> Vec<String> {
        self.iter
            .with_current(|c| c.changes.clone())
            .await
            .unwrap_or_default()
    }

    /// Decodes the changed document, consuming its payload. Fails with a 400
    /// when the feed was not opened with `include_docs`.
    pub async fn scan_doc<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.iter
            .with_current_mut(|change| match change.doc.take() {
                Some(doc) => serde_json::from_str(doc.get()).map_err(|err| {
                    Error::wrap(status::BAD_REQUEST, "failed to decode changed document", err)
                }),
                None => Err(Error::bad_request(
                    "no document in change; was the feed opened with include_docs?",
                )),
            })
            .await?
    }

    /// The last sequence id reported by the backend, available once the feed
    /// is exhausted.
    pub async fn last_seq(&self) -> Result<Option<String>, Error> {
        self.finish().await.map(|finish| finish.last_seq)
    }

    /// Changes remaining on the server after this feed ended, when reported.
    pub async fn pending(&self) -> Result<Option<u64>, Error> {
        self.finish().await.map(|finish| finish.pending)
    }

    async fn finish(&self) -> Result<FeedFinish, Error> {
        match self.iter.state().await {
            IterState::Closed => Ok(lock_slot(&self.finish).clone().unwrap_or_default()),
            _ => Err(Error::bad_request(
                "feed figures are not available until the changes feed is exhausted",
            )),
        }
    }
}
