//! The cancellable iterator core.
//!
//! Every streaming type in this crate (query rows, changes, database
//! updates) is built by adapting its backend feed onto [`Iter`], which owns
//! the advance/close state machine, the sticky error, and the race between a
//! blocking fetch and the caller's cancellation scope.

use async_trait::async_trait;
use davenport_driver::{Error, Step};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A backend data source adapted to the iterator core.
///
/// `next` may block (e.g. on network I/O). A feed is exclusively owned by one
/// [`Iter`] and is closed exactly once, by the core.
#[async_trait]
pub trait Feed: Send + Sync + 'static {
    type Item: Send + Sync + 'static;

    async fn next(&mut self) -> Result<Step<Self::Item>, Error>;

    async fn close(&mut self) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// No value fetched yet.
    Init,
    /// A value is fetched and available for reading.
    RowReady,
    /// The current query is exhausted; more queries may follow.
    EndOfQuery,
    /// The caller asked to begin the next query of a multi-query feed.
    ResultSetReady,
    /// Terminal. The feed has been closed and no transition follows.
    Closed,
}

type CloseHook = Box<dyn FnOnce() + Send + Sync + 'static>;

struct IterInner<F: Feed> {
    feed: Option<F>,
    state: IterState,
    current: Option<F::Item>,
    last_err: Option<Error>,
    on_close: Option<CloseHook>,
}

/// The iterator core.
///
/// A single exclusive lock linearizes state transitions (`advance`,
/// `next_result_set`, `close`); shared acquisitions of the same lock serve
/// pure reads, so concurrent inspections of the current value may proceed
/// together but never overlap a transition.
pub struct Iter<F: Feed> {
    inner: RwLock<IterInner<F>>,
    cancel: CancellationToken,
}

impl<F: Feed> Iter<F> {
    pub fn new(feed: F, cancel: CancellationToken) -> Self {
        Self::build(feed, cancel, None)
    }

    /// A core whose `on_close` hook fires exactly once when the iterator
    /// reaches [`IterState::Closed`], however that happens. Used to release
    /// per-stream resources such as an in-flight-query slot.
    pub fn with_close_hook(feed: F, cancel: CancellationToken, on_close: CloseHook) -> Self {
        Self::build(feed, cancel, Some(on_close))
    }

    fn build(feed: F, cancel: CancellationToken, on_close: Option<CloseHook>) -> Self {
        Self {
            inner: RwLock::new(IterInner {
                feed: Some(feed),
                state: IterState::Init,
                current: None,
                last_err: None,
                on_close,
            }),
            cancel,
        }
    }

    pub async fn state(&self) -> IterState {
        self.inner.read().await.state
    }

    /// The sticky terminal error, if any. Once set it is never cleared.
    pub async fn err(&self) -> Option<Error> {
        self.inner.read().await.last_err.clone()
    }

    /// Fetches the next item, returning `true` when one is available.
    ///
    /// Returns `false` at the end of the data, at a query boundary (call
    /// [`Iter::next_result_set`] to continue), or on error; consult
    /// [`Iter::err`] to tell the cases apart. The fetch races the
    /// cancellation scope: when the scope fires first the in-flight fetch is
    /// abandoned, its result discarded, and the feed closed on a detached
    /// task so this call returns promptly.
    pub async fn advance(&self) -> bool {
        let mut inner = self.inner.write().await;
        self.advance_locked(&mut inner).await
    }

    async fn advance_locked(&self, inner: &mut IterInner<F>) -> bool {
        if inner.last_err.is_some() {
            return false;
        }
        match inner.state {
            IterState::Closed | IterState::EndOfQuery => return false,
            IterState::Init | IterState::RowReady | IterState::ResultSetReady => {}
        }
        let Some(mut feed) = inner.feed.take() else {
            inner.state = IterState::Closed;
            return false;
        };

        // Cancellation wins the race even when the fetch is also ready.
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            step = feed.next() => Some(step),
        };

        match fetched {
            None => {
                debug!("cancellation scope fired; abandoning in-flight fetch");
                inner.last_err = Some(Error::cancelled("operation cancelled by caller"));
                inner.state = IterState::Closed;
                inner.current = None;
                tokio::spawn(async move {
                    if let Err(err) = feed.close().await {
                        warn!(%err, "closing feed after cancellation failed");
                    }
                });
                fire_close_hook(inner);
                false
            }
            Some(Ok(Step::Item(item))) => {
                inner.current = Some(item);
                inner.state = IterState::RowReady;
                inner.feed = Some(feed);
                true
            }
            Some(Ok(Step::EndOfQuery)) => {
                inner.state = IterState::EndOfQuery;
                inner.feed = Some(feed);
                false
            }
            Some(Ok(Step::EndOfData)) => {
                let _ = shutdown(inner, feed).await;
                false
            }
            Some(Err(err)) => {
                debug!(%err, "feed fetch failed; closing iterator");
                inner.last_err = Some(err);
                let _ = shutdown(inner, feed).await;
                false
            }
        }
    }

    /// Prepares the next result set of a multi-query feed for reading.
    ///
    /// Fails, recording a sticky error, when a fetched row has not been
    /// consumed yet.
    pub async fn next_result_set(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.last_err.is_some() {
            return false;
        }
        match inner.state {
            IterState::Closed => false,
            IterState::RowReady => {
                inner.last_err = Some(Error::bad_request(
                    "next_result_set called with an unread row pending",
                ));
                false
            }
            _ => {
                inner.state = IterState::ResultSetReady;
                true
            }
        }
    }

    /// Closes the iterator. Idempotent; an already-recorded error is
    /// preserved, and the feed's close error is recorded only when no
    /// earlier error exists. The first call returns the feed's close result;
    /// subsequent calls return `Ok(())`.
    pub async fn close(&self) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        match inner.feed.take() {
            Some(feed) => shutdown(&mut inner, feed).await,
            None => {
                inner.state = IterState::Closed;
                fire_close_hook(&mut inner);
                Ok(())
            }
        }
    }

    /// Reads the current item under a shared lock.
    ///
    /// From [`IterState::Init`] this is the one-shot convenience access: one
    /// implicit [`Iter::advance`], one implicit [`Iter::close`], then the
    /// fetched value — after which the iterator is fully consumed.
    pub async fn with_current<R>(&self, read: impl FnOnce(&F::Item) -> R) -> Result<R, Error> {
        self.make_ready().await;
        let inner = self.inner.read().await;
        match inner.current.as_ref() {
            Some(item) => Ok(read(item)),
            None => Err(no_current_row(&inner)),
        }
    }

    /// Like [`Iter::with_current`], but exclusive, for accessors that consume
    /// the item's payload.
    pub async fn with_current_mut<R>(
        &self,
        read: impl FnOnce(&mut F::Item) -> R,
    ) -> Result<R, Error> {
        self.make_ready().await;
        let mut inner = self.inner.write().await;
        match inner.current.as_mut() {
            Some(item) => Ok(read(item)),
            None => Err(no_current_row(&inner)),
        }
    }

    /// From [`IterState::Init`], the implicit advance and close run under one
    /// exclusive acquisition, so concurrent first-time accessors observe
    /// exactly one implicit advance.
    async fn make_ready(&self) {
        let mut inner = self.inner.write().await;
        if inner.state != IterState::Init {
            return;
        }
        self.advance_locked(&mut inner).await;
        match inner.feed.take() {
            Some(feed) => {
                let _ = shutdown(&mut inner, feed).await;
            }
            None => {
                inner.state = IterState::Closed;
                fire_close_hook(&mut inner);
            }
        }
    }
}

fn no_current_row<F: Feed>(inner: &IterInner<F>) -> Error {
    inner
        .last_err
        .clone()
        .unwrap_or_else(|| Error::not_found("no rows in result set"))
}

fn fire_close_hook<F: Feed>(inner: &mut IterInner<F>) {
    if let Some(hook) = inner.on_close.take() {
        hook();
    }
}

/// Closes the feed, recording its error only when none exists yet, and fires
/// the close hook.
async fn shutdown<F: Feed>(inner: &mut IterInner<F>, mut feed: F) -> Result<(), Error> {
    inner.state = IterState::Closed;
    let result = feed.close().await;
    if let Err(err) = &result {
        if inner.last_err.is_none() {
            inner.last_err = Some(err.clone());
        }
    }
    fire_close_hook(inner);
    result
}
