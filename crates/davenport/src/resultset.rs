//! Paged query results: the [`ResultSet`] built on the iterator core, with
//! per-query metadata and typed decode-on-demand accessors.

use crate::iterator::{Feed, Iter, IterState};
use async_trait::async_trait;
use davenport_driver::{self as driver, Error, Row, Step, status};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Metadata about one query of a result set.
///
/// Populated from the driver's optional capability reporters at the instant
/// the feed signals the end of a query; fields the backend does not supply
/// are left at their zero values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Starting offset of the result set.
    pub offset: u64,
    /// Total rows the view would have returned without limiting.
    pub total_rows: u64,
    /// Update sequence of the underlying database, if requested.
    pub update_seq: Option<String>,
    /// Warning generated by the query, if any.
    pub warning: Option<String>,
    /// Paging bookmark, for backends that page with bookmarks.
    pub bookmark: Option<String>,
    /// Index of the finished query within a multi-query request.
    pub query_index: usize,
}

type MetadataSlot = Arc<Mutex<Option<Metadata>>>;

/// Adapts a driver row feed to the iterator core, snapshotting metadata at
/// query boundaries.
struct RowsFeed {
    rows: Box<dyn driver::Rows>,
    metadata: MetadataSlot,
}

#[async_trait]
impl Feed for RowsFeed {
    type Item = Row;

    async fn next(&mut self) -> Result<Step<Row>, Error> {
        let step = self.rows.next().await?;
        if matches!(step, Step::EndOfQuery | Step::EndOfData) {
            let snapshot = Metadata {
                offset: self.rows.offset().unwrap_or(0),
                total_rows: self.rows.total_rows().unwrap_or(0),
                update_seq: self.rows.update_seq(),
                warning: self.rows.warning(),
                bookmark: self.rows.bookmark(),
                query_index: self.rows.query_index().unwrap_or(0),
            };
            *lock_slot(&self.metadata) = Some(snapshot);
        }
        Ok(step)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.rows.close().await
    }
}

fn lock_slot(slot: &MetadataSlot) -> std::sync::MutexGuard<'_, Option<Metadata>> {
    slot.lock().expect("metadata slot lock poisoned")
}

/// An iterator over a (possibly multi-query) result set.
///
/// Call [`ResultSet::advance`] to step to the next row. The scan accessors
/// consume the row's raw payload as they decode it; decoding the same row
/// twice is not guaranteed to succeed. Calling a scan accessor before the
/// first `advance` performs the one-shot convenience access: the first row is
/// fetched, the iterator is closed, and the accessor operates on that row.
pub struct ResultSet {
    iter: Iter<RowsFeed>,
    metadata: MetadataSlot,
    scan_err: Mutex<Option<Error>>,
}

impl ResultSet {
    pub fn new(rows: Box<dyn driver::Rows>, cancel: CancellationToken) -> Self {
        Self::build(rows, cancel, None)
    }

    pub(crate) fn with_close_hook(
        rows: Box<dyn driver::Rows>,
        cancel: CancellationToken,
        on_close: Box<dyn FnOnce() + Send + Sync + 'static>,
    ) -> Self {
        Self::build(rows, cancel, Some(on_close))
    }

    fn build(
        rows: Box<dyn driver::Rows>,
        cancel: CancellationToken,
        on_close: Option<Box<dyn FnOnce() + Send + Sync + 'static>>,
    ) -> Self {
        let metadata: MetadataSlot = Arc::new(Mutex::new(None));
        let feed = RowsFeed {
            rows,
            metadata: metadata.clone(),
        };
        let iter = match on_close {
            Some(hook) => Iter::with_close_hook(feed, cancel, hook),
            None => Iter::new(feed, cancel),
        };
        Self {
            iter,
            metadata,
            scan_err: Mutex::new(None),
        }
    }

    /// Prepares the next row for reading; `false` at the end of the data, at
    /// a query boundary, or on error. See [`ResultSet::err`].
    pub async fn advance(&self) -> bool {
        self.iter.advance().await
    }

    /// Prepares the next result set of a multi-query request for reading.
    pub async fn next_result_set(&self) -> bool {
        self.iter.next_result_set().await
    }

    /// The first error encountered: a locally recorded decode error if one
    /// exists, otherwise the iterator's sticky error. Unaffected by
    /// [`ResultSet::close`].
    pub async fn err(&self) -> Option<Error> {
        if let Some(err) = self.scan_err().clone() {
            return Some(err);
        }
        self.iter.err().await
    }

    /// Closes the result set, releasing the underlying query resources.
    /// Idempotent.
    pub async fn close(&self) -> Result<(), Error> {
        self.iter.close().await
    }

    /// Metadata for the current query. Fails with a "not ready" error until
    /// the query has been iterated to completion, so an empty metadata record
    /// can never be mistaken for a real empty result.
    pub async fn metadata(&self) -> Result<Metadata, Error> {
        match self.iter.state().await {
            IterState::EndOfQuery | IterState::Closed => {
                Ok(lock_slot(&self.metadata).clone().unwrap_or_default())
            }
            _ => Err(Error::bad_request(
                "metadata is not available until the result set is exhausted",
            )),
        }
    }

    /// Decodes the current row's value into `T`, consuming the payload.
    pub async fn scan_value<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.record_scan(
            self.iter
                .with_current_mut(|row| {
                    row_error(row)?;
                    decode(row.value.take(), "value")
                })
                .await?,
        )
    }

    /// Decodes the current row's document into `T`, consuming the payload.
    /// Fails with a 400 when the row carries no document (e.g. the query did
    /// not request embedded documents).
    pub async fn scan_doc<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.record_scan(
            self.iter
                .with_current_mut(|row| {
                    row_error(row)?;
                    match row.doc.take() {
                        Some(doc) => decode(Some(doc), "doc"),
                        None => Err(Error::bad_request(
                            "no document in result; does the query include docs?",
                        )),
                    }
                })
                .await?,
        )
    }

    /// Decodes the current row's key into `T`, consuming the payload. For
    /// simple string keys [`ResultSet::raw_key`] may be easier.
    pub async fn scan_key<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.record_scan(
            self.iter
                .with_current_mut(|row| {
                    row_error(row)?;
                    match row.key.take() {
                        Some(key) => decode(Some(key), "key"),
                        None => Err(Error::bad_request("no key in result")),
                    }
                })
                .await?,
        )
    }

    /// Document id of the current row, or `None` when no row is available.
    pub async fn id(&self) -> Option<String> {
        self.iter.with_current(|row| row.id.clone()).await.ok()
    }

    /// Document revision of the current row, when the backend reports one.
    /// View results typically do not.
    pub async fn rev(&self) -> Option<String> {
        self.iter
            .with_current(|row| row.rev.clone())
            .await
            .ok()
            .flatten()
    }

    /// The current row's key as a raw JSON string.
    pub async fn raw_key(&self) -> Option<String> {
        self.iter
            .with_current(|row| row.key.as_ref().map(|key| key.get().to_string()))
            .await
            .ok()
            .flatten()
    }

    fn scan_err(&self) -> std::sync::MutexGuard<'_, Option<Error>> {
        self.scan_err.lock().expect("scan error lock poisoned")
    }

    /// Records a decode failure so it remains visible through
    /// [`ResultSet::err`]; decode failures do not close the iterator.
    fn record_scan<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = &result {
            let mut slot = self.scan_err();
            if slot.is_none() {
                *slot = Some(err.clone());
            }
        }
        result
    }
}

fn row_error(row: &Row) -> Result<(), Error> {
    match &row.error {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

/// Decodes a raw payload; an absent payload decodes as JSON `null`, matching
/// backends that omit the field entirely.
fn decode<T: DeserializeOwned>(
    raw: Option<Box<serde_json::value::RawValue>>,
    field: &str,
) -> Result<T, Error> {
    let json = raw.as_ref().map(|raw| raw.get()).unwrap_or("null");
    serde_json::from_str(json)
        .map_err(|err| Error::wrap(status::BAD_REQUEST, format!("failed to decode {field}"), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::value::RawValue;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).unwrap()
    }

    fn row(id: &str, key: &str, value: &str) -> Row {
        Row {
            id: id.to_string(),
            key: Some(raw(key)),
            value: Some(raw(value)),
            ..Row::default()
        }
    }

    /// Scripted driver rows feed with optional metadata capabilities.
    #[derive(Default)]
    struct MockRows {
        steps: VecDeque<Result<Step<Row>, Error>>,
        offset: Option<u64>,
        total_rows: Option<u64>,
        update_seq: Option<String>,
        warning: Option<String>,
        bookmark: Option<String>,
        query_index: usize,
        crossed_boundary: bool,
        multi_query: bool,
        closes: Arc<AtomicUsize>,
    }

    impl MockRows {
        fn scripted(steps: Vec<Result<Step<Row>, Error>>) -> Self {
            Self {
                steps: steps.into(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl driver::Rows for MockRows {
        async fn next(&mut self) -> Result<Step<Row>, Error> {
            if self.crossed_boundary {
                self.crossed_boundary = false;
                self.query_index += 1;
            }
            let step = self.steps.pop_front().unwrap_or(Ok(Step::EndOfData));
            if matches!(step, Ok(Step::EndOfQuery)) {
                self.crossed_boundary = true;
            }
            step
        }

        async fn close(&mut self) -> Result<(), Error> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn offset(&self) -> Option<u64> {
            self.offset
        }

        fn total_rows(&self) -> Option<u64> {
            self.total_rows
        }

        fn update_seq(&self) -> Option<String> {
            self.update_seq.clone()
        }

        fn warning(&self) -> Option<String> {
            self.warning.clone()
        }

        fn bookmark(&self) -> Option<String> {
            self.bookmark.clone()
        }

        fn query_index(&self) -> Option<usize> {
            self.multi_query.then_some(self.query_index)
        }
    }

    fn result_set(rows: MockRows) -> ResultSet {
        ResultSet::new(Box::new(rows), CancellationToken::new())
    }

    #[tokio::test]
    async fn iterates_and_decodes_values() {
        let rs = result_set(MockRows::scripted(vec![
            Ok(Step::Item(row("a", "\"ka\"", "1"))),
            Ok(Step::Item(row("b", "\"kb\"", "2"))),
        ]));
        let mut ids = Vec::new();
        let mut values = Vec::new();
        while rs.advance().await {
            ids.push(rs.id().await.unwrap());
            values.push(rs.scan_value::<i64>().await.unwrap());
        }
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(values, [1, 2]);
        assert!(rs.err().await.is_none());
    }

    #[tokio::test]
    async fn metadata_is_gated_until_exhaustion() {
        let mut rows = MockRows::scripted(vec![Ok(Step::Item(row("a", "\"k\"", "1")))]);
        rows.offset = Some(5);
        rows.total_rows = Some(100);
        rows.update_seq = Some("42-seq".to_string());
        rows.warning = Some("no matching index".to_string());
        rows.bookmark = Some("g1AAAA".to_string());
        let rs = result_set(rows);

        let err = rs.metadata().await.unwrap_err();
        assert_eq!(err.status(), status::BAD_REQUEST);

        while rs.advance().await {}
        let meta = rs.metadata().await.unwrap();
        assert_eq!(meta.offset, 5);
        assert_eq!(meta.total_rows, 100);
        assert_eq!(meta.update_seq.as_deref(), Some("42-seq"));
        assert_eq!(meta.warning.as_deref(), Some("no matching index"));
        assert_eq!(meta.bookmark.as_deref(), Some("g1AAAA"));
    }

    #[tokio::test]
    async fn unsupported_metadata_capabilities_fall_back_to_zero_values() {
        let rs = result_set(MockRows::scripted(vec![]));
        while rs.advance().await {}
        let meta = rs.metadata().await.unwrap();
        assert_eq!(meta, Metadata::default());
    }

    #[tokio::test]
    async fn multi_query_metadata_is_per_query() {
        let mut rows = MockRows::scripted(vec![
            Ok(Step::Item(row("a", "\"k\"", "1"))),
            Ok(Step::EndOfQuery),
            Ok(Step::Item(row("b", "\"k\"", "2"))),
        ]);
        rows.multi_query = true;
        let rs = result_set(rows);

        while rs.advance().await {}
        assert_eq!(rs.metadata().await.unwrap().query_index, 0);

        assert!(rs.next_result_set().await);
        while rs.advance().await {}
        assert_eq!(rs.metadata().await.unwrap().query_index, 1);
        assert!(rs.err().await.is_none());
    }

    #[tokio::test]
    async fn scan_doc_without_doc_is_a_bad_request() {
        let rs = result_set(MockRows::scripted(vec![Ok(Step::Item(row(
            "a", "\"k\"", "1",
        )))]));
        assert!(rs.advance().await);
        let err = rs.scan_doc::<serde_json::Value>().await.unwrap_err();
        assert_eq!(err.status(), status::BAD_REQUEST);
        // The decode failure is sticky in err() but does not close the set.
        assert_eq!(rs.err().await.unwrap().status(), status::BAD_REQUEST);
        assert!(!rs.advance().await);
    }

    #[tokio::test]
    async fn scan_doc_decodes_documents() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Doc {
            name: String,
        }
        let mut r = row("a", "\"k\"", "null");
        r.doc = Some(raw(r#"{"name":"bob"}"#));
        let rs = result_set(MockRows::scripted(vec![Ok(Step::Item(r))]));
        assert!(rs.advance().await);
        let doc: Doc = rs.scan_doc().await.unwrap();
        assert_eq!(
            doc,
            Doc {
                name: "bob".to_string()
            }
        );
    }

    #[tokio::test]
    async fn scan_before_advance_is_one_shot() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut rows = MockRows::scripted(vec![
            Ok(Step::Item(row("a", "\"k\"", "7"))),
            Ok(Step::Item(row("b", "\"k\"", "8"))),
        ]);
        rows.closes = closes.clone();
        let rs = result_set(rows);

        let value: i64 = rs.scan_value().await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!rs.advance().await);
        assert!(rs.err().await.is_none());
    }

    #[tokio::test]
    async fn row_level_errors_surface_from_scans() {
        let mut r = row("a", "\"k\"", "1");
        r.error = Some(Error::from_server(status::CONFLICT, "conflict"));
        let rs = result_set(MockRows::scripted(vec![Ok(Step::Item(r))]));
        assert!(rs.advance().await);
        let err = rs.scan_value::<i64>().await.unwrap_err();
        assert_eq!(err.status(), status::CONFLICT);
    }

    #[tokio::test]
    async fn feed_errors_are_terminal() {
        let rs = result_set(MockRows::scripted(vec![
            Ok(Step::Item(row("a", "\"k\"", "1"))),
            Err(Error::from_server(status::INTERNAL_SERVER_ERROR, "boom")),
        ]));
        assert!(rs.advance().await);
        assert!(!rs.advance().await);
        let err = rs.err().await.unwrap();
        assert_eq!(err.status(), status::INTERNAL_SERVER_ERROR);
        // Methods stay safe after the error.
        assert!(!rs.advance().await);
        rs.close().await.unwrap();
        assert_eq!(rs.err().await.unwrap().status(), status::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn rev_and_raw_key_accessors() {
        let mut r = row("a", r#"["compound","key"]"#, "1");
        r.rev = Some("1-abc".to_string());
        let rs = result_set(MockRows::scripted(vec![Ok(Step::Item(r))]));
        assert!(rs.advance().await);
        assert_eq!(rs.rev().await.as_deref(), Some("1-abc"));
        assert_eq!(rs.raw_key().await.as_deref(), Some(r#"["compound","key"]"#));
        let key: (String, String) = rs.scan_key().await.unwrap();
        assert_eq!(key, ("compound".to_string(), "key".to_string()));
    }
}
