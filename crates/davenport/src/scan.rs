//! The bulk-scan engine: drains a result set into a caller-provided
//! destination, decoding each row into a freshly produced element.

use crate::resultset::ResultSet;
use davenport_driver::Error;
use serde::de::DeserializeOwned;

/// A sequence the bulk-scan engine can write decoded elements into.
///
/// Implemented for `Vec<T>` (unbounded, appended to) and `[T]`
/// (fixed-capacity, written in place, scanning stops once full).
pub trait ScanDestination<T> {
    /// Total capacity, or `None` when unbounded.
    fn capacity(&self) -> Option<usize>;

    fn write(&mut self, index: usize, item: T);
}

impl<T> ScanDestination<T> for Vec<T> {
    fn capacity(&self) -> Option<usize> {
        None
    }

    fn write(&mut self, _index: usize, item: T) {
        self.push(item);
    }
}

impl<T> ScanDestination<T> for [T] {
    fn capacity(&self) -> Option<usize> {
        Some(self.len())
    }

    fn write(&mut self, index: usize, item: T) {
        self[index] = item;
    }
}

#[derive(Clone, Copy)]
enum Field {
    Value,
    Doc,
}

/// Scans all remaining documents into `dest`, returning the number of
/// elements written. The result set is closed on return regardless of the
/// outcome; the first error (row decode or close) wins. Partial success is
/// possible: elements scanned before a failing row remain in `dest`.
pub async fn scan_all_docs<T, D>(rows: &ResultSet, dest: &mut D) -> Result<usize, Error>
where
    T: DeserializeOwned,
    D: ScanDestination<T> + ?Sized,
{
    scan_all(rows, dest, Field::Doc).await
}

/// Like [`scan_all_docs`], but scans row values rather than documents.
pub async fn scan_all_values<T, D>(rows: &ResultSet, dest: &mut D) -> Result<usize, Error>
where
    T: DeserializeOwned,
    D: ScanDestination<T> + ?Sized,
{
    scan_all(rows, dest, Field::Value).await
}

async fn scan_all<T, D>(rows: &ResultSet, dest: &mut D, field: Field) -> Result<usize, Error>
where
    T: DeserializeOwned,
    D: ScanDestination<T> + ?Sized,
{
    let drained = drain(rows, dest, field).await;
    let closed = rows.close().await;
    match drained {
        Ok(written) => closed.map(|()| written),
        Err(err) => Err(err),
    }
}

async fn drain<T, D>(rows: &ResultSet, dest: &mut D, field: Field) -> Result<usize, Error>
where
    T: DeserializeOwned,
    D: ScanDestination<T> + ?Sized,
{
    if dest.capacity() == Some(0) {
        return Err(Error::bad_request(
            "bulk scan destination has zero capacity",
        ));
    }
    if let Some(err) = rows.err().await {
        return Err(err);
    }
    let mut written = 0;
    while rows.advance().await {
        let item: T = match field {
            Field::Value => rows.scan_value().await?,
            Field::Doc => rows.scan_doc().await?,
        };
        dest.write(written, item);
        written += 1;
        if dest.capacity() == Some(written) {
            // Fixed-capacity destination is full; stop even if rows remain.
            return Ok(written);
        }
    }
    match rows.err().await {
        Some(err) => Err(err),
        None => Ok(written),
    }
}
