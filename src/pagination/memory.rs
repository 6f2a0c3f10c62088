//! In-process page source
//!
//! [`MemoryFetcher`] serves scripted pages from memory and records every call
//! made against it. Useful for tests and for feeding already materialized
//! results through the same cursor machinery.

use super::types::{CursorId, Page, PageFetcher, RemoteError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Cursor id used by [`MemoryFetcher::paged`]
pub const MEMORY_CURSOR_ID: &str = "mem-cursor";

/// A [`PageFetcher`] answering from a queue of prepared responses
#[derive(Debug)]
pub struct MemoryFetcher<T> {
    responses: Mutex<VecDeque<Result<Page<T>, RemoteError>>>,
    delay: Option<Duration>,
    close_failure: std::sync::Mutex<Option<RemoteError>>,
    fetch_count: AtomicUsize,
    close_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed_cursors: std::sync::Mutex<Vec<CursorId>>,
}

impl<T> MemoryFetcher<T> {
    /// Create a fetcher answering `fetch_next` with `pages` in order
    pub fn new(pages: Vec<Page<T>>) -> Self {
        Self {
            responses: Mutex::new(pages.into_iter().map(Ok).collect()),
            delay: None,
            close_failure: std::sync::Mutex::new(None),
            fetch_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            closed_cursors: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Split `items` into pages of the given sizes
    ///
    /// Returns the first page, to seed a cursor, and a fetcher serving the
    /// rest. Items left over after the listed sizes form one final page; an
    /// empty `sizes` puts everything in the first page.
    pub fn paged(items: Vec<T>, sizes: &[usize]) -> (Page<T>, Self) {
        let mut items: VecDeque<T> = items.into();
        let mut chunks: Vec<Vec<T>> = Vec::new();
        for &size in sizes {
            let take = size.min(items.len());
            chunks.push(items.drain(..take).collect());
        }
        if !items.is_empty() || chunks.is_empty() {
            chunks.push(items.into_iter().collect());
        }

        let total = chunks.len();
        let mut pages = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Page::new(chunk, i + 1 < total, MEMORY_CURSOR_ID));

        let first = pages
            .next()
            .unwrap_or_else(|| Page::last(Vec::new(), MEMORY_CURSOR_ID));
        (first, Self::new(pages.collect()))
    }

    /// Answer the next fetch after the queued pages with this error
    pub fn with_failure(mut self, error: RemoteError) -> Self {
        self.responses.get_mut().push_back(Err(error));
        self
    }

    /// Sleep before answering each fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every `close_cursor` call with this error
    pub fn failing_close(self, error: RemoteError) -> Self {
        self.set_close_failure(Some(error));
        self
    }

    /// Change or clear the `close_cursor` failure
    pub fn set_close_failure(&self, error: Option<RemoteError>) {
        if let Ok(mut failure) = self.close_failure.lock() {
            *failure = error;
        }
    }

    /// Number of `fetch_next` calls received
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Number of `close_cursor` calls received, failed ones included
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Cursor ids successfully released
    pub fn closed_cursors(&self) -> Vec<CursorId> {
        self.closed_cursors
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: Send + Sync> PageFetcher for MemoryFetcher<T> {
    type Item = T;

    async fn fetch_next(&self, cursor_id: &CursorId) -> Result<Page<T>, RemoteError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().await.pop_front();
        match next {
            Some(response) => response,
            // Past the script: behave like a server whose result is drained
            None => Ok(Page::last(Vec::new(), cursor_id.clone())),
        }
    }

    async fn close_cursor(&self, cursor_id: &CursorId) -> Result<(), RemoteError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        let failure = self.close_failure.lock().ok().and_then(|f| f.clone());
        if let Some(err) = failure {
            return Err(err);
        }
        if let Ok(mut ids) = self.closed_cursors.lock() {
            ids.push(cursor_id.clone());
        }
        Ok(())
    }
}
