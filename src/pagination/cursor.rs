//! Pull-style cursor over a paginated result
//!
//! [`BufferedCursor`] hands out one item per `next()` call and fetches the
//! following page only after the current one is drained. The pending fetch is
//! kept inside the cursor, so dropping a `next()` future mid-fetch does not
//! lose the page: the next call picks up the same request.

use super::events::{CursorEvent, EventHub};
use super::types::{start_fetch, CursorId, Page, PageFetcher, PendingFetch};
use crate::config::PagingConfig;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, trace, warn};

const NEXT: &str = "cursor.next()";
const FOR_EACH: &str = "cursor.for_each()";
const CLOSE: &str = "cursor.close()";
const GET_CURRENT: &str = "cursor.get_current()";

enum FetchState<T> {
    Idle,
    Fetching(PendingFetch<T>),
    Failed(Error),
    Closed,
}

impl<T> FetchState<T> {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching(_) => "fetching",
            Self::Failed(_) => "failed",
            Self::Closed => "closed",
        }
    }
}

/// Async pull cursor over pages returned by a [`PageFetcher`]
///
/// # Example
///
/// ```
/// use kvpage::pagination::{BufferedCursor, MemoryFetcher};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let (first, fetcher) = MemoryFetcher::paged(vec![1, 2, 3], &[2, 1]);
/// let mut cursor = BufferedCursor::new(Arc::new(fetcher), first);
///
/// let mut seen = Vec::new();
/// cursor.for_each(|n| seen.push(n)).await.unwrap();
/// assert_eq!(seen, vec![1, 2, 3]);
/// # });
/// ```
pub struct BufferedCursor<F: PageFetcher> {
    fetcher: Arc<F>,
    config: PagingConfig,
    cursor_id: CursorId,
    buffer: VecDeque<F::Item>,
    has_more: bool,
    state: FetchState<F::Item>,
    current: Option<F::Item>,
    terminal_reached: bool,
    released: bool,
    events: EventHub<F::Item>,
}

impl<F> BufferedCursor<F>
where
    F: PageFetcher + 'static,
    F::Item: Clone + 'static,
{
    /// Create a cursor seeded with the first page of a query
    pub fn new(fetcher: Arc<F>, first_page: Page<F::Item>) -> Self {
        Self::with_config(fetcher, first_page, PagingConfig::default())
    }

    /// Create a cursor with explicit settings
    pub fn with_config(fetcher: Arc<F>, first_page: Page<F::Item>, config: PagingConfig) -> Self {
        debug!(
            cursor_id = %first_page.cursor_id,
            items = first_page.items.len(),
            has_more = first_page.has_more,
            "Opening cursor"
        );
        Self {
            fetcher,
            config,
            cursor_id: first_page.cursor_id,
            buffer: first_page.items.into(),
            has_more: first_page.has_more,
            state: FetchState::Idle,
            current: None,
            terminal_reached: false,
            released: false,
            events: EventHub::new(),
        }
    }

    /// Return the next item, fetching another page when the buffer is drained
    ///
    /// Returns [`Error::Exhausted`] once every item has been handed out.
    pub async fn next(&mut self) -> Result<F::Item> {
        self.check_usable(NEXT)?;
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(self.surface(item));
            }
            if !self.has_more {
                self.reach_terminal().await;
                return Err(Error::Exhausted);
            }
            self.fetch_page(NEXT).await?;
        }
    }

    /// The item most recently returned by `next()` or visited by `for_each`
    pub fn get_current(&self) -> Result<F::Item> {
        match &self.state {
            FetchState::Closed => return Err(Error::closed(GET_CURRENT)),
            FetchState::Failed(err) => return Err(err.clone()),
            _ => {}
        }
        if self.terminal_reached {
            return Err(Error::Exhausted);
        }
        self.current.clone().ok_or(Error::NoCurrentItem)
    }

    /// Visit every remaining item in order
    ///
    /// Returns the number of items visited; a cursor that already reached
    /// its end visits nothing.
    pub async fn for_each<V>(&mut self, mut visit: V) -> Result<usize>
    where
        V: FnMut(F::Item),
    {
        self.try_for_each(|item| {
            visit(item);
            ControlFlow::Continue(())
        })
        .await
    }

    /// Visit remaining items until the visitor breaks
    ///
    /// Breaking leaves the cursor open and positioned after the last visited
    /// item.
    pub async fn try_for_each<V>(&mut self, mut visit: V) -> Result<usize>
    where
        V: FnMut(F::Item) -> ControlFlow<()>,
    {
        self.check_usable(FOR_EACH)?;
        if self.terminal_reached {
            return Ok(0);
        }

        let mut visited = 0;
        loop {
            while let Some(item) = self.buffer.pop_front() {
                let item = self.surface(item);
                visited += 1;
                if visit(item).is_break() {
                    debug!(cursor_id = %self.cursor_id, visited, "Iteration stopped by visitor");
                    return Ok(visited);
                }
            }
            if !self.has_more {
                self.reach_terminal().await;
                return Ok(visited);
            }
            self.fetch_page(FOR_EACH).await?;
        }
    }

    /// Release the server cursor and close this one
    ///
    /// A fetch still in flight is dropped and its page never applied. If the
    /// release call fails the cursor stays open so the close can be retried.
    pub async fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            let err = Error::closed(CLOSE);
            self.events.emit(CursorEvent::Error(err.clone()));
            return Err(err);
        }

        if !self.released {
            if let Err(remote) = self.fetcher.close_cursor(&self.cursor_id).await {
                let err = Error::fetch(CLOSE, remote);
                error!(cursor_id = %self.cursor_id, error = %err, "Failed to release cursor");
                self.events.emit(CursorEvent::Error(err.clone()));
                return Err(err);
            }
            self.released = true;
        }

        if matches!(self.state, FetchState::Fetching(_)) {
            debug!(cursor_id = %self.cursor_id, "Discarding pending fetch");
        }
        self.state = FetchState::Closed;
        self.buffer.clear();
        self.current = None;
        debug!(cursor_id = %self.cursor_id, "Cursor closed");
        self.events.emit(CursorEvent::Close);
        Ok(())
    }

    /// Receive every event this cursor publishes from now on
    pub fn subscribe(&mut self) -> UnboundedReceiver<CursorEvent<F::Item>> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, FetchState::Closed)
    }

    /// No buffered items and nothing left on the server
    pub fn is_exhausted(&self) -> bool {
        !self.has_more && self.buffer.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn cursor_id(&self) -> &CursorId {
        &self.cursor_id
    }

    /// Items fetched but not yet handed out
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn check_usable(&mut self, operation: &'static str) -> Result<()> {
        match &self.state {
            FetchState::Closed => {
                let err = Error::closed(operation);
                self.events.emit(CursorEvent::Error(err.clone()));
                Err(err)
            }
            FetchState::Failed(err) => {
                let err = err.clone();
                self.events.emit(CursorEvent::Error(err.clone()));
                Err(err)
            }
            _ => Ok(()),
        }
    }

    fn surface(&mut self, item: F::Item) -> F::Item {
        if self.config.log_items {
            trace!(cursor_id = %self.cursor_id, remaining = self.buffer.len(), "Item");
        }
        self.current = Some(item.clone());
        self.events.emit_with(|| CursorEvent::Data(item.clone()));
        item
    }

    /// Await the outstanding fetch, issuing one first if none is pending
    async fn fetch_page(&mut self, operation: &'static str) -> Result<()> {
        if !matches!(self.state, FetchState::Fetching(_)) {
            debug!(cursor_id = %self.cursor_id, "Fetching next page");
            self.state = FetchState::Fetching(start_fetch(&self.fetcher, &self.cursor_id));
        }
        let FetchState::Fetching(pending) = &mut self.state else {
            return Ok(());
        };
        let outcome = pending.await;
        self.state = FetchState::Idle;

        match outcome {
            Ok(page) => {
                self.apply_page(page);
                Ok(())
            }
            Err(remote) => {
                let err = Error::fetch(operation, remote);
                error!(cursor_id = %self.cursor_id, error = %err, "Page fetch failed");
                self.state = FetchState::Failed(err.clone());
                self.events.emit(CursorEvent::Error(err.clone()));
                Err(err)
            }
        }
    }

    fn apply_page(&mut self, page: Page<F::Item>) {
        debug!(
            cursor_id = %page.cursor_id,
            items = page.items.len(),
            has_more = page.has_more,
            "Received page"
        );
        self.cursor_id = page.cursor_id;
        self.has_more = page.has_more;
        self.buffer = page.items.into();
    }

    async fn reach_terminal(&mut self) {
        if self.terminal_reached {
            return;
        }
        self.terminal_reached = true;
        self.events.emit(CursorEvent::Done);

        if self.config.release_on_exhaustion && !self.released {
            match self.fetcher.close_cursor(&self.cursor_id).await {
                Ok(()) => {
                    self.released = true;
                    debug!(cursor_id = %self.cursor_id, "Released exhausted cursor");
                }
                Err(remote) => {
                    warn!(cursor_id = %self.cursor_id, error = %remote, "Failed to release exhausted cursor");
                }
            }
        }
    }
}

impl<F: PageFetcher> Drop for BufferedCursor<F> {
    fn drop(&mut self) {
        if self.has_more && !matches!(self.state, FetchState::Closed) {
            warn!(cursor_id = %self.cursor_id, "Cursor dropped with unread pages; call close() to release it");
        }
    }
}

impl<F: PageFetcher> fmt::Debug for BufferedCursor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedCursor")
            .field("cursor_id", &self.cursor_id)
            .field("buffered", &self.buffer.len())
            .field("has_more", &self.has_more)
            .field("state", &self.state.name())
            .field("released", &self.released)
            .finish()
    }
}
