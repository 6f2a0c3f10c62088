//! Push-style stream over a paginated result
//!
//! [`BackpressureStream`] implements [`futures::Stream`]. Each poll yields at
//! most one item; a new page is requested only when the buffer is empty and
//! the consumer asks for more. Production can be paused from any task through
//! a [`FlowControl`] handle.

use super::types::{
    start_fetch, start_release, CursorId, Page, PageFetcher, PendingFetch, PendingRelease,
};
use crate::codec::{self, Value};
use crate::config::PagingConfig;
use crate::error::{Error, Result};
use futures::task::AtomicWaker;
use futures::Stream;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll, Waker};
use tracing::{debug, error, trace, warn};

const READ: &str = "stream.read()";
const CLOSE: &str = "stream.close()";

/// Shared pause switch for a [`BackpressureStream`]
///
/// Cloning yields another handle to the same switch.
#[derive(Debug, Clone, Default)]
pub struct FlowControl {
    inner: Arc<FlowInner>,
}

#[derive(Debug, Default)]
struct FlowInner {
    paused: AtomicBool,
    waker: AtomicWaker,
}

impl FlowControl {
    /// Stop producing items until [`resume`](Self::resume) is called
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    /// Restart production and wake a consumer parked on the pause
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.waker.wake();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    fn register(&self, waker: &Waker) {
        self.inner.waker.register(waker);
    }
}

enum StreamState<T> {
    Ready,
    Fetching(PendingFetch<T>),
    Releasing(PendingRelease),
    Ended,
    Failed,
    /// `close()` was called but the release has not succeeded yet
    Closing,
    Closed,
}

impl<T> StreamState<T> {
    fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Fetching(_) => "fetching",
            Self::Releasing(_) => "releasing",
            Self::Ended => "ended",
            Self::Failed => "failed",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed | Self::Closing | Self::Closed)
    }

    fn is_closed(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// A [`Stream`] of items pulled page by page from a [`PageFetcher`]
///
/// Yields `Ok(item)` for each item in server order. A failed fetch is
/// reported once as `Err` and the stream then ends. Polling after `close()`
/// yields one `Err(Error::ClosedCursor)` and then ends.
pub struct BackpressureStream<F: PageFetcher> {
    fetcher: Arc<F>,
    config: PagingConfig,
    cursor_id: CursorId,
    buffer: VecDeque<F::Item>,
    has_more: bool,
    state: StreamState<F::Item>,
    released: bool,
    closed_reported: bool,
    flow: FlowControl,
    pages_fetched: usize,
}

// No field is ever pinned in place.
impl<F: PageFetcher> Unpin for BackpressureStream<F> {}

impl<F> BackpressureStream<F>
where
    F: PageFetcher + 'static,
    F::Item: 'static,
{
    /// Create a stream seeded with the first page of a query
    pub fn new(fetcher: Arc<F>, first_page: Page<F::Item>) -> Self {
        Self::with_config(fetcher, first_page, PagingConfig::default())
    }

    /// Create a stream with explicit settings
    pub fn with_config(fetcher: Arc<F>, first_page: Page<F::Item>, config: PagingConfig) -> Self {
        debug!(
            cursor_id = %first_page.cursor_id,
            items = first_page.items.len(),
            has_more = first_page.has_more,
            "Opening stream"
        );
        Self {
            fetcher,
            config,
            cursor_id: first_page.cursor_id,
            buffer: first_page.items.into(),
            has_more: first_page.has_more,
            state: StreamState::Ready,
            released: false,
            closed_reported: false,
            flow: FlowControl::default(),
            pages_fetched: 0,
        }
    }

    pub fn pause(&self) {
        self.flow.pause();
    }

    pub fn resume(&self) {
        self.flow.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.flow.is_paused()
    }

    /// A handle that pauses and resumes this stream from elsewhere
    pub fn flow_control(&self) -> FlowControl {
        self.flow.clone()
    }

    /// Number of pages fetched after the first one
    pub fn fetch_count(&self) -> usize {
        self.pages_fetched
    }

    pub fn cursor_id(&self) -> &CursorId {
        &self.cursor_id
    }

    /// Whether the stream has yielded its final element
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Stop early and release the server cursor
    ///
    /// Unread items are discarded. If the release call fails the stream
    /// stays in a closing state and a later `close()` retries it. Closing a
    /// stream whose close already succeeded fails with
    /// [`Error::ClosedCursor`].
    pub async fn close(&mut self) -> Result<()> {
        let release = match std::mem::replace(&mut self.state, StreamState::Closing) {
            StreamState::Closed => {
                self.state = StreamState::Closed;
                return Err(Error::closed(CLOSE));
            }
            StreamState::Releasing(pending) => Some(pending),
            _ if !self.released => Some(start_release(&self.fetcher, &self.cursor_id)),
            _ => None,
        };
        self.buffer.clear();

        if let Some(pending) = release {
            if let Err(remote) = pending.await {
                let err = Error::fetch(CLOSE, remote);
                error!(cursor_id = %self.cursor_id, error = %err, "Failed to release cursor");
                return Err(err);
            }
            self.released = true;
        }
        self.state = StreamState::Closed;
        debug!(cursor_id = %self.cursor_id, pages = self.pages_fetched, "Stream closed");
        Ok(())
    }

    fn apply_page(&mut self, page: Page<F::Item>) {
        self.pages_fetched += 1;
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
}

impl<F> BackpressureStream<F>
where
    F: PageFetcher + 'static,
    F::Item: AsRef<str> + 'static,
{
    /// Parse every raw text row through the numeric-safe codec
    ///
    /// A row that fails to parse yields `Err(Error::Syntax)` without ending
    /// the stream.
    pub fn decoded(self) -> Decoded<Self> {
        Decoded::new(self)
    }
}

impl<F> Stream for BackpressureStream<F>
where
    F: PageFetcher + 'static,
    F::Item: 'static,
{
    type Item = Result<F::Item>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.state.is_closed() && !this.closed_reported {
                this.closed_reported = true;
                return Poll::Ready(Some(Err(Error::closed(READ))));
            }
            if this.state.is_finished() {
                return Poll::Ready(None);
            }
            if this.flow.is_paused() {
                this.flow.register(cx.waker());
                // resume() may have run between the check and the register
                if this.flow.is_paused() {
                    return Poll::Pending;
                }
                continue;
            }

            match &mut this.state {
                StreamState::Fetching(pending) => {
                    let outcome = ready!(pending.as_mut().poll(cx));
                    this.state = StreamState::Ready;
                    match outcome {
                        Ok(page) => this.apply_page(page),
                        Err(remote) => {
                            let err = Error::fetch(READ, remote);
                            error!(cursor_id = %this.cursor_id, error = %err, "Page fetch failed");
                            this.state = StreamState::Failed;
                            return Poll::Ready(Some(Err(err)));
                        }
                    }
                }
                StreamState::Releasing(pending) => {
                    let outcome = ready!(pending.as_mut().poll(cx));
                    match outcome {
                        Ok(()) => {
                            this.released = true;
                            debug!(cursor_id = %this.cursor_id, "Released exhausted cursor");
                        }
                        Err(remote) => {
                            warn!(cursor_id = %this.cursor_id, error = %remote, "Failed to release exhausted cursor");
                        }
                    }
                    this.state = StreamState::Ended;
                    return Poll::Ready(None);
                }
                StreamState::Ready => {
                    if let Some(item) = this.buffer.pop_front() {
                        if this.config.log_items {
                            trace!(cursor_id = %this.cursor_id, remaining = this.buffer.len(), "Item");
                        }
                        return Poll::Ready(Some(Ok(item)));
                    }
                    if this.has_more {
                        debug!(cursor_id = %this.cursor_id, "Fetching next page");
                        this.state = StreamState::Fetching(start_fetch(&this.fetcher, &this.cursor_id));
                    } else if this.config.release_on_exhaustion && !this.released {
                        this.state = StreamState::Releasing(start_release(&this.fetcher, &this.cursor_id));
                    } else {
                        debug!(cursor_id = %this.cursor_id, pages = this.pages_fetched, "Stream ended");
                        this.state = StreamState::Ended;
                        return Poll::Ready(None);
                    }
                }
                StreamState::Ended
                | StreamState::Failed
                | StreamState::Closing
                | StreamState::Closed => {
                    return Poll::Ready(None);
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.state.is_finished() {
            (0, Some(0))
        } else if self.has_more {
            (self.buffer.len(), None)
        } else {
            (self.buffer.len(), Some(self.buffer.len()))
        }
    }
}

impl<F: PageFetcher> fmt::Debug for BackpressureStream<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackpressureStream")
            .field("cursor_id", &self.cursor_id)
            .field("buffered", &self.buffer.len())
            .field("has_more", &self.has_more)
            .field("state", &self.state.name())
            .field("paused", &self.flow.is_paused())
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}

pin_project! {
    /// Stream adapter turning raw text rows into codec [`Value`]s
    #[must_use = "streams do nothing unless polled"]
    #[derive(Debug)]
    pub struct Decoded<S> {
        #[pin]
        inner: S,
    }
}

impl<S> Decoded<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, T> Stream for Decoded<S>
where
    S: Stream<Item = Result<T>>,
    T: AsRef<str>,
{
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(row)) => Poll::Ready(Some(codec::parse(row.as_ref()))),
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
