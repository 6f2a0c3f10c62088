//! Pagination types and traits
//!
//! Defines the page shape and the fetcher seam shared by the cursor and the
//! stream.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque continuation token identifying a server-side cursor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorId(String);

impl CursorId {
    /// Create a cursor id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CursorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CursorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One batch of items returned by a single remote fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Whether more pages remain on the server
    pub has_more: bool,
    /// Token for requesting the next page
    pub cursor_id: CursorId,
}

impl<T> Page<T> {
    /// Create a page
    pub fn new(items: Vec<T>, has_more: bool, cursor_id: impl Into<CursorId>) -> Self {
        Self {
            items,
            has_more,
            cursor_id: cursor_id.into(),
        }
    }

    /// Create a page that is followed by more pages
    pub fn more(items: Vec<T>, cursor_id: impl Into<CursorId>) -> Self {
        Self::new(items, true, cursor_id)
    }

    /// Create the final page of a result
    pub fn last(items: Vec<T>, cursor_id: impl Into<CursorId>) -> Self {
        Self::new(items, false, cursor_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Remote failure category, as reported by the store
///
/// Only the tag is modelled here; the store client owns the full exception
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    Durability,
    RequestTimeout,
    Fault,
    Consistency,
    IllegalArgument,
    IteratorTimeout,
    UnverifiedConnection,
    Proxy,
    Cancellation,
    Execution,
    Interrupted,
    Timeout,
    TableOpExecution,
    RequestLimit,
    AuthenticationFailure,
    AuthenticationRequired,
    Unauthorized,
    Unknown,
}

impl RemoteErrorKind {
    /// Name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durability => "Durability",
            Self::RequestTimeout => "RequestTimeout",
            Self::Fault => "Fault",
            Self::Consistency => "Consistency",
            Self::IllegalArgument => "IllegalArgument",
            Self::IteratorTimeout => "IteratorTimeout",
            Self::UnverifiedConnection => "UnverifiedConnection",
            Self::Proxy => "Proxy",
            Self::Cancellation => "Cancellation",
            Self::Execution => "Execution",
            Self::Interrupted => "Interrupted",
            Self::Timeout => "Timeout",
            Self::TableOpExecution => "TableOpExecution",
            Self::RequestLimit => "RequestLimit",
            Self::AuthenticationFailure => "AuthenticationFailure",
            Self::AuthenticationRequired => "AuthenticationRequired",
            Self::Unauthorized => "Unauthorized",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether a later attempt of the same call may succeed
    ///
    /// Nothing in this crate retries; callers use this to decide whether to
    /// reopen a query.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Durability
                | Self::RequestTimeout
                | Self::Consistency
                | Self::Timeout
                | Self::RequestLimit
                | Self::Interrupted
        )
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`PageFetcher`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    /// Create a remote error
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a remote error of unknown kind
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unknown, message)
    }
}

impl From<anyhow::Error> for RemoteError {
    fn from(err: anyhow::Error) -> Self {
        Self::unknown(format!("{err:#}"))
    }
}

/// The remote calls a cursor depends on
///
/// Implemented by the store client. Each call is one round trip; this crate
/// guarantees at most one `fetch_next` per cursor is outstanding at a time.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Item type carried by pages
    type Item: Send;

    /// Fetch the page following `cursor_id`
    async fn fetch_next(&self, cursor_id: &CursorId) -> Result<Page<Self::Item>, RemoteError>;

    /// Release the server-side cursor
    async fn close_cursor(&self, cursor_id: &CursorId) -> Result<(), RemoteError>;
}

/// A fetch that has been issued and not yet applied
pub(crate) type PendingFetch<T> = BoxFuture<'static, Result<Page<T>, RemoteError>>;

/// A cursor release that has been issued and not yet completed
pub(crate) type PendingRelease = BoxFuture<'static, Result<(), RemoteError>>;

pub(crate) fn start_fetch<F>(fetcher: &Arc<F>, cursor_id: &CursorId) -> PendingFetch<F::Item>
where
    F: PageFetcher + 'static,
    F::Item: 'static,
{
    let fetcher = Arc::clone(fetcher);
    let cursor_id = cursor_id.clone();
    Box::pin(async move { fetcher.fetch_next(&cursor_id).await })
}

pub(crate) fn start_release<F>(fetcher: &Arc<F>, cursor_id: &CursorId) -> PendingRelease
where
    F: PageFetcher + 'static,
{
    let fetcher = Arc::clone(fetcher);
    let cursor_id = cursor_id.clone();
    Box::pin(async move { fetcher.close_cursor(&cursor_id).await })
}
