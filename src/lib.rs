// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! # kvpage
//!
//! Client-side building blocks for reading large query results from a
//! key/value store.
//!
//! ## Features
//!
//! - **Buffered cursors**: pull items one at a time, pages are fetched lazily
//! - **Backpressure streams**: `futures::Stream` with pause/resume
//! - **Numeric-safe codec**: JSON text where 64-bit integers keep every digit
//! - **Observers**: subscribe to data/done/close/error events of a cursor
//!
//! ## Quick Start
//!
//! ```rust
//! use kvpage::codec;
//! use kvpage::pagination::{BufferedCursor, MemoryFetcher};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let rows = vec![
//!     r#"{"id": 9007199254740993}"#.to_string(),
//!     r#"{"id": 2}"#.to_string(),
//! ];
//! let (first_page, fetcher) = MemoryFetcher::paged(rows, &[1]);
//! let mut cursor = BufferedCursor::new(Arc::new(fetcher), first_page);
//!
//! let row = codec::parse(&cursor.next().await?)?;
//! assert_eq!(codec::stringify(&row), r#"{"id":9007199254740993}"#);
//! cursor.close().await?;
//! # Ok::<(), kvpage::Error>(())
//! # }).unwrap();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     PageFetcher (store)                    │
//! │        fetch_next(cursor_id)      close_cursor(cursor_id)  │
//! └───────────────────────────────────────────────────────────┘
//!                               │
//!          ┌────────────────────┴────────────────────┐
//!          │                                         │
//! ┌────────┴────────┐                      ┌─────────┴─────────┐
//! │ BufferedCursor  │                      │ BackpressureStream│
//! │ next / for_each │                      │ poll / pause      │
//! │ events          │                      │ decoded()         │
//! └────────┬────────┘                      └─────────┬─────────┘
//!          └────────────────────┬────────────────────┘
//!                               │
//!                     ┌─────────┴─────────┐
//!                     │   codec (Value)   │
//!                     │ parse / stringify │
//!                     └───────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Cursors and streams over paged results
pub mod pagination;

/// Numeric-safe JSON codec
pub mod codec;

/// Paging configuration
pub mod config;

/// Log subscriber setup
pub mod logging;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};

pub use codec::Value;
pub use config::PagingConfig;
pub use logging::LogLevel;
pub use pagination::{
    BackpressureStream, BufferedCursor, CursorEvent, CursorId, Page, PageFetcher, RemoteError,
    RemoteErrorKind,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
