//! Pagination module
//!
//! Supports: pull cursors, push streams with backpressure, in-memory sources
//!
//! # Overview
//!
//! A query returns its result in pages. The first page comes back with the
//! query itself; every later page is requested through a [`PageFetcher`]
//! using the continuation token of the previous one. [`BufferedCursor`] and
//! [`BackpressureStream`] both turn that page sequence into an ordered item
//! sequence, fetching lazily and never running two fetches for the same
//! cursor at once.

mod cursor;
mod events;
mod memory;
mod stream;
mod types;

pub use cursor::BufferedCursor;
pub use events::CursorEvent;
pub use memory::{MemoryFetcher, MEMORY_CURSOR_ID};
pub use stream::{BackpressureStream, Decoded, FlowControl};
pub use types::{CursorId, Page, PageFetcher, RemoteError, RemoteErrorKind};

#[cfg(test)]
mod tests;
