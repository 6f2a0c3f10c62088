//! Tests for pagination module

use super::*;
use crate::codec::Value;
use crate::config::PagingConfig;
use crate::error::Error;
use futures::{FutureExt, StreamExt, TryStreamExt};
use pretty_assertions::assert_eq;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use tokio::sync::mpsc::UnboundedReceiver;

fn cursor_over(
    items: Vec<u32>,
    sizes: &[usize],
) -> (BufferedCursor<MemoryFetcher<u32>>, Arc<MemoryFetcher<u32>>) {
    let (first, fetcher) = MemoryFetcher::paged(items, sizes);
    let fetcher = Arc::new(fetcher);
    (BufferedCursor::new(Arc::clone(&fetcher), first), fetcher)
}

async fn drain(cursor: &mut BufferedCursor<MemoryFetcher<u32>>) -> Vec<u32> {
    let mut out = Vec::new();
    loop {
        match cursor.next().await {
            Ok(item) => out.push(item),
            Err(Error::Exhausted) => return out,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}

fn received<T>(rx: &mut UnboundedReceiver<CursorEvent<T>>) -> Vec<CursorEvent<T>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn timed_out_fetcher(delay_ms: u64) -> (Page<u32>, Arc<MemoryFetcher<u32>>) {
    let fetcher = MemoryFetcher::new(vec![Page::last(vec![7, 8], "c2")])
        .with_delay(Duration::from_millis(delay_ms));
    (Page::more(vec![], "c1"), Arc::new(fetcher))
}

// ============================================================================
// Page / Error Kind Tests
// ============================================================================

#[test]
fn test_page_constructors() {
    let page = Page::more(vec![1, 2], "abc");
    assert!(page.has_more);
    assert_eq!(page.len(), 2);
    assert_eq!(page.cursor_id.as_str(), "abc");

    let last: Page<u32> = Page::last(vec![], "abc");
    assert!(!last.has_more);
    assert!(last.is_empty());
}

#[test]
fn test_remote_error_kind_transient() {
    assert!(RemoteErrorKind::RequestTimeout.is_transient());
    assert!(RemoteErrorKind::RequestLimit.is_transient());
    assert!(!RemoteErrorKind::IllegalArgument.is_transient());
    assert!(!RemoteErrorKind::Unauthorized.is_transient());
    assert_eq!(RemoteErrorKind::IteratorTimeout.to_string(), "IteratorTimeout");
}

#[test]
fn test_memory_fetcher_paged_split() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2, 3, 4, 5], &[2]);
    assert_eq!(first.items, vec![1, 2]);
    assert!(first.has_more);
    assert_eq!(fetcher.fetch_count(), 0);

    let (first, _) = MemoryFetcher::<u32>::paged(vec![], &[]);
    assert!(first.is_empty());
    assert!(!first.has_more);
}

// ============================================================================
// BufferedCursor next() Tests
// ============================================================================

#[test_case(&[], 0 ; "single page")]
#[test_case(&[3, 4], 1 ; "two pages")]
#[test_case(&[1, 1, 1, 1, 1, 1, 1], 6 ; "one item per page")]
#[test_case(&[0, 3, 0, 4], 3 ; "empty pages in between")]
#[tokio::test]
async fn test_next_drains_in_order(sizes: &[usize], fetches: usize) {
    let items: Vec<u32> = (0..7).collect();
    let (mut cursor, fetcher) = cursor_over(items.clone(), sizes);

    assert_eq!(drain(&mut cursor).await, items);
    assert_eq!(fetcher.fetch_count(), fetches);
    assert!(cursor.is_exhausted());
    assert_eq!(fetcher.close_count(), 1);
}

#[tokio::test]
async fn test_three_then_two_items() {
    let (mut cursor, fetcher) = cursor_over(vec![1, 2, 3, 4, 5], &[3, 2]);

    for expected in 1..=3 {
        assert_eq!(cursor.next().await.unwrap(), expected);
    }
    assert_eq!(fetcher.fetch_count(), 0);

    for expected in 4..=5 {
        assert_eq!(cursor.next().await.unwrap(), expected);
    }
    assert_eq!(fetcher.fetch_count(), 1);

    assert!(matches!(cursor.next().await, Err(Error::Exhausted)));
    assert!(matches!(cursor.next().await, Err(Error::Exhausted)));
    assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_empty_result_needs_no_fetch() {
    let (mut cursor, fetcher) = cursor_over(vec![], &[]);

    assert!(matches!(cursor.next().await, Err(Error::Exhausted)));
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_fetch_failure_is_terminal() {
    let fetcher = Arc::new(
        MemoryFetcher::new(vec![])
            .with_failure(RemoteError::new(RemoteErrorKind::RequestTimeout, "slow")),
    );
    let mut cursor = BufferedCursor::new(Arc::clone(&fetcher), Page::more(vec![1, 2], "c1"));
    let mut events = cursor.subscribe();

    assert_eq!(cursor.next().await.unwrap(), 1);
    assert_eq!(cursor.next().await.unwrap(), 2);

    let err = cursor.next().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Fetch { operation: "cursor.next()", kind: RemoteErrorKind::RequestTimeout, .. }
    ));
    assert!(err.is_terminal());

    // The stored error comes back without another fetch
    assert!(matches!(cursor.next().await, Err(Error::Fetch { .. })));
    assert!(matches!(cursor.for_each(|_| {}).await, Err(Error::Fetch { .. })));
    assert!(matches!(cursor.get_current(), Err(Error::Fetch { .. })));
    assert_eq!(fetcher.fetch_count(), 1);

    // Each failed call is broadcast, get_current stays silent
    let errors = received(&mut events)
        .into_iter()
        .filter(|e| matches!(e, CursorEvent::Error(Error::Fetch { .. })))
        .count();
    assert_eq!(errors, 3);

    // A failed cursor can still be closed
    cursor.close().await.unwrap();
    assert!(cursor.is_closed());
}

#[tokio::test]
async fn test_dropped_next_resumes_pending_fetch() {
    let (first, fetcher) = timed_out_fetcher(50);
    let mut cursor = BufferedCursor::new(Arc::clone(&fetcher), first);

    let attempt = tokio::time::timeout(Duration::from_millis(5), cursor.next()).await;
    assert!(attempt.is_err());
    assert_eq!(fetcher.fetch_count(), 1);

    assert_eq!(cursor.next().await.unwrap(), 7);
    assert_eq!(cursor.next().await.unwrap(), 8);
    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(fetcher.max_concurrent_fetches(), 1);
}

// ============================================================================
// for_each / try_for_each Tests
// ============================================================================

#[tokio::test]
async fn test_for_each_visits_everything_once() {
    let (mut cursor, fetcher) = cursor_over((1..=10).collect(), &[4, 4]);
    let mut events = cursor.subscribe();

    let mut seen = Vec::new();
    let visited = cursor.for_each(|n| seen.push(n)).await.unwrap();

    assert_eq!(visited, 10);
    assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    assert_eq!(fetcher.fetch_count(), 2);

    let events = received(&mut events);
    assert_eq!(events.iter().filter(|e| e.is_data()).count(), 10);
    assert_eq!(events.iter().filter(|e| e.is_done()).count(), 1);
    assert!(events.last().is_some_and(CursorEvent::is_done));
}

#[tokio::test]
async fn test_for_each_after_end_visits_nothing() {
    let (mut cursor, _) = cursor_over(vec![1, 2], &[]);
    let mut events = cursor.subscribe();

    assert_eq!(cursor.for_each(|_| {}).await.unwrap(), 2);
    assert_eq!(cursor.for_each(|_| {}).await.unwrap(), 0);
    assert!(matches!(cursor.next().await, Err(Error::Exhausted)));

    let done = received(&mut events).iter().filter(|e| e.is_done()).count();
    assert_eq!(done, 1);
}

#[tokio::test]
async fn test_for_each_picks_up_after_next() {
    let (mut cursor, _) = cursor_over(vec![1, 2, 3, 4], &[2]);
    assert_eq!(cursor.next().await.unwrap(), 1);

    let mut seen = Vec::new();
    cursor.for_each(|n| seen.push(n)).await.unwrap();
    assert_eq!(seen, vec![2, 3, 4]);
}

#[tokio::test]
async fn test_try_for_each_stops_early() {
    let (mut cursor, fetcher) = cursor_over((1..=6).collect(), &[2, 2, 2]);

    let visited = cursor
        .try_for_each(|n| {
            if n == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();

    assert_eq!(visited, 3);
    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(cursor.get_current().unwrap(), 3);
    assert!(!cursor.is_closed());
    assert_eq!(cursor.next().await.unwrap(), 4);
}

#[tokio::test]
async fn test_for_each_propagates_fetch_error() {
    let fetcher = Arc::new(
        MemoryFetcher::new(vec![Page::more(vec![2], "c2")])
            .with_failure(RemoteError::new(RemoteErrorKind::Fault, "disk")),
    );
    let mut cursor = BufferedCursor::new(Arc::clone(&fetcher), Page::more(vec![1], "c1"));

    let mut seen = Vec::new();
    let err = cursor.for_each(|n| seen.push(n)).await.unwrap_err();

    assert_eq!(seen, vec![1, 2]);
    assert!(matches!(
        err,
        Error::Fetch { operation: "cursor.for_each()", kind: RemoteErrorKind::Fault, .. }
    ));
}

// ============================================================================
// get_current Tests
// ============================================================================

#[tokio::test]
async fn test_get_current_tracks_last_item() {
    let (mut cursor, _) = cursor_over(vec![10, 20], &[1]);

    assert!(matches!(cursor.get_current(), Err(Error::NoCurrentItem)));

    let first = cursor.next().await.unwrap();
    assert_eq!(cursor.get_current().unwrap(), first);
    assert_eq!(cursor.get_current().unwrap(), first);

    let second = cursor.next().await.unwrap();
    assert_eq!(cursor.get_current().unwrap(), second);

    assert!(matches!(cursor.next().await, Err(Error::Exhausted)));
    assert!(matches!(cursor.get_current(), Err(Error::Exhausted)));

    cursor.close().await.unwrap();
    assert!(matches!(cursor.get_current(), Err(Error::ClosedCursor { .. })));
}

#[tokio::test]
async fn test_get_current_emits_nothing() {
    let (mut cursor, _) = cursor_over(vec![1], &[]);
    cursor.next().await.unwrap();
    let mut events = cursor.subscribe();

    cursor.get_current().unwrap();
    assert!(received(&mut events).is_empty());
}

// ============================================================================
// close() Tests
// ============================================================================

#[tokio::test]
async fn test_close_twice_fails() {
    let (mut cursor, fetcher) = cursor_over(vec![1, 2, 3], &[1]);
    let mut events = cursor.subscribe();

    cursor.close().await.unwrap();
    assert!(cursor.is_closed());
    assert_eq!(fetcher.close_count(), 1);

    let err = cursor.close().await.unwrap_err();
    assert!(matches!(err, Error::ClosedCursor { operation: "cursor.close()" }));
    assert!(matches!(cursor.next().await, Err(Error::ClosedCursor { .. })));
    assert!(matches!(
        cursor.for_each(|_| {}).await,
        Err(Error::ClosedCursor { .. })
    ));
    assert_eq!(fetcher.close_count(), 1);

    let events = received(&mut events);
    assert!(matches!(events[0], CursorEvent::Close));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CursorEvent::Error(Error::ClosedCursor { .. })))
            .count(),
        3
    );
}

#[tokio::test]
async fn test_exhaustion_releases_once() {
    let (mut cursor, fetcher) = cursor_over(vec![1, 2], &[1]);

    assert_eq!(drain(&mut cursor).await, vec![1, 2]);
    assert_eq!(fetcher.close_count(), 1);
    assert_eq!(fetcher.closed_cursors(), vec![CursorId::new(MEMORY_CURSOR_ID)]);

    cursor.close().await.unwrap();
    assert_eq!(fetcher.close_count(), 1);
}

#[tokio::test]
async fn test_release_on_exhaustion_disabled() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2], &[1]);
    let fetcher = Arc::new(fetcher);
    let config = PagingConfig::builder().release_on_exhaustion(false).build();
    let mut cursor = BufferedCursor::with_config(Arc::clone(&fetcher), first, config);

    drain(&mut cursor).await;
    assert_eq!(fetcher.close_count(), 0);

    cursor.close().await.unwrap();
    assert_eq!(fetcher.close_count(), 1);
}

#[tokio::test]
async fn test_failed_release_still_exhausts() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1], &[]);
    let fetcher = Arc::new(fetcher.failing_close(RemoteError::unknown("gone")));
    let mut cursor = BufferedCursor::new(Arc::clone(&fetcher), first);

    assert_eq!(drain(&mut cursor).await, vec![1]);
    assert_eq!(fetcher.close_count(), 1);
}

#[tokio::test]
async fn test_failed_close_can_be_retried() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2, 3], &[1]);
    let fetcher = Arc::new(fetcher.failing_close(RemoteError::new(RemoteErrorKind::Proxy, "down")));
    let mut cursor = BufferedCursor::new(Arc::clone(&fetcher), first);

    let err = cursor.close().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Fetch { operation: "cursor.close()", kind: RemoteErrorKind::Proxy, .. }
    ));
    assert!(!cursor.is_closed());

    fetcher.set_close_failure(None);
    cursor.close().await.unwrap();
    assert!(cursor.is_closed());
    assert_eq!(fetcher.close_count(), 2);
}

#[tokio::test]
async fn test_close_discards_pending_fetch() {
    let (first, fetcher) = timed_out_fetcher(50);
    let mut cursor = BufferedCursor::new(Arc::clone(&fetcher), first);

    let attempt = tokio::time::timeout(Duration::from_millis(5), cursor.next()).await;
    assert!(attempt.is_err());

    cursor.close().await.unwrap();
    assert_eq!(cursor.buffered(), 0);
    assert!(matches!(cursor.next().await, Err(Error::ClosedCursor { .. })));
    assert_eq!(fetcher.fetch_count(), 1);
}

// ============================================================================
// BackpressureStream Tests
// ============================================================================

#[tokio::test]
async fn test_stream_yields_everything() {
    let (first, fetcher) = MemoryFetcher::paged((1..=9).collect::<Vec<u32>>(), &[3, 3]);
    let fetcher = Arc::new(fetcher);
    let mut stream = BackpressureStream::new(Arc::clone(&fetcher), first);

    let items: Vec<u32> = (&mut stream).try_collect().await.unwrap();

    assert_eq!(items, (1..=9).collect::<Vec<_>>());
    assert_eq!(stream.fetch_count(), 2);
    assert_eq!(fetcher.fetch_count(), 2);
    assert_eq!(fetcher.close_count(), 1);
    assert!(stream.is_finished());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_empty_result() {
    let (first, fetcher) = MemoryFetcher::<u32>::paged(vec![], &[]);
    let fetcher = Arc::new(fetcher);
    let mut stream = BackpressureStream::new(Arc::clone(&fetcher), first);

    assert!(stream.next().await.is_none());
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_stream_pause_blocks_production() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2, 3], &[1]);
    let mut stream = BackpressureStream::new(Arc::new(fetcher), first);

    stream.pause();
    assert!(stream.is_paused());
    assert!(stream.next().now_or_never().is_none());

    stream.resume();
    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn test_stream_resume_from_other_task() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2], &[1]);
    let mut stream = BackpressureStream::new(Arc::new(fetcher), first);
    let flow = stream.flow_control();

    flow.pause();
    let resumer = tokio::spawn({
        let flow = flow.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flow.resume();
        }
    });

    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    assert!(!stream.is_paused());
    resumer.await.unwrap();
}

#[tokio::test]
async fn test_stream_error_then_end() {
    let fetcher = Arc::new(
        MemoryFetcher::new(vec![])
            .with_failure(RemoteError::new(RemoteErrorKind::IteratorTimeout, "expired")),
    );
    let mut stream = BackpressureStream::new(Arc::clone(&fetcher), Page::more(vec![1u32], "c1"));

    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::Fetch { operation: "stream.read()", kind: RemoteErrorKind::IteratorTimeout, .. }
    ));
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
    assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_stream_close_early() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2, 3, 4], &[2]);
    let fetcher = Arc::new(fetcher);
    let mut stream = BackpressureStream::new(Arc::clone(&fetcher), first);

    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    stream.close().await.unwrap();

    assert_eq!(fetcher.close_count(), 1);
    assert!(matches!(
        stream.close().await,
        Err(Error::ClosedCursor { operation: "stream.close()" })
    ));
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_stream_read_after_close() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2, 3], &[1]);
    let mut stream = BackpressureStream::new(Arc::new(fetcher), first);

    stream.close().await.unwrap();

    assert!(matches!(
        stream.next().await,
        Some(Err(Error::ClosedCursor { operation: "stream.read()" }))
    ));
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
    assert!(stream.is_finished());
}

#[tokio::test]
async fn test_stream_failed_close_can_be_retried() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2, 3], &[1]);
    let fetcher = Arc::new(fetcher.failing_close(RemoteError::new(RemoteErrorKind::Proxy, "down")));
    let mut stream = BackpressureStream::new(Arc::clone(&fetcher), first);

    let err = stream.close().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Fetch { operation: "stream.close()", kind: RemoteErrorKind::Proxy, .. }
    ));
    assert!(fetcher.closed_cursors().is_empty());

    fetcher.set_close_failure(None);
    stream.close().await.unwrap();
    assert_eq!(fetcher.close_count(), 2);
    assert_eq!(fetcher.closed_cursors(), vec![CursorId::new(MEMORY_CURSOR_ID)]);

    assert!(matches!(
        stream.close().await,
        Err(Error::ClosedCursor { .. })
    ));
    assert_eq!(fetcher.close_count(), 2);
}

#[tokio::test]
async fn test_stream_without_release() {
    let (first, fetcher) = MemoryFetcher::paged(vec![1, 2], &[1]);
    let fetcher = Arc::new(fetcher);
    let config = PagingConfig::builder().release_on_exhaustion(false).build();
    let stream = BackpressureStream::with_config(Arc::clone(&fetcher), first, config);

    let items: Vec<u32> = stream.try_collect().await.unwrap();
    assert_eq!(items, vec![1, 2]);
    assert_eq!(fetcher.close_count(), 0);
}

#[tokio::test]
async fn test_stream_decoded_rows() {
    let rows = vec![
        r#"{"id": 12345678901234567, "name": "a"}"#.to_string(),
        "not json".to_string(),
        "[1, 2]".to_string(),
    ];
    let (first, fetcher) = MemoryFetcher::paged(rows, &[1]);
    let decoded: Vec<_> = BackpressureStream::new(Arc::new(fetcher), first)
        .decoded()
        .collect()
        .await;

    assert_eq!(decoded.len(), 3);
    let row = decoded[0].as_ref().unwrap();
    assert_eq!(row.get("id"), Some(&Value::BigInt(12_345_678_901_234_567)));
    assert!(matches!(decoded[1], Err(Error::Syntax { .. })));
    assert_eq!(
        decoded[2].as_ref().unwrap(),
        &Value::Array(vec![Value::Number(1.0), Value::Number(2.0)])
    );
}
