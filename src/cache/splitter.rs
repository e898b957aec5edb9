//! Duplicating one body stream into two independently consumed branches.
//!
//! A single pump task owns the source and forwards every chunk to two bounded
//! channels, waiting until both have accepted it before reading the next one.
//! The faster branch can therefore run at most `window + 1` chunks ahead of
//! the slower one, and at most `2 * window + 1` chunks are buffered in total.
//!
//! A branch that is dropped stops constraining the other: the pump keeps
//! feeding the survivor, so a client hanging up does not cancel the cache
//! write and an oversize cache write does not stall the client. When both
//! branches are gone the pump drops the source, releasing the upstream
//! connection.
//!
//! Chunks are [`Bytes`], so forwarding to both sides is a reference count
//! bump rather than a copy.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::trace;

use crate::http::{BodyError, BodyStream};

type Item = Result<Bytes, BodyError>;

/// One side of a split stream.
#[derive(Debug)]
pub struct Branch {
    rx: mpsc::Receiver<Item>,
}

impl Stream for Branch {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Splits `source` into two branches that each yield every chunk of it, in
/// order. A source error is delivered to both branches and ends them.
///
/// `window` is the per-branch channel capacity, in chunks; it is clamped to
/// at least one. Must be called within a Tokio runtime.
pub fn split(source: BodyStream, window: usize) -> (Branch, Branch) {
    let window = window.max(1);
    let (tx_a, rx_a) = mpsc::channel(window);
    let (tx_b, rx_b) = mpsc::channel(window);
    tokio::spawn(pump(source, tx_a, tx_b));
    (Branch { rx: rx_a }, Branch { rx: rx_b })
}

async fn pump(mut source: BodyStream, tx_a: mpsc::Sender<Item>, tx_b: mpsc::Sender<Item>) {
    let mut a = Some(tx_a);
    let mut b = Some(tx_b);
    let mut chunks: u64 = 0;

    while a.is_some() || b.is_some() {
        let Some(item) = source.next().await else {
            break;
        };
        let failed = item.is_err();
        chunks += 1;

        tokio::join!(forward(&mut a, item.clone()), forward(&mut b, item));

        if failed {
            break;
        }
    }

    trace!(chunks, a_open = a.is_some(), b_open = b.is_some(), "split pump finished");
}

async fn forward(slot: &mut Option<mpsc::Sender<Item>>, item: Item) {
    if let Some(tx) = slot {
        if tx.send(item).await.is_err() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::stream;
    use proptest::prelude::*;

    use super::*;

    fn numbered_chunks(n: usize) -> Vec<Item> {
        (0..n).map(|i| Ok(Bytes::from(i.to_string()))).collect()
    }

    // Counts how many chunks the pump has pulled from the source.
    fn counted(items: Vec<Item>) -> (BodyStream, Arc<AtomicUsize>) {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = stream::iter(items).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (Box::pin(source), pulled)
    }

    async fn drain(branch: Branch) -> Vec<Item> {
        branch.collect().await
    }

    #[tokio::test]
    async fn both_branches_see_every_chunk() {
        let items = numbered_chunks(50);
        let (a, b) = split(Box::pin(stream::iter(items.clone())), 4);
        let (got_a, got_b) = tokio::join!(drain(a), drain(b));
        assert_eq!(got_a, items);
        assert_eq!(got_b, items);
    }

    #[tokio::test]
    async fn one_branch_can_finish_before_other_starts_within_window() {
        let items = numbered_chunks(5);
        let (a, b) = split(Box::pin(stream::iter(items.clone())), 8);
        assert_eq!(drain(b).await, items);
        assert_eq!(drain(a).await, items);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_branch_bounds_the_lead() {
        let window = 3;
        let (source, pulled) = counted(numbered_chunks(100));
        let (mut a, b) = split(source, window);

        let mut received = 0;
        while let Ok(Some(_)) = tokio::time::timeout(Duration::from_secs(1), a.next()).await {
            received += 1;
        }

        assert_eq!(received, window + 1);
        assert_eq!(pulled.load(Ordering::SeqCst), window + 1);
        drop(b);
    }

    #[tokio::test]
    async fn dropping_one_branch_releases_the_other() {
        let items = numbered_chunks(200);
        let (a, b) = split(Box::pin(stream::iter(items.clone())), 2);
        drop(a);
        assert_eq!(drain(b).await, items);
    }

    #[tokio::test]
    async fn source_error_reaches_both_branches() {
        let items = vec![
            Ok(Bytes::from_static(b"head")),
            Err(BodyError::new("connection reset")),
            Ok(Bytes::from_static(b"never")),
        ];
        let (a, b) = split(Box::pin(stream::iter(items)), 4);
        let (got_a, got_b) = tokio::join!(drain(a), drain(b));
        for got in [got_a, got_b] {
            assert_eq!(got.len(), 2);
            assert_eq!(got[1], Err(BodyError::new("connection reset")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn source_is_released_when_both_branches_drop() {
        let (source, pulled) = counted(numbered_chunks(1000));
        let (a, b) = split(source, 2);
        drop(a);
        drop(b);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pulled.load(Ordering::SeqCst) <= 1);
    }

    async fn consume_slowly(mut branch: Branch, pauses: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::new();
        let mut i = 0;
        while let Some(chunk) = branch.next().await {
            out.extend_from_slice(&chunk.unwrap());
            for _ in 0..pauses.get(i % pauses.len().max(1)).copied().unwrap_or(0) {
                tokio::task::yield_now().await;
            }
            i += 1;
        }
        out
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn branches_are_byte_identical_to_source(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..40),
            window in 1usize..8,
            pauses_a in prop::collection::vec(0u8..6, 1..8),
            pauses_b in prop::collection::vec(0u8..6, 1..8),
        ) {
            let expected: Vec<u8> = chunks.concat();
            let items: Vec<Item> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (got_a, got_b) = runtime.block_on(async move {
                let (a, b) = split(Box::pin(stream::iter(items)), window);
                let ta = tokio::spawn(consume_slowly(a, pauses_a));
                let tb = tokio::spawn(consume_slowly(b, pauses_b));
                (ta.await.unwrap(), tb.await.unwrap())
            });

            prop_assert_eq!(&got_a, &expected);
            prop_assert_eq!(&got_b, &expected);
        }

        #[test]
        fn lead_never_exceeds_window(
            total in 1usize..60,
            window in 1usize..6,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let lead = runtime.block_on(async move {
                let (source, pulled) = counted(numbered_chunks(total));
                let (mut a, b) = split(source, window);
                let mut max_lead = 0;
                let mut received = 0;
                while let Some(_) = a.next().await {
                    received += 1;
                    max_lead = max_lead.max(pulled.load(Ordering::SeqCst));
                    if received == total.min(window + 1) {
                        break;
                    }
                }
                // b has consumed nothing, so everything pulled is its backlog.
                for _ in 0..16 {
                    tokio::task::yield_now().await;
                }
                let backlog = pulled.load(Ordering::SeqCst);
                drop(b);
                max_lead.max(backlog)
            });
            prop_assert!(lead <= window + 1, "pulled {} with window {}", lead, window);
        }
    }
}
