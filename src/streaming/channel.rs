/*!
 * Event Channel
 * Bounded single-producer channel that evicts the oldest event on overflow
 */

use crate::events::CapturedEvent;
use flume::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Producer side of a stream's event channel
///
/// Holds its own receiver clone purely to evict from the front, so a full
/// channel never blocks the poll loop. That receiver also keeps the channel
/// connected while readers come and go; dropping the producer closes it for
/// every reader once they drain it.
pub struct EventChannel {
    tx: Sender<CapturedEvent>,
    evict: Receiver<CapturedEvent>,
    dropped: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
}

/// Outcome of one non-blocking publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Delivered,
    /// Delivered after evicting this many older events
    Evicted(u64),
}

impl EventChannel {
    /// Create a channel and its first reader
    pub fn bounded(capacity: usize) -> (Self, Receiver<CapturedEvent>) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        let channel = Self {
            tx,
            evict: rx.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
            sent: Arc::new(AtomicU64::new(0)),
        };
        (channel, rx)
    }

    /// Publish without blocking, evicting the oldest events while full
    pub fn publish(&self, event: CapturedEvent) -> Publish {
        let mut pending = event;
        let mut evicted = 0u64;

        loop {
            match self.tx.try_send(pending) {
                Ok(()) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    return if evicted == 0 {
                        Publish::Delivered
                    } else {
                        Publish::Evicted(evicted)
                    };
                }
                // `evict` holds the channel open, so the only failure is a full queue
                Err(full) => {
                    pending = full.into_inner();
                    // A concurrent reader may have freed the slot already
                    if self.evict.try_recv().is_ok() {
                        evicted += 1;
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("sent", &self.sent())
            .field("dropped", &self.dropped())
            .finish()
    }
}
