use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;
use udl_dag::HeadChange;

use crate::error::{LedgerError, LedgerResult};

/// Receiving end of the chain-head feed.
pub type HeadStream = mpsc::Receiver<HeadChange>;

/// Fan-out of canonical head changes to bounded subscriber queues.
///
/// Changes are queued with [`enqueue`](Self::enqueue), which never blocks,
/// and delivered by [`flush`](Self::flush). One flush runs at a time and
/// drains the queue front to back, so every subscriber sees every change in
/// enqueue order. Delivery blocks while a subscriber's queue is full. A
/// subscriber whose receiver was dropped is removed on the next delivery.
///
/// `flush` uses `blocking_send` and must not run on an async worker
/// thread; ledger mutations called from async code belong in
/// `tokio::task::spawn_blocking`.
pub struct HeadFeed {
    subscribers: Mutex<Vec<mpsc::Sender<HeadChange>>>,
    outbox: Mutex<VecDeque<HeadChange>>,
    delivery: Mutex<()>,
    capacity: usize,
}

impl HeadFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            outbox: Mutex::new(VecDeque::new()),
            delivery: Mutex::new(()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> LedgerResult<HeadStream> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .push(tx);
        Ok(rx)
    }

    /// Queue a change for delivery.
    pub fn enqueue(&self, change: HeadChange) -> LedgerResult<()> {
        self.outbox
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .push_back(change);
        Ok(())
    }

    /// Deliver every queued change, including ones queued by other callers
    /// while this flush runs.
    pub fn flush(&self) -> LedgerResult<()> {
        let _delivery = self.delivery.lock().map_err(|_| LedgerError::Poisoned)?;
        loop {
            let next = self
                .outbox
                .lock()
                .map_err(|_| LedgerError::Poisoned)?
                .pop_front();
            match next {
                Some(change) => self.deliver(&change)?,
                None => return Ok(()),
            }
        }
    }

    /// Queue and deliver one change.
    pub fn publish(&self, change: HeadChange) -> LedgerResult<()> {
        self.enqueue(change)?;
        self.flush()
    }

    fn deliver(&self, change: &HeadChange) -> LedgerResult<()> {
        let mut subscribers = self.subscribers.lock().map_err(|_| LedgerError::Poisoned)?;
        let before = subscribers.len();
        subscribers.retain(|tx| tx.blocking_send(change.clone()).is_ok());
        if subscribers.len() < before {
            debug!(
                dropped = before - subscribers.len(),
                remaining = subscribers.len(),
                "removed closed head subscribers"
            );
        }
        Ok(())
    }

    /// End every stream. Receivers drain what is queued and then see `None`.
    pub fn close(&self) -> LedgerResult<()> {
        self.subscribers
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .clear();
        Ok(())
    }

    pub fn subscriber_count(&self) -> LedgerResult<usize> {
        Ok(self
            .subscribers
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .len())
    }

    /// Changes queued but not yet delivered.
    pub fn queued(&self) -> LedgerResult<usize> {
        Ok(self.outbox.lock().map_err(|_| LedgerError::Poisoned)?.len())
    }
}
