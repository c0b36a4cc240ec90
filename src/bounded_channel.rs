// SPDX-License-Identifier: Apache-2.0

//! Bounded multi-producer, single-consumer channel used to fan events from
//! every followed file into the delivery loop.
//!
//! A full channel applies back-pressure: producers wait for capacity instead
//! of dropping. Nothing is ever discarded by the channel itself.

use flume::{Receiver, SendTimeoutError, Sender};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How long a blocking send waits for capacity before re-checking cancellation.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("channel disconnected")]
    Disconnected,
    #[error("send cancelled")]
    Cancelled,
}

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

impl<T> BoundedSender<T> {
    pub async fn send(&self, item: T) -> Result<(), SendError> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| SendError::Disconnected) // receiver closed
    }

    /// Blocking send - blocks until there is capacity in the channel.
    /// Use this from non-async contexts (e.g., dedicated OS threads).
    pub fn send_blocking(&self, item: T) -> Result<(), SendError> {
        self.tx.send(item).map_err(|_| SendError::Disconnected)
    }

    /// Blocking send that re-checks `cancel` while the channel is full.
    pub fn send_blocking_cancellable(
        &self,
        item: T,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        let mut item = item;
        loop {
            if cancel.is_cancelled() {
                return Err(SendError::Cancelled);
            }
            match self.tx.send_timeout(item, CANCEL_CHECK_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => item = returned,
                Err(SendTimeoutError::Disconnected(_)) => return Err(SendError::Disconnected),
            }
        }
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// The single consumer side. Deliberately not `Clone`.
pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    /// Waits for the next item. Returns `None` once every sender is dropped
    /// and the channel has been drained.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    /// Non-blocking receive - returns immediately.
    /// Returns None if no item is available or channel is disconnected.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);

    (BoundedSender { tx }, BoundedReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::{SendError, bounded};
    use std::time::Duration;
    use tokio_test::{assert_ok, assert_pending, assert_ready, task::spawn};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn basics() {
        let (tx, mut rx) = bounded(3);

        let msg = 10;

        // wrap futures
        let mut send1 = spawn(async { tx.send(msg).await });
        let mut recv1 = spawn(async { rx.next().await });

        // receiver should be in pending state
        assert_pending!(recv1.poll());

        assert_ok!(assert_ready!(send1.poll()));

        assert!(recv1.is_woken());

        assert_eq!(Some(msg), assert_ready!(recv1.poll()));

        drop(send1);
        drop(recv1);

        let mut recv2 = spawn(async { rx.next().await });

        drop(tx);
        // receives None since send channel was closed
        assert_eq!(None, assert_ready!(recv2.poll()));
    }

    #[tokio::test]
    async fn push_beyond_capacity_waits_for_consumer() {
        const K: usize = 10;
        let (tx, mut rx) = bounded(K);

        for i in 0..K {
            let mut send = spawn(async { tx.send(i).await });
            assert_ok!(assert_ready!(send.poll()));
        }
        assert_eq!(rx.len(), K);

        // The (K+1)th push has nowhere to go
        let mut overflow = spawn(async { tx.send(K).await });
        assert_pending!(overflow.poll());
        assert_pending!(overflow.poll());

        assert_eq!(Some(0), rx.next().await);

        assert_ok!(assert_ready!(overflow.poll()));
        drop(overflow);

        // Nothing was dropped along the way
        let mut received = Vec::new();
        while let Some(v) = rx.try_recv() {
            received.push(v);
        }
        assert_eq!(received, (1..=K).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sender_fails_on_rx_close() {
        let (tx, rx) = bounded(1);

        let mut send1 = spawn(async { tx.send(10).await });

        drop(rx);
        assert_eq!(Err(SendError::Disconnected), assert_ready!(send1.poll()));
    }

    #[test]
    fn blocking_send_cancelled_while_full() {
        let (tx, rx) = bounded(1);
        let cancel = CancellationToken::new();

        tx.send_blocking(1).unwrap();

        let worker_cancel = cancel.clone();
        let handle =
            std::thread::spawn(move || tx.send_blocking_cancellable(2, &worker_cancel));

        std::thread::sleep(Duration::from_millis(150));
        assert!(!handle.is_finished());

        cancel.cancel();
        assert_eq!(Err(SendError::Cancelled), handle.join().unwrap());

        // The first item is still there, the cancelled one never made it in
        assert_eq!(Some(1), rx.try_recv());
        assert_eq!(None, rx.try_recv());
    }

    #[test]
    fn blocking_send_resumes_when_capacity_frees() {
        let (tx, rx) = bounded(1);
        let cancel = CancellationToken::new();

        tx.send_blocking(1).unwrap();

        let handle = std::thread::spawn(move || tx.send_blocking_cancellable(2, &cancel));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(Some(1), rx.try_recv());

        assert_eq!(Ok(()), handle.join().unwrap());
        assert_eq!(Some(2), rx.try_recv());
    }

    #[tokio::test]
    async fn producers_keep_their_own_order() {
        let (tx, mut rx) = bounded(2);

        let mut producers = Vec::new();
        for producer in 0..3u32 {
            let tx = tx.clone();
            producers.push(tokio::spawn(async move {
                for seq in 0..50u32 {
                    tx.send((producer, seq)).await.unwrap();
                }
            }));
        }
        drop(tx);

        let mut last_seen: [Option<u32>; 3] = [None; 3];
        let mut total = 0;
        while let Some((producer, seq)) = rx.next().await {
            let last = &mut last_seen[producer as usize];
            assert_eq!(last.map_or(0, |l| l + 1), seq);
            *last = Some(seq);
            total += 1;
        }
        assert_eq!(total, 150);

        for p in producers {
            p.await.unwrap();
        }
    }
}
