/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Time-evicting buffer pool (spec §4.4).
//!
//! Grounded on `original_source/pool.go`'s `bp` actor: a background loop
//! selecting over get/give/resize/quit channels, handing out a fresh buffer
//! when the pool is empty and sweeping buffers idle longer than one minute.
//! The Go version stores buffers in a `container/list.List`; this uses a
//! `VecDeque` pushed/popped from the front for the same LIFO reuse pattern.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

const EVICTION_PERIOD: Duration = Duration::from_secs(60);

enum Command {
    Get(oneshot::Sender<Vec<u8>>),
    Give(Vec<u8>),
    Resize(u64),
}

/// Handle to a running buffer pool. Cloning shares the same background task;
/// the task exits once every handle has been dropped.
#[derive(Clone)]
pub(crate) struct BufferPool {
    tx: mpsc::Sender<Command>,
}

impl BufferPool {
    /// Spawn the pool's background task, handing out buffers of `bufsz`
    /// bytes until [`BufferPool::resize`] changes that.
    pub(crate) fn new(bufsz: u64) -> Self {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run(rx, bufsz));
        Self { tx }
    }

    /// Borrow a buffer from the pool, allocating one if none is idle.
    pub(crate) async fn get(&self) -> Vec<u8> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Get(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Return a buffer to the pool for reuse.
    pub(crate) async fn give(&self, buf: Vec<u8>) {
        let _ = self.tx.send(Command::Give(buf)).await;
    }

    /// Change the buffer size used for newly allocated buffers (spec §4.4,
    /// part-size doubling forces larger buffers mid-transfer).
    pub(crate) async fn resize(&self, bufsz: u64) {
        let _ = self.tx.send(Command::Resize(bufsz)).await;
    }
}

async fn run(mut rx: mpsc::Receiver<Command>, mut bufsz: u64) {
    let mut queue: VecDeque<(Instant, Vec<u8>)> = VecDeque::new();
    let mut makes: u64 = 0;
    let mut sweep = tokio::time::interval(EVICTION_PERIOD);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Get(reply)) => {
                        let buf = match queue.pop_front() {
                            Some((_, b)) => b,
                            None => {
                                makes += 1;
                                vec![0u8; bufsz as usize]
                            }
                        };
                        let _ = reply.send(buf);
                    }
                    Some(Command::Give(buf)) => {
                        queue.push_front((Instant::now(), buf));
                    }
                    Some(Command::Resize(sz)) => {
                        bufsz = sz;
                        queue.clear();
                    }
                    None => {
                        debug!(makes, bufsz, "buffer pool shutting down");
                        return;
                    }
                }
            }
            _ = sweep.tick() => {
                let before = queue.len();
                let now = Instant::now();
                queue.retain(|(when, _)| now.duration_since(*when) <= EVICTION_PERIOD);
                let evicted = before - queue.len();
                if evicted > 0 {
                    debug!(evicted, remaining = queue.len(), "evicted idle buffers");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_requested_size() {
        let pool = BufferPool::new(16);
        let buf = pool.get().await;
        assert_eq!(buf.len(), 16);
    }

    #[tokio::test]
    async fn given_buffer_is_reused() {
        let pool = BufferPool::new(8);
        let mut buf = pool.get().await;
        buf[0] = 42;
        pool.give(buf).await;
        // Give a tick for the actor to process the Give before the Get.
        tokio::task::yield_now().await;
        let reused = pool.get().await;
        assert_eq!(reused[0], 42);
    }

    #[tokio::test]
    async fn resize_affects_subsequent_allocations() {
        let pool = BufferPool::new(8);
        pool.resize(32).await;
        tokio::task::yield_now().await;
        let buf = pool.get().await;
        assert_eq!(buf.len(), 32);
    }
}
