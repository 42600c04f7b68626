/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Shared state threaded through a single Getter's enumerator and workers.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use url::Url;

use crate::credentials::Keys;
use crate::error::LatchedError;
use crate::pool::BufferPool;

#[derive(Clone)]
pub(super) struct DownloadContext {
    pub(super) client: reqwest::Client,
    pub(super) keys: Arc<Keys>,
    pub(super) region: Arc<String>,
    pub(super) url: Arc<Url>,
    pub(super) n_try: u32,
    pub(super) pool: BufferPool,
    pub(super) latch: Arc<Mutex<Option<LatchedError>>>,
    pub(super) quit_tx: watch::Sender<bool>,
}

impl DownloadContext {
    pub(super) fn quit_rx(&self) -> watch::Receiver<bool> {
        self.quit_tx.subscribe()
    }

    /// Latch a fatal error (first writer wins) and broadcast quit.
    pub(super) fn latch_error(&self, err: &crate::error::TransferError) {
        let mut guard = self.latch.lock().expect("latch mutex poisoned");
        if guard.is_none() {
            *guard = Some(err.latch());
        }
        drop(guard);
        let _ = self.quit_tx.send(true);
    }

    pub(super) fn take_latched(&self) -> Option<LatchedError> {
        self.latch.lock().expect("latch mutex poisoned").clone()
    }
}
