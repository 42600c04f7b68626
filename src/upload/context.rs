/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Shared state threaded through a single Putter's workers.

use std::sync::{Arc, Mutex};

use url::Url;

use crate::credentials::Keys;
use crate::error::LatchedError;
use crate::pool::BufferPool;

#[derive(Clone)]
pub(super) struct UploadContext {
    pub(super) client: reqwest::Client,
    pub(super) keys: Arc<Keys>,
    pub(super) region: Arc<String>,
    pub(super) url: Arc<Url>,
    pub(super) upload_id: Arc<String>,
    pub(super) n_try: u32,
    pub(super) pool: BufferPool,
    pub(super) latch: Arc<Mutex<Option<LatchedError>>>,
}

impl UploadContext {
    pub(super) fn latch_error(&self, err: &crate::error::TransferError) {
        let mut guard = self.latch.lock().expect("latch mutex poisoned");
        if guard.is_none() {
            *guard = Some(err.latch());
        }
    }

    pub(super) fn take_latched(&self) -> Option<LatchedError> {
        self.latch.lock().expect("latch mutex poisoned").clone()
    }
}
