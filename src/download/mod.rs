/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The parallel download pipeline (spec §4.1).
//!
//! [`Getter::open`] issues an initializing GET, spawns an enumerator and a
//! worker pool, and returns a [`Getter`] whose [`Getter::read`] drains
//! reassembled chunks in order. Grounded on `original_source/getter.go`'s
//! `newGetter`/`Read`/`Close`, restructured around an enumerator/worker/body
//! channel topology (`download::worker`, `download::body`).

mod body;
mod context;
mod header;
mod worker;

use std::cmp;
use std::sync::{Arc, Mutex};

use md5::{Digest, Md5};
use reqwest::Method;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::{send_with_header_timeout, Config};
use crate::credentials::Keys;
use crate::error::TransferError;
use crate::pool::BufferPool;
use crate::signer;

use body::Body;
use context::DownloadContext;
use worker::{distribute_work, download_chunks};

/// Completed-but-unread chunks the enumerator is allowed to have sitting
/// ahead of the reader (spec §4.1, "qWaitMax").
const QWAIT_MAX: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Streaming,
    Drained,
    Errored,
    Closed,
}

/// Sequential reader for a remote object, backed by a pool of workers
/// issuing concurrent ranged GETs (spec §4.1).
pub struct Getter {
    content_length: u64,
    bytes_delivered: u64,
    body: Body,
    current: Option<(Vec<u8>, usize)>,
    slots: Arc<Semaphore>,
    pool: BufferPool,
    hasher: Option<Md5>,
    sidecar_url: Option<Url>,
    ctx: GetterVerifyContext,
    quit_tx: watch::Sender<bool>,
    enumerator: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    latch: Arc<Mutex<Option<crate::error::LatchedError>>>,
    state: State,
}

/// The subset of context a closed Getter still needs, for the sidecar MD5
/// verification GET issued during `close`.
struct GetterVerifyContext {
    client: reqwest::Client,
    keys: Arc<Keys>,
    region: Arc<String>,
}

impl Getter {
    /// Open a sequential reader for `url` (spec §4.1, "Initialization").
    ///
    /// Issues a signed GET (not HEAD) to discover content-length, rejects
    /// chunked-transfer responses, then spawns `config.concurrency` workers
    /// plus one enumerator task. `sidecar_url`, when set, is GET'd during
    /// [`Getter::close`] to verify the accumulated MD5 (spec §4.1,
    /// "Integrity check").
    pub async fn open(
        url: Url,
        sidecar_url: Option<Url>,
        keys: Keys,
        region: String,
        config: &Config,
    ) -> Result<(Self, reqwest::header::HeaderMap), TransferError> {
        let keys = Arc::new(keys);
        let region = Arc::new(region);

        let mut headers = reqwest::header::HeaderMap::new();
        signer::sign(
            &keys,
            &region,
            &Method::GET,
            &url,
            &mut headers,
            signer::empty_payload_hash(),
        )?;

        let resp = send_with_header_timeout("get-object", config.client.get(url.clone()).headers(headers)).await?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(crate::retry::status_error("get-object", status.as_u16(), &body));
        }

        if resp.headers().get(reqwest::header::TRANSFER_ENCODING).is_some()
            && resp.headers().get(reqwest::header::CONTENT_LENGTH).is_none()
        {
            return Err(TransferError::precondition(
                "chunked-transfer responses are not supported",
            ));
        }

        let content_length: u64 = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| TransferError::precondition("response is missing content-length"))?;

        let response_headers = resp.headers().clone();

        let pool = BufferPool::new(config.part_size);
        let slots = Arc::new(Semaphore::new(config.effective_concurrency() + QWAIT_MAX));
        let latch = Arc::new(Mutex::new(None));
        let (quit_tx, _quit_rx) = watch::channel(false);

        let ctx = DownloadContext {
            client: config.client.clone(),
            keys: keys.clone(),
            region: region.clone(),
            url: Arc::new(url),
            n_try: config.effective_n_try(),
            pool: pool.clone(),
            latch: latch.clone(),
            quit_tx: quit_tx.clone(),
        };

        let (work_tx, work_rx) = async_channel::bounded(config.effective_concurrency());
        let (result_tx, result_rx) = mpsc::channel(config.effective_concurrency());

        let mut workers = Vec::with_capacity(config.effective_concurrency());
        for _ in 0..config.effective_concurrency() {
            let ctx = ctx.clone();
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            workers.push(tokio::spawn(download_chunks(ctx, work_rx, result_tx)));
        }
        drop(result_tx);

        let enumerator = if content_length == 0 {
            work_tx.close();
            None
        } else {
            Some(tokio::spawn(distribute_work(
                0,
                content_length - 1,
                config.part_size,
                slots.clone(),
                work_tx,
                quit_tx.subscribe(),
            )))
        };

        let getter = Self {
            content_length,
            bytes_delivered: 0,
            body: Body::new(result_rx),
            current: None,
            slots,
            pool,
            hasher: config.md5_check.then(Md5::new),
            sidecar_url,
            ctx: GetterVerifyContext {
                client: config.client.clone(),
                keys,
                region,
            },
            quit_tx,
            enumerator,
            workers,
            latch,
            state: State::Open,
        };

        Ok((getter, response_headers))
    }

    /// Total content length discovered at open time.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Read the next chunk of bytes into `buf`, returning the number of
    /// bytes written (0 at end-of-stream). Mirrors `io.Reader` semantics
    /// (spec §4.1, "Reassembly").
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        if self.state == State::Closed {
            return Err(TransferError::State("read after close"));
        }
        if self.state == State::Errored {
            return Err(self.latched_error());
        }
        if self.bytes_delivered >= self.content_length {
            self.state = State::Drained;
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.state = State::Streaming;

        if self.current.is_none() {
            match self.body.next().await {
                None => {
                    if let Some(latched) = self.latch.lock().expect("latch poisoned").take() {
                        self.state = State::Errored;
                        return Err(latched.into_error());
                    }
                    self.state = State::Drained;
                    return Ok(0);
                }
                Some(Err(err)) => {
                    self.state = State::Errored;
                    return Err(err);
                }
                Some(Ok(chunk)) => {
                    if let Some(hasher) = self.hasher.as_mut() {
                        hasher.update(&chunk);
                    }
                    self.slots.add_permits(1);
                    self.current = Some((chunk, 0));
                }
            }
        }

        let (chunk, offset) = self.current.as_mut().expect("just populated");
        let available = chunk.len() - *offset;
        let to_copy = cmp::min(available, buf.len());
        buf[..to_copy].copy_from_slice(&chunk[*offset..*offset + to_copy]);
        *offset += to_copy;
        self.bytes_delivered += to_copy as u64;

        if *offset == chunk.len() {
            let (drained, _) = self.current.take().expect("just checked");
            self.pool.give(drained).await;
        }

        Ok(to_copy)
    }

    fn latched_error(&self) -> TransferError {
        self.latch
            .lock()
            .expect("latch poisoned")
            .clone()
            .map(|l| l.into_error())
            .unwrap_or(TransferError::State("reader in error state"))
    }

    /// Close the reader: broadcast quit, join workers, verify the total
    /// byte count and (if enabled) the whole-object MD5 sidecar (spec §4.1,
    /// "Integrity check").
    pub async fn close(mut self) -> Result<(), TransferError> {
        if self.state == State::Closed {
            return Ok(());
        }
        let _ = self.quit_tx.send(true);
        if let Some(enumerator) = self.enumerator.take() {
            let _ = enumerator.await;
        }
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        self.state = State::Closed;

        if let Some(latched) = self.latch.lock().expect("latch poisoned").take() {
            return Err(latched.into_error());
        }

        if self.bytes_delivered != self.content_length {
            return Err(TransferError::integrity(
                "get-object",
                format!(
                    "read error: {} bytes read. expected: {}",
                    self.bytes_delivered, self.content_length
                ),
            ));
        }

        if let (Some(hasher), Some(sidecar_url)) = (self.hasher.take(), self.sidecar_url.clone()) {
            let calculated = hex::encode(hasher.finalize());
            self.verify_sidecar(sidecar_url, &calculated).await?;
        }

        Ok(())
    }

    async fn verify_sidecar(&self, sidecar_url: Url, calculated_md5: &str) -> Result<(), TransferError> {
        let mut headers = reqwest::header::HeaderMap::new();
        signer::sign(
            &self.ctx.keys,
            &self.ctx.region,
            &Method::GET,
            &sidecar_url,
            &mut headers,
            signer::empty_payload_hash(),
        )?;

        let resp =
            send_with_header_timeout("md5-check", self.ctx.client.get(sidecar_url.clone()).headers(headers)).await?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(crate::retry::status_error("md5-check", status.as_u16(), &body));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| TransferError::transport("md5-check", e))?;
        let given = body.trim();

        if given != calculated_md5 {
            return Err(TransferError::integrity(
                "md5-check",
                format!("MD5 mismatch. given:{given} calculated:{calculated_md5}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qwait_max_matches_spec() {
        assert_eq!(QWAIT_MAX, 2);
    }
}
