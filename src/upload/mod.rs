/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The parallel multipart-upload pipeline (spec §4.2).
//!
//! [`Putter::create`] issues the multipart-init POST, spawns a worker pool,
//! and returns a [`Putter`] whose [`Putter::write`] fills pool-issued buffers
//! and dispatches full parts to workers. Grounded on
//! `original_source/putter.go`'s `newPutter`/`Write`/`flush`/`Close`.

mod context;
mod part;
mod worker;

use std::cmp;
use std::sync::{Arc, Mutex};

use md5::{Digest, Md5};
use reqwest::Method;
use sha2::Sha256;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::{send_with_header_timeout, Config};
use crate::credentials::Keys;
use crate::error::{LatchedError, TransferError};
use crate::pool::BufferPool;
use crate::retry::{retry, status_error};
use crate::signer;
use crate::xml_body::{
    strip_etag_quotes, CompleteMultipartUpload, CompleteMultipartUploadResult, CompletedPart,
    InitiateMultipartUploadResult,
};
use crate::{MAX_OBJECT_SIZE, MAX_PART_COUNT, MAX_PART_SIZE, MIN_PART_SIZE};

use context::UploadContext;
use part::{hash_part, Part};
use worker::upload_parts;

/// Part-count threshold at which [`should_grow_part_size`] is consulted
/// (spec §4.2, "Part sizing").
const GROWTH_CHECK_INTERVAL: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Buffering,
    Failed,
    Closed,
}

/// Sequential writer for a new remote object, backed by a pool of workers
/// issuing concurrent multipart-upload PUTs (spec §4.2).
pub struct Putter {
    client: reqwest::Client,
    keys: Arc<Keys>,
    region: Arc<String>,
    url: Arc<Url>,
    upload_id: Arc<String>,
    n_try: u32,
    pool: BufferPool,
    part_size: u64,
    buf: Option<Vec<u8>>,
    buf_len: usize,
    part_number: u64,
    parts_meta: Vec<CompletedPart>,
    md5_of_parts: Md5,
    whole_md5: Option<Md5>,
    bytes_written: u64,
    work_tx: async_channel::Sender<Part>,
    workers: Vec<JoinHandle<()>>,
    latch: Arc<Mutex<Option<LatchedError>>>,
    md5_check: bool,
    sidecar_url: Option<Url>,
    state: State,
}

impl Putter {
    /// Open a sequential writer for `url` (spec §4.2, "Initialization").
    ///
    /// `user_headers` is merged onto the initiating POST (metadata,
    /// encryption, ACL, ...). `sidecar_url`, when set, receives the
    /// whole-object hex MD5 during [`Putter::close`] if `config.md5_check`.
    pub async fn create(
        url: Url,
        sidecar_url: Option<Url>,
        user_headers: reqwest::header::HeaderMap,
        keys: Keys,
        region: String,
        config: &Config,
    ) -> Result<Self, TransferError> {
        let keys = Arc::new(keys);
        let region = Arc::new(region);

        let mut init_url = url.clone();
        init_url.query_pairs_mut().append_pair("uploads", "");

        let mut headers = user_headers;
        signer::sign(
            &keys,
            &region,
            &Method::POST,
            &init_url,
            &mut headers,
            signer::empty_payload_hash(),
        )?;

        let resp = send_with_header_timeout(
            "create-multipart-upload",
            config.client.post(init_url).headers(headers),
        )
        .await?;

        let status = resp.status();
        let bytes = resp.bytes().await.unwrap_or_default();
        if status.as_u16() != 200 {
            return Err(status_error("create-multipart-upload", status.as_u16(), &bytes));
        }

        let init: InitiateMultipartUploadResult = quick_xml::de::from_reader(bytes.as_ref())
            .map_err(|e| TransferError::precondition(format!("invalid create-multipart-upload response: {e}")))?;

        let part_size = config.part_size.max(MIN_PART_SIZE);
        let pool = BufferPool::new(part_size);
        let latch = Arc::new(Mutex::new(None));
        let upload_id = Arc::new(init.upload_id);
        let url = Arc::new(url);

        let (work_tx, work_rx) = async_channel::bounded(config.effective_concurrency());

        let ctx = UploadContext {
            client: config.client.clone(),
            keys: keys.clone(),
            region: region.clone(),
            url: url.clone(),
            upload_id: upload_id.clone(),
            n_try: config.effective_n_try(),
            pool: pool.clone(),
            latch: latch.clone(),
        };

        let mut workers = Vec::with_capacity(config.effective_concurrency());
        for _ in 0..config.effective_concurrency() {
            let ctx = ctx.clone();
            let work_rx = work_rx.clone();
            workers.push(tokio::spawn(upload_parts(ctx, work_rx)));
        }

        Ok(Self {
            client: config.client.clone(),
            keys,
            region,
            url,
            upload_id,
            n_try: config.effective_n_try(),
            pool,
            part_size,
            buf: None,
            buf_len: 0,
            part_number: 0,
            parts_meta: Vec::new(),
            md5_of_parts: Md5::new(),
            whole_md5: config.md5_check.then(Md5::new),
            bytes_written: 0,
            work_tx,
            workers,
            latch,
            md5_check: config.md5_check,
            sidecar_url,
            state: State::Open,
        })
    }

    /// Write `data` into the current part buffer, flushing full parts to
    /// workers as they fill (spec §4.2, "Write path").
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, TransferError> {
        if self.state == State::Closed {
            self.abort().await;
            return Err(TransferError::State("write after close"));
        }
        if let Some(err) = self.peek_latch() {
            self.state = State::Failed;
            self.abort().await;
            return Err(err);
        }
        self.state = State::Buffering;

        if let Some(hasher) = self.whole_md5.as_mut() {
            hasher.update(data);
        }

        let mut written = 0usize;
        let mut remaining = data;
        while !remaining.is_empty() {
            if self.buf.is_none() {
                self.buf = Some(self.pool.get().await);
                self.buf_len = 0;
            }
            let buf = self.buf.as_mut().expect("just populated");
            let capacity = buf.len();
            let space = capacity - self.buf_len;
            let n = cmp::min(space, remaining.len());
            buf[self.buf_len..self.buf_len + n].copy_from_slice(&remaining[..n]);
            self.buf_len += n;
            self.bytes_written += n as u64;
            remaining = &remaining[n..];
            written += n;

            if self.buf_len == capacity {
                let full = self.buf.take().expect("just filled");
                self.buf_len = 0;
                if let Err(err) = self.emit_part(full).await {
                    self.state = State::Failed;
                    self.abort().await;
                    return Err(err);
                }
            }
        }

        Ok(written)
    }

    /// Flush any buffered bytes, join the worker pool, commit the
    /// multipart upload, and (if enabled) verify the whole-object MD5
    /// sidecar (spec §4.2, "Completion").
    pub async fn close(mut self) -> Result<(), TransferError> {
        let result = self.finish().await;
        self.state = State::Closed;
        result
    }

    async fn finish(&mut self) -> Result<(), TransferError> {
        if let Some(buf) = self.buf.take() {
            let mut buf = buf;
            buf.truncate(self.buf_len);
            if let Err(err) = self.emit_part(buf).await {
                self.abort().await;
                return Err(err);
            }
        } else if self.part_number == 0 {
            if let Err(err) = self.emit_part(Vec::new()).await {
                self.abort().await;
                return Err(err);
            }
        }

        self.work_tx.close();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }

        if let Some(latched) = self.latch.lock().expect("latch mutex poisoned").take() {
            self.abort().await;
            return Err(latched.into_error());
        }

        self.complete().await
    }

    /// Assign the next part number, hash the buffer, and hand it to the
    /// worker channel (spec §4.2, "Write path" steps 1-3).
    async fn emit_part(&mut self, buf: Vec<u8>) -> Result<(), TransferError> {
        self.part_number += 1;
        let (content_md5, content_sha256, etag) = hash_part(&buf, &mut self.md5_of_parts);
        self.parts_meta.push(CompletedPart {
            part_number: self.part_number,
            e_tag: etag.clone(),
        });

        let part = Part {
            part_number: self.part_number,
            buf,
            content_md5,
            content_sha256,
            etag,
        };
        self.work_tx
            .send(part)
            .await
            .map_err(|_| TransferError::State("upload workers have already exited"))?;

        if self.part_number % GROWTH_CHECK_INTERVAL == 0
            && self.part_number < MAX_PART_COUNT
            && should_grow_part_size(self.bytes_written, self.part_number, self.part_size)
        {
            self.part_size = (self.part_size * 2).min(MAX_PART_SIZE);
            self.pool.resize(self.part_size).await;
        }

        Ok(())
    }

    /// POST the multipart-complete body, verify the compound ETag, and
    /// (if enabled) verify the whole-object MD5 sidecar (spec §4.2,
    /// "Completion").
    async fn complete(&mut self) -> Result<(), TransferError> {
        let body = CompleteMultipartUpload {
            parts: std::mem::take(&mut self.parts_meta),
        }
        .to_xml()
        .map_err(|e| TransferError::precondition(format!("failed to serialize multipart-complete body: {e}")))?
        .into_bytes();
        let sha256 = hex::encode(Sha256::digest(&body));

        let mut url = self.url.as_ref().clone();
        url.query_pairs_mut().append_pair("uploadId", self.upload_id.as_str());

        let client = &self.client;
        let keys = &self.keys;
        let region = &self.region;
        let body_ref = &body;
        let sha256_ref = &sha256;

        let result: CompleteMultipartUploadResult =
            retry("complete-multipart-upload", self.n_try, |_attempt| {
                complete_attempt(client, keys, region, &url, body_ref, sha256_ref)
            })
            .await?;

        let remote_etag = strip_etag_quotes(&result.e_tag);
        let remote_prefix = remote_etag.split('-').next().unwrap_or(remote_etag);
        let calculated = hex::encode(std::mem::replace(&mut self.md5_of_parts, Md5::new()).finalize());

        if remote_prefix != calculated {
            return Err(TransferError::integrity(
                "complete-multipart-upload",
                format!(
                    "MD5 hash of part hashes comparison failed. hash from multipart complete header: {remote_etag}. calculated multipart hash: {calculated}."
                ),
            ));
        }

        if self.md5_check {
            if let Some(sidecar_url) = self.sidecar_url.clone() {
                let whole_md5 = hex::encode(
                    self.whole_md5
                        .take()
                        .expect("md5_check implies a whole-object hasher")
                        .finalize(),
                );
                put_md5_sidecar(client, keys, region, &sidecar_url, self.n_try, &whole_md5).await?;
            }
        }

        Ok(())
    }

    /// Best-effort abort: `DELETE <url>?uploadId=...`, logging but never
    /// re-raising failures (spec §4.2, "Abort").
    async fn abort(&mut self) {
        let mut url = self.url.as_ref().clone();
        url.query_pairs_mut().append_pair("uploadId", self.upload_id.as_str());

        let mut headers = reqwest::header::HeaderMap::new();
        if let Err(err) = signer::sign(
            &self.keys,
            &self.region,
            &Method::DELETE,
            &url,
            &mut headers,
            signer::empty_payload_hash(),
        ) {
            tracing::warn!(%err, "failed to sign abort-multipart-upload request");
            return;
        }

        match send_with_header_timeout("abort-multipart-upload", self.client.delete(url).headers(headers)).await {
            Ok(resp) if resp.status().as_u16() == 204 => {}
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "abort-multipart-upload returned unexpected status")
            }
            Err(err) => tracing::warn!(%err, "abort-multipart-upload request failed"),
        }
    }

    fn peek_latch(&self) -> Option<TransferError> {
        self.latch
            .lock()
            .expect("latch mutex poisoned")
            .clone()
            .map(LatchedError::into_error)
    }
}

async fn complete_attempt(
    client: &reqwest::Client,
    keys: &Keys,
    region: &str,
    url: &Url,
    body: &[u8],
    sha256: &str,
) -> Result<CompleteMultipartUploadResult, TransferError> {
    let mut headers = reqwest::header::HeaderMap::new();
    signer::sign(keys, region, &Method::POST, url, &mut headers, sha256)?;

    let resp = send_with_header_timeout(
        "complete-multipart-upload",
        client.post(url.clone()).headers(headers).body(body.to_vec()),
    )
    .await?;

    let status = resp.status();
    let bytes = resp.bytes().await.unwrap_or_default();
    if status.as_u16() != 200 {
        return Err(status_error("complete-multipart-upload", status.as_u16(), &bytes));
    }

    quick_xml::de::from_reader(bytes.as_ref())
        .map_err(|e| TransferError::precondition(format!("invalid multipart-complete response: {e}")))
}

async fn put_md5_sidecar(
    client: &reqwest::Client,
    keys: &Keys,
    region: &str,
    sidecar_url: &Url,
    n_try: u32,
    whole_md5: &str,
) -> Result<(), TransferError> {
    let sha256 = hex::encode(Sha256::digest(whole_md5.as_bytes()));
    retry("put-md5-sidecar", n_try, |_attempt| {
        put_md5_attempt(client, keys, region, sidecar_url, whole_md5, &sha256)
    })
    .await
}

async fn put_md5_attempt(
    client: &reqwest::Client,
    keys: &Keys,
    region: &str,
    sidecar_url: &Url,
    whole_md5: &str,
    sha256: &str,
) -> Result<(), TransferError> {
    let mut headers = reqwest::header::HeaderMap::new();
    signer::sign(keys, region, &Method::PUT, sidecar_url, &mut headers, sha256)?;

    let resp = send_with_header_timeout(
        "put-md5-sidecar",
        client.put(sidecar_url.clone()).headers(headers).body(whole_md5.as_bytes().to_vec()),
    )
    .await?;

    let status = resp.status();
    if status.as_u16() != 200 {
        let body = resp.bytes().await.unwrap_or_default();
        return Err(status_error("put-md5-sidecar", status.as_u16(), &body));
    }
    Ok(())
}

/// `(maxObjSize - bytesSoFar) / (maxParts - partIndex) > partSize` (spec
/// §4.2, "Part sizing"): grow when the remaining object budget per
/// remaining part would otherwise exceed the current part size.
fn should_grow_part_size(bytes_so_far: u64, part_index: u64, part_size: u64) -> bool {
    let remaining_parts = MAX_PART_COUNT - part_index;
    (MAX_OBJECT_SIZE - bytes_so_far) / remaining_parts > part_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_when_remaining_budget_exceeds_part_size() {
        assert!(should_grow_part_size(0, 2000, MIN_PART_SIZE));
    }

    #[test]
    fn does_not_grow_for_small_objects() {
        assert!(!should_grow_part_size(2000 * MIN_PART_SIZE, 2000, MIN_PART_SIZE));
    }

    #[test]
    fn growth_check_interval_matches_spec() {
        assert_eq!(GROWTH_CHECK_INTERVAL, 2000);
    }
}
