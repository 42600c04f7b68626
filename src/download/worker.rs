/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Chunk enumerator and GET workers (spec §4.1 "Enumeration"/"Workers").
//!
//! Grounded on `aws-s3-transfer-manager`'s `download::worker` module:
//! `distribute_work` enumerates ranges in order onto a channel, and
//! `download_chunks` is a worker loop pulling requests and sending results
//! back over an mpsc channel. Adapted to issue signed `reqwest` GETs instead
//! of `aws_sdk_s3` operations, and to gate enumeration on a semaphore
//! bounding `concurrency + qWaitMax` outstanding chunks (spec §5's
//! mutex+condvar "qWaitLen" counter, realized as a `tokio::sync::Semaphore`).

use std::sync::Arc;

use reqwest::Method;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::Instrument;

use super::context::DownloadContext;
use super::header::Range;
use crate::config::send_with_header_timeout;
use crate::error::TransferError;
use crate::retry::{retry, status_error};
use crate::signer;

#[derive(Debug, Clone)]
pub(super) struct ChunkRequest {
    pub(super) seq: u64,
    pub(super) start: u64,
    pub(super) end_inclusive: u64,
}

impl ChunkRequest {
    pub(super) fn size(&self) -> u64 {
        self.end_inclusive - self.start + 1
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ChunkResponse {
    pub(crate) seq: u64,
    pub(crate) data: Option<Vec<u8>>,
}

/// Worker loop: pull requests, GET the range with retries, forward the
/// result. Exits when the request channel closes or quit is broadcast.
pub(super) async fn download_chunks(
    ctx: DownloadContext,
    requests: async_channel::Receiver<ChunkRequest>,
    completed: mpsc::Sender<Result<ChunkResponse, TransferError>>,
) {
    let mut quit_rx = ctx.quit_rx();
    loop {
        let request = tokio::select! {
            biased;
            _ = quit_rx.changed() => break,
            req = requests.recv() => match req {
                Ok(req) => req,
                Err(_) => break,
            },
        };

        let seq = request.seq;
        tracing::trace!(seq, "worker recv'd chunk request");

        let result = download_chunk(&ctx, request)
            .instrument(tracing::debug_span!("download-chunk", seq))
            .await;

        if let Err(err) = &result {
            ctx.latch_error(err);
        }

        if completed.send(result).await.is_err() {
            tracing::debug!("chunk worker send failed, reader gone");
            return;
        }
    }
    tracing::trace!("chunk worker finished");
}

async fn download_chunk(
    ctx: &DownloadContext,
    request: ChunkRequest,
) -> Result<ChunkResponse, TransferError> {
    let size = request.size();
    let result = retry("get-chunk", ctx.n_try, |_attempt| {
        get_range(ctx, request.start, request.end_inclusive, size)
    })
    .await?;
    Ok(ChunkResponse {
        seq: request.seq,
        data: Some(result),
    })
}

/// GET one ranged chunk into a buffer borrowed from the pool (spec §4.1,
/// "Workers": "acquires a buffer from the pool").
async fn get_range(
    ctx: &DownloadContext,
    start: u64,
    end_inclusive: u64,
    expected_size: u64,
) -> Result<Vec<u8>, TransferError> {
    let mut headers = reqwest::header::HeaderMap::new();
    let range_header = Range::bytes_inclusive(start, end_inclusive).to_string();
    headers.insert(
        reqwest::header::RANGE,
        reqwest::header::HeaderValue::from_str(&range_header)
            .map_err(|e| TransferError::precondition(format!("invalid range header: {e}")))?,
    );

    signer::sign(
        &ctx.keys,
        &ctx.region,
        &Method::GET,
        &ctx.url,
        &mut headers,
        signer::empty_payload_hash(),
    )?;

    let resp = send_with_header_timeout("get-chunk", ctx.client.get(ctx.url.as_ref().clone()).headers(headers)).await?;

    let status = resp.status();
    if status.as_u16() != 200 && status.as_u16() != 206 {
        let body = resp.bytes().await.unwrap_or_default();
        return Err(status_error("get-chunk", status.as_u16(), &body));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| TransferError::transport("get-chunk", e))?;

    if bytes.len() as u64 != expected_size {
        return Err(TransferError::integrity(
            "get-chunk",
            format!(
                "short read: {} bytes read, expected {}",
                bytes.len(),
                expected_size
            ),
        ));
    }

    let mut buf = ctx.pool.get().await;
    if (buf.len() as u64) < expected_size {
        buf.resize(expected_size as usize, 0);
    } else {
        buf.truncate(expected_size as usize);
    }
    buf.copy_from_slice(&bytes);
    Ok(buf)
}

/// Enumerate chunks `[remaining.0, remaining.1]` in `part_size` increments,
/// acquiring one semaphore permit per chunk before dispatching it. The
/// reader releases a permit once it has fully consumed a chunk, bounding
/// outstanding chunks to `concurrency + qWaitMax` (spec §8, "Concurrency
/// bound").
pub(super) async fn distribute_work(
    start: u64,
    end_inclusive: u64,
    part_size: u64,
    slots: Arc<Semaphore>,
    tx: async_channel::Sender<ChunkRequest>,
    mut quit_rx: watch::Receiver<bool>,
) {
    let mut pos = start;
    let mut seq = 0u64;

    while pos <= end_inclusive {
        let permit = tokio::select! {
            biased;
            _ = quit_rx.changed() => break,
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        permit.forget();

        let chunk_end = std::cmp::min(pos + part_size - 1, end_inclusive);
        let request = ChunkRequest {
            seq,
            start: pos,
            end_inclusive: chunk_end,
        };
        tracing::trace!(seq, size = request.size(), "distributing chunk");

        if tx.send(request).await.is_err() {
            break;
        }

        seq += 1;
        pos = chunk_end + 1;
    }

    tracing::trace!("work fully distributed");
    tx.close();
}
