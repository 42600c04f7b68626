/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Part-upload workers (spec §4.2, "Workers").
//!
//! Grounded on `original_source/putter.go`'s `worker`/`retryPutPart`/
//! `putPart`: a fixed pool of workers loops over a part channel until it
//! closes, retrying each part with exponential backoff and verifying the
//! returned ETag before returning its buffer to the pool.

use reqwest::Method;

use super::context::UploadContext;
use super::part::Part;
use crate::config::send_with_header_timeout;
use crate::retry::{retry, status_error};
use crate::signer;
use crate::xml_body::strip_etag_quotes;

/// Worker loop: pull parts, PUT with retries, recycle the buffer on
/// success. Exits when the part channel closes.
pub(super) async fn upload_parts(ctx: UploadContext, parts: async_channel::Receiver<Part>) {
    while let Ok(part) = parts.recv().await {
        let part_number = part.part_number;
        let buf = part.buf.clone();
        let result = retry("put-part", ctx.n_try, |_attempt| {
            put_part(&ctx, part_number, &buf, &part.content_md5, &part.content_sha256, &part.etag)
        })
        .await;

        match result {
            Ok(()) => ctx.pool.give(part.buf).await,
            Err(err) => {
                ctx.latch_error(&err);
                return;
            }
        }
    }
    tracing::trace!("upload worker finished");
}

async fn put_part(
    ctx: &UploadContext,
    part_number: u64,
    buf: &[u8],
    content_md5: &str,
    content_sha256: &str,
    expected_etag: &str,
) -> Result<(), crate::error::TransferError> {
    use crate::error::TransferError;

    let mut url = ctx.url.as_ref().clone();
    url.query_pairs_mut()
        .append_pair("partNumber", &part_number.to_string())
        .append_pair("uploadId", &ctx.upload_id);

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::CONTENT_LENGTH,
        reqwest::header::HeaderValue::from_str(&buf.len().to_string()).expect("valid length"),
    );
    headers.insert(
        reqwest::header::HeaderName::from_static("content-md5"),
        reqwest::header::HeaderValue::from_str(content_md5)
            .map_err(|e| TransferError::precondition(format!("invalid content-md5: {e}")))?,
    );
    headers.insert(
        reqwest::header::HeaderName::from_static("x-amz-content-sha256"),
        reqwest::header::HeaderValue::from_str(content_sha256)
            .map_err(|e| TransferError::precondition(format!("invalid content-sha256: {e}")))?,
    );

    signer::sign(&ctx.keys, &ctx.region, &Method::PUT, &url, &mut headers, content_sha256)?;

    let resp = send_with_header_timeout("put-part", ctx.client.put(url).headers(headers).body(buf.to_vec())).await?;

    let status = resp.status();
    if status.as_u16() != 200 {
        let body = resp.bytes().await.unwrap_or_default();
        return Err(status_error("put-part", status.as_u16(), &body));
    }

    let etag = resp
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(strip_etag_quotes)
        .ok_or_else(|| TransferError::integrity("put-part", "response missing ETag header"))?;

    if etag != expected_etag {
        return Err(TransferError::integrity(
            "put-part",
            format!("response etag does not match. remote:{etag} calculated:{expected_etag}"),
        ));
    }

    Ok(())
}
