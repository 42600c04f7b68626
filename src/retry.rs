/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Shared retry/backoff policy (spec §4.1/§4.2, "retry with exponential
//! backoff") and status-to-error classification.
//!
//! Grounded on `original_source/getter.go`'s `retryGetChunk` and
//! `putter.go`'s `retryPutPart`: both retry up to `NTry` attempts, sleeping
//! `2^i * 100ms` between attempts, and give up immediately on a fatal error.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::TransferError;
use crate::xml_body::parse_error_body;

/// `2^attempt * 100ms`, matching the Go implementation's backoff curve.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let millis = 100u64.saturating_mul(1u64 << attempt.min(20));
    Duration::from_millis(millis)
}

/// Turn a non-2xx HTTP status plus response body into a [`TransferError`],
/// parsing the S3 `<Error>` XML body when present.
pub(crate) fn status_error(op: &'static str, status: u16, body: &[u8]) -> TransferError {
    TransferError::Status {
        op,
        status,
        body: parse_error_body(body),
    }
}

/// Run `attempt` up to `n_try` times, sleeping `2^i * 100ms` between
/// retriable failures and returning the last error once attempts or
/// retriability are exhausted.
pub(crate) async fn retry<T, F, Fut>(op: &'static str, n_try: u32, mut attempt: F) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let n_try = n_try.max(1);
    let mut last_err = None;
    for i in 0..n_try {
        match attempt(i).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() {
                    return Err(err);
                }
                if i + 1 < n_try {
                    let delay = backoff_delay(i);
                    warn!(op, attempt = i, ?delay, %err, "retrying after error");
                    tokio::time::sleep(delay).await;
                } else {
                    debug!(op, attempts = n_try, %err, "retry attempts exhausted");
                }
                last_err = Some(err);
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry("test", 5, |i| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if i < 2 {
                    Err(TransferError::integrity("test", "short read"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry("test", 5, |_| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransferError::precondition("bad request"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_n_try_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry("test", 3, |_| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransferError::integrity("test", "checksum mismatch"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
