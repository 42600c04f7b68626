/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::xml_body::ErrorBody;

/// Failed transfer result.
///
/// Every variant carries enough context to answer "what operation, what
/// status, what did the server say" per the error-handling design: operation,
/// status code (if any), server-side code/message, and request id when known.
#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    /// Underlying connection/IO failure talking to the transport. Retriable.
    #[error("transport error during {op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status and (when parseable) an
    /// XML error body. Retriable for 5xx/408/429, fatal otherwise.
    #[error("{op} failed: {status}{}", body.as_ref().map(|b| format!(" ({b})")).unwrap_or_default())]
    Status {
        op: &'static str,
        status: u16,
        body: Option<ErrorBody>,
    },

    /// A data-integrity check failed: short read, MD5 mismatch, or ETag
    /// mismatch. Retriable on a per-part/per-chunk basis; fatal if it
    /// persists through the configured number of attempts.
    #[error("integrity error during {op}: {message}")]
    Integrity { op: &'static str, message: String },

    /// A precondition the protocol requires was not met (missing
    /// content-length, chunked-transfer response, empty path, ...). Fatal,
    /// never retried.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The reader/writer was used after being closed, or read before any
    /// data was available. Fatal and permanent.
    #[error("invalid state: {0}")]
    State(&'static str),
}

impl TransferError {
    pub(crate) fn transport(op: &'static str, source: reqwest::Error) -> Self {
        TransferError::Transport { op, source }
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        TransferError::Precondition(message.into())
    }

    pub(crate) fn integrity(op: &'static str, message: impl Into<String>) -> Self {
        TransferError::Integrity {
            op,
            message: message.into(),
        }
    }

    /// Whether a worker should retry this error, per the retry policy in §9:
    /// transport errors and 5xx/408/429 are retriable, everything else is
    /// fatal.
    pub(crate) fn is_retriable(&self) -> bool {
        match self {
            TransferError::Transport { .. } => true,
            TransferError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransferError::Integrity { .. } => true,
            TransferError::Precondition(_) | TransferError::State(_) => false,
        }
    }

    /// Summarize this error for the cross-task latch (spec §5, "shared
    /// mutable error state"). `TransferError` itself is not `Clone` (it
    /// wraps a `reqwest::Error`), so workers latch a lightweight summary
    /// instead of the original value.
    pub(crate) fn latch(&self) -> LatchedError {
        match self {
            TransferError::Transport { op, source } => LatchedError::Transport {
                op,
                message: source.to_string(),
            },
            TransferError::Status { op, status, body } => LatchedError::Status {
                op,
                status: *status,
                body: body.clone(),
            },
            TransferError::Integrity { op, message } => LatchedError::Integrity {
                op,
                message: message.clone(),
            },
            TransferError::Precondition(message) => LatchedError::Precondition(message.clone()),
            TransferError::State(message) => LatchedError::State(message),
        }
    }
}

/// A `Clone`-able summary of a [`TransferError`], latched once into shared
/// state by whichever worker first hits a fatal failure (spec §5).
#[derive(Debug, Clone)]
pub(crate) enum LatchedError {
    Transport { op: &'static str, message: String },
    Status {
        op: &'static str,
        status: u16,
        body: Option<ErrorBody>,
    },
    Integrity { op: &'static str, message: String },
    Precondition(String),
    State(&'static str),
}

impl LatchedError {
    pub(crate) fn into_error(self) -> TransferError {
        match self {
            LatchedError::Transport { op, message } => {
                TransferError::Integrity { op, message: format!("transport error: {message}") }
            }
            LatchedError::Status { op, status, body } => TransferError::Status { op, status, body },
            LatchedError::Integrity { op, message } => TransferError::Integrity { op, message },
            LatchedError::Precondition(message) => TransferError::Precondition(message),
            LatchedError::State(message) => TransferError::State(message),
        }
    }
}
