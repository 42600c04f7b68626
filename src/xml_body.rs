/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! XML wire bodies for S3's multipart-upload and error-response protocols
//! (spec §6, "Over the wire").

use serde::{Deserialize, Serialize};
use std::fmt;

/// `<Error>` body S3 returns on non-2xx responses.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename = "Error")]
pub struct ErrorBody {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Resource", default)]
    pub resource: String,
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code={} message={:?} request_id={}",
            self.code, self.message, self.request_id
        )
    }
}

/// Parse an `<Error>` body, tolerating non-XML or empty bodies (some
/// S3-compatible servers omit one).
pub(crate) fn parse_error_body(bytes: &[u8]) -> Option<ErrorBody> {
    if bytes.is_empty() {
        return None;
    }
    quick_xml::de::from_reader(bytes).ok()
}

/// `<InitiateMultipartUploadResult>` response to the multipart-init POST.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
pub(crate) struct InitiateMultipartUploadResult {
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

/// A single `<Part>` entry in the `<CompleteMultipartUpload>` request body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u64,
    #[serde(rename = "ETag")]
    pub e_tag: String,
}

/// Request body for the multipart-complete POST.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub(crate) struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    pub parts: Vec<CompletedPart>,
}

impl CompleteMultipartUpload {
    pub(crate) fn to_xml(&self) -> Result<String, quick_xml::DeError> {
        quick_xml::se::to_string(self)
    }
}

/// `<CompleteMultipartUploadResult>` response; only the ETag is needed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
pub(crate) struct CompleteMultipartUploadResult {
    #[serde(rename = "ETag", default)]
    pub e_tag: String,
}

/// Strip surrounding quotes from an ETag header value, per spec §8
/// ("Server returns ETag with surrounding quotes: quotes stripped before
/// comparison").
pub(crate) fn strip_etag_quotes(raw: &str) -> &str {
    raw.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_body() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message>
<Resource>/mybucket/NoKey</Resource><RequestId>ABC123</RequestId></Error>"#;
        let parsed = parse_error_body(xml).unwrap();
        assert_eq!(parsed.code, "NoSuchKey");
        assert_eq!(parsed.message, "The specified key does not exist.");
        assert_eq!(parsed.request_id, "ABC123");
    }

    #[test]
    fn empty_body_parses_to_none() {
        assert!(parse_error_body(b"").is_none());
    }

    #[test]
    fn complete_mpu_serializes_parts_in_order() {
        let body = CompleteMultipartUpload {
            parts: vec![
                CompletedPart {
                    part_number: 1,
                    e_tag: "aaa".into(),
                },
                CompletedPart {
                    part_number: 2,
                    e_tag: "bbb".into(),
                },
            ],
        };
        let xml = body.to_xml().unwrap();
        assert!(xml.find("aaa").unwrap() < xml.find("bbb").unwrap());
    }

    #[test]
    fn etag_quote_stripping() {
        assert_eq!(strip_etag_quotes("\"abc123\""), "abc123");
        assert_eq!(strip_etag_quotes("abc123"), "abc123");
    }
}
