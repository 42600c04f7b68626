/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A single multipart-upload part (spec §3, "Part").
//!
//! Grounded on `original_source/putter.go`'s `part` struct and
//! `hashContent`: content-MD5, content-SHA256, and the per-part ETag are all
//! computed from the buffer in one pass, before the part is handed to a
//! worker.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use sha2::Sha256;

/// A filled buffer ready to be PUT as one part of a multipart upload.
pub(super) struct Part {
    pub(super) part_number: u64,
    pub(super) buf: Vec<u8>,
    pub(super) content_md5: String,
    pub(super) content_sha256: String,
    pub(super) etag: String,
}

/// Hash `buf` once, producing the headers and pre-computed ETag `putPart`
/// will need, and folding the part's MD5 into `md5_of_parts` for the final
/// compound-ETag check (spec §4.2, "Write path").
pub(super) fn hash_part(buf: &[u8], md5_of_parts: &mut Md5) -> (String, String, String) {
    let md5_digest = Md5::digest(buf);
    let sha256_digest = Sha256::digest(buf);

    md5_of_parts.update(md5_digest);

    let content_md5 = BASE64.encode(md5_digest);
    let content_sha256 = hex::encode(sha256_digest);
    let etag = hex::encode(md5_digest);
    (content_md5, content_sha256, etag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_part_produces_consistent_etag() {
        let mut md5_of_parts = Md5::new();
        let (content_md5, content_sha256, etag) = hash_part(b"hello world", &mut md5_of_parts);
        assert_eq!(etag, hex::encode(Md5::digest(b"hello world")));
        assert_eq!(content_sha256, hex::encode(Sha256::digest(b"hello world")));
        assert_eq!(
            content_md5,
            BASE64.encode(Md5::digest(b"hello world"))
        );
    }
}
