/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! End-to-end Getter/Putter round trips against a mocked S3 endpoint,
//! covering the literal scenarios and boundary behaviors called out in the
//! design notes.

use std::sync::Mutex;

use md5::{Digest, Md5};
use mockito::Matcher;

use s3_transfer_engine::config::Config;
use s3_transfer_engine::credentials::Keys;
use s3_transfer_engine::endpoint::Endpoint;
use s3_transfer_engine::Bucket;

/// `Endpoint::region()` falls back to `AWS_REGION` for domains it doesn't
/// recognize (mock server addresses are `host:port`, not an S3 domain).
/// Serializes tests that touch the process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn test_bucket(domain: String, name: &str, config: Config) -> Bucket {
    std::env::set_var("AWS_REGION", "us-east-1");
    Bucket::new(Endpoint::new(domain), name, Keys::new("ak", "sk"), config).unwrap()
}

fn path_style_config(client: reqwest::Client) -> Config {
    Config::builder().path_style(true).client(client).build()
}

#[tokio::test]
async fn small_put_then_get_round_trips() {
    let _guard = ENV_LOCK.lock().unwrap();
    let mut server = mockito::Server::new_async().await;
    let body: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();

    let md5_digest = Md5::digest(&body);
    let etag = hex::encode(md5_digest);
    let compound = hex::encode(Md5::digest(md5_digest));

    let _init = server
        .mock("POST", "/testbucket/t1.test")
        .match_query(Matcher::UrlEncoded("uploads".into(), "".into()))
        .with_status(200)
        .with_body("<InitiateMultipartUploadResult><UploadId>abc123</UploadId></InitiateMultipartUploadResult>")
        .create_async()
        .await;

    let _put_part = server
        .mock("PUT", "/testbucket/t1.test")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("partNumber".into(), "1".into()),
            Matcher::UrlEncoded("uploadId".into(), "abc123".into()),
        ]))
        .with_status(200)
        .with_header("etag", &format!("\"{etag}\""))
        .create_async()
        .await;

    let _complete = server
        .mock("POST", "/testbucket/t1.test")
        .match_query(Matcher::UrlEncoded("uploadId".into(), "abc123".into()))
        .with_status(200)
        .with_body(format!(
            "<CompleteMultipartUploadResult><ETag>\"{compound}-1\"</ETag></CompleteMultipartUploadResult>"
        ))
        .create_async()
        .await;

    let _put_sidecar = server
        .mock("PUT", "/.md5/t1.test.md5")
        .with_status(200)
        .create_async()
        .await;

    let bucket = test_bucket(server.host_with_port(), "testbucket", path_style_config(reqwest::Client::new()));

    let mut putter = bucket.put("t1.test", reqwest::header::HeaderMap::new()).await.unwrap();
    putter.write(&body).await.unwrap();
    putter.close().await.unwrap();

    let _init_get = server
        .mock("GET", "/testbucket/t1.test")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_header("content-length", "1024")
        .create_async()
        .await;

    let _ranged_get = server
        .mock("GET", "/testbucket/t1.test")
        .match_header("range", Matcher::Regex("bytes=.*".into()))
        .with_status(206)
        .with_header("content-length", "1024")
        .with_body(body.clone())
        .create_async()
        .await;

    let _get_sidecar = server
        .mock("GET", "/.md5/t1.test.md5")
        .with_status(200)
        .with_body(compound.clone())
        .create_async()
        .await;

    let (mut getter, _headers) = bucket.get("t1.test").await.unwrap();
    assert_eq!(getter.content_length(), 1024);

    let mut received = Vec::new();
    let mut buf = vec![0u8; 256];
    loop {
        let n = getter.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    getter.close().await.unwrap();

    assert_eq!(received, body);
}

#[tokio::test]
async fn multipart_put_produces_five_parts() {
    let _guard = ENV_LOCK.lock().unwrap();
    let mut server = mockito::Server::new_async().await;

    const MIB: usize = 1024 * 1024;
    let body: Vec<u8> = (0..21 * MIB).map(|i| (i % 251) as u8).collect();

    let mut md5_of_parts = Md5::new();
    for chunk in body.chunks(5 * MIB) {
        md5_of_parts.update(Md5::digest(chunk));
    }
    let compound = hex::encode(md5_of_parts.finalize());

    let _init = server
        .mock("POST", "/21mb-bucket/21mb_test.test")
        .match_query(Matcher::UrlEncoded("uploads".into(), "".into()))
        .with_status(200)
        .with_body("<InitiateMultipartUploadResult><UploadId>mp-1</UploadId></InitiateMultipartUploadResult>")
        .create_async()
        .await;

    for part_number in 1..=5u32 {
        let start = (part_number as usize - 1) * 5 * MIB;
        let end = (start + 5 * MIB).min(body.len());
        let etag = hex::encode(Md5::digest(&body[start..end]));
        server
            .mock("PUT", "/21mb-bucket/21mb_test.test")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("partNumber".into(), part_number.to_string()),
                Matcher::UrlEncoded("uploadId".into(), "mp-1".into()),
            ]))
            .with_status(200)
            .with_header("etag", &format!("\"{etag}\""))
            .create_async()
            .await;
    }

    let _complete = server
        .mock("POST", "/21mb-bucket/21mb_test.test")
        .match_query(Matcher::UrlEncoded("uploadId".into(), "mp-1".into()))
        .with_status(200)
        .with_body(format!(
            "<CompleteMultipartUploadResult><ETag>\"{compound}-5\"</ETag></CompleteMultipartUploadResult>"
        ))
        .create_async()
        .await;

    let _put_sidecar = server
        .mock("PUT", "/.md5/21mb_test.test.md5")
        .with_status(200)
        .create_async()
        .await;

    let config = Config::builder()
        .path_style(true)
        .concurrency(3)
        .part_size(5 * MIB as u64)
        .client(reqwest::Client::new())
        .build();
    let bucket = test_bucket(server.host_with_port(), "21mb-bucket", config);

    let mut putter = bucket.put("21mb_test.test", reqwest::header::HeaderMap::new()).await.unwrap();
    putter.write(&body).await.unwrap();
    putter.close().await.unwrap();
}

#[tokio::test]
async fn missing_key_reports_no_such_key() {
    let _guard = ENV_LOCK.lock().unwrap();
    let mut server = mockito::Server::new_async().await;

    let _not_found = server
        .mock("GET", "/testbucket/NoKey")
        .with_status(404)
        .with_body(
            "<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
        )
        .create_async()
        .await;

    let bucket = test_bucket(server.host_with_port(), "testbucket", path_style_config(reqwest::Client::new()));
    let err = bucket.get("NoKey").await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("404"));
    assert!(message.contains("NoSuchKey") || message.contains("specified key does not exist"));
}

#[tokio::test]
async fn close_before_read_reports_short_read() {
    let _guard = ENV_LOCK.lock().unwrap();
    let mut server = mockito::Server::new_async().await;

    let _init_get = server
        .mock("GET", "/testbucket/big.bin")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_header("content-length", "1048576")
        .create_async()
        .await;

    let _ranged_get = server
        .mock("GET", "/testbucket/big.bin")
        .match_header("range", Matcher::Regex("bytes=.*".into()))
        .with_status(206)
        .with_header("content-length", "1048576")
        .with_body(vec![0u8; 1024 * 1024])
        .create_async()
        .await;

    let config = Config::builder()
        .path_style(true)
        .md5_check(false)
        .client(reqwest::Client::new())
        .build();
    let bucket = test_bucket(server.host_with_port(), "testbucket", config);

    let (getter, _headers) = bucket.get("big.bin").await.unwrap();
    assert_eq!(getter.content_length(), 1024 * 1024);

    let err = getter.close().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "integrity error during get-object: read error: 0 bytes read. expected: 1048576"
    );
}

#[tokio::test]
async fn delete_of_missing_object_is_noop() {
    let _guard = ENV_LOCK.lock().unwrap();
    let mut server = mockito::Server::new_async().await;

    let _delete_object = server.mock("DELETE", "/testbucket/gone.txt").with_status(204).create_async().await;
    let _delete_sidecar = server.mock("DELETE", "/.md5/gone.txt.md5").with_status(204).create_async().await;

    let bucket = test_bucket(server.host_with_port(), "testbucket", path_style_config(reqwest::Client::new()));
    bucket.delete("gone.txt").await.unwrap();
}

#[tokio::test]
async fn worker_failure_triggers_best_effort_abort() {
    let _guard = ENV_LOCK.lock().unwrap();
    let mut server = mockito::Server::new_async().await;

    let _init = server
        .mock("POST", "/testbucket/broken.test")
        .match_query(Matcher::UrlEncoded("uploads".into(), "".into()))
        .with_status(200)
        .with_body("<InitiateMultipartUploadResult><UploadId>doomed</UploadId></InitiateMultipartUploadResult>")
        .create_async()
        .await;

    // No PUT-part mock: every attempt gets mockito's default 501 (retriable,
    // it's a 5xx), but `n_try(1)` forbids any retry so the worker latches
    // after its single attempt.
    let abort = server
        .mock("DELETE", "/testbucket/broken.test")
        .match_query(Matcher::UrlEncoded("uploadId".into(), "doomed".into()))
        .with_status(204)
        .create_async()
        .await;

    let config = Config::builder()
        .n_try(1)
        .path_style(true)
        .client(reqwest::Client::new())
        .build();
    let bucket = test_bucket(server.host_with_port(), "testbucket", config);

    let mut putter = bucket.put("broken.test", reqwest::header::HeaderMap::new()).await.unwrap();
    putter.write(&[1u8; 10]).await.ok();
    let result = putter.close().await;
    assert!(result.is_err());
    abort.assert_async().await;
}
