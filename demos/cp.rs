/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */
use std::error::Error;
use std::path::PathBuf;
use std::str::FromStr;
use std::time;

use clap::{CommandFactory, Parser};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use s3_transfer_engine::config::Config;
use s3_transfer_engine::credentials::Keys;
use s3_transfer_engine::endpoint::Endpoint;
use s3_transfer_engine::Bucket;

type BoxError = Box<dyn Error + Send + Sync>;

const ONE_MEBIBYTE: u64 = 1024 * 1024;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "cp")]
#[command(about = "Copies a local file or S3 object to another location locally or in S3.")]
pub struct Args {
    /// Source to copy from <S3Uri | Local>
    #[arg(required = true)]
    source: TransferUri,

    /// Destination to copy to <S3Uri | Local>
    #[arg(required = true)]
    dest: TransferUri,

    /// Number of concurrent uploads/downloads to perform.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Part size to use, in bytes.
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    part_size: u64,

    /// S3-compatible endpoint domain.
    #[arg(long, default_value = "s3.amazonaws.com")]
    endpoint: String,

    /// Verify object integrity via the `.md5` sidecar.
    #[arg(long, default_value_t = true)]
    md5_check: bool,
}

#[derive(Clone, Debug)]
enum TransferUri {
    /// Local filesystem source/destination
    Local(PathBuf),

    /// S3 source/destination
    S3(S3Uri),
}

impl TransferUri {
    fn expect_s3(&self) -> &S3Uri {
        match self {
            TransferUri::S3(s3_uri) => s3_uri,
            _ => panic!("expected S3Uri"),
        }
    }

    fn expect_local(&self) -> &PathBuf {
        match self {
            TransferUri::Local(path) => path,
            _ => panic!("expected Local"),
        }
    }
}

impl FromStr for TransferUri {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri = if s.starts_with("s3://") {
            TransferUri::S3(S3Uri(s.to_owned()))
        } else {
            TransferUri::Local(PathBuf::from_str(s)?)
        };
        Ok(uri)
    }
}

#[derive(Clone, Debug)]
struct S3Uri(String);

impl S3Uri {
    /// Split the URI into its component parts `(bucket, key)`.
    fn parts(&self) -> (&str, &str) {
        self.0
            .strip_prefix("s3://")
            .expect("valid s3 uri prefix")
            .split_once('/')
            .expect("invalid s3 uri, missing '/' between bucket and key")
    }
}

fn invalid_arg(message: &str) -> ! {
    Args::command()
        .error(clap::error::ErrorKind::InvalidValue, message)
        .exit()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    use TransferUri::*;
    let bucket_for = |uri: &S3Uri| -> Result<Bucket, BoxError> {
        let (bucket_name, _) = uri.parts();
        let keys = Keys::from_env()?;
        let config = Config::builder()
            .concurrency(args.concurrency)
            .part_size(args.part_size)
            .md5_check(args.md5_check)
            .build();
        Ok(Bucket::new(Endpoint::new(args.endpoint.clone()), bucket_name, keys, config)?)
    };

    let start = time::Instant::now();
    let obj_size = match (&args.source, &args.dest) {
        (S3(uri), Local(path)) => download(&bucket_for(uri)?, uri, path).await?,
        (Local(path), S3(uri)) => upload(&bucket_for(uri)?, path, uri).await?,
        (Local(_), Local(_)) => invalid_arg("local to local transfer not supported"),
        (S3(_), S3(_)) => invalid_arg("s3 to s3 transfer not supported"),
    };

    let elapsed = start.elapsed();
    let obj_size_mebibytes = obj_size as f64 / ONE_MEBIBYTE as f64;
    println!(
        "transferred {obj_size} bytes ({obj_size_mebibytes:.2} MiB) in {elapsed:?}; MiB/s: {:.2}",
        obj_size_mebibytes / elapsed.as_secs_f64(),
    );

    Ok(())
}

async fn download(bucket: &Bucket, uri: &S3Uri, dest: &PathBuf) -> Result<u64, BoxError> {
    let (_, key) = uri.parts();
    let (mut getter, _headers) = bucket.get(key).await?;
    let total = getter.content_length();

    let mut dest = fs::File::create(dest).await?;
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = getter.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n]).await?;
    }
    getter.close().await?;
    Ok(total)
}

async fn upload(bucket: &Bucket, src: &PathBuf, uri: &S3Uri) -> Result<u64, BoxError> {
    let (_, key) = uri.parts();
    let mut putter = bucket.put(key, reqwest::header::HeaderMap::new()).await?;

    let mut src = fs::File::open(src).await?;
    let mut buf = vec![0u8; 256 * 1024];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        putter.write(&buf[..n]).await?;
        total += n as u64;
    }
    putter.close().await?;
    Ok(total)
}
