/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/* Automatically managed default lints */
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
/* End of automatically managed default lints */

//! Fast, parallelized, streaming access to an S3-compatible blob store.
//!
//! This crate exposes two object-level primitives:
//!
//! - [`download::Getter`]: a sequential reader for a remote object, backed by a
//!   pool of workers issuing concurrent ranged GETs and an in-order reassembly
//!   buffer.
//! - [`upload::Putter`]: a sequential writer for a new remote object, backed by
//!   a pool of workers issuing concurrent multipart-upload PUTs.
//!
//! Every request is authenticated with a hand-rolled AWS Signature Version 4
//! implementation ([`signer`]), and large buffers are recycled through a
//! time-evicting [`pool::BufferPool`] rather than allocated fresh per chunk/part.

#![warn(rustdoc::missing_crate_level_docs, rust_2018_idioms)]

pub(crate) const MEBI_BYTE: u64 = 1024 * 1024;
pub(crate) const GIBI_BYTE: u64 = MEBI_BYTE * 1024;
pub(crate) const TEBI_BYTE: u64 = GIBI_BYTE * 1024;
pub(crate) const MIN_PART_SIZE: u64 = 5 * MEBI_BYTE;
pub(crate) const MAX_PART_SIZE: u64 = 5 * GIBI_BYTE;
pub(crate) const MAX_OBJECT_SIZE: u64 = 5 * TEBI_BYTE;
pub(crate) const MAX_PART_COUNT: u64 = 10_000;

pub mod bucket;
pub mod config;
pub mod credentials;
pub mod download;
pub mod endpoint;
pub mod error;
pub mod pool;
pub(crate) mod retry;
pub(crate) mod signer;
pub mod upload;
pub(crate) mod xml_body;

pub use bucket::Bucket;
pub use config::Config;
pub use credentials::Keys;
pub use download::Getter;
pub use endpoint::Endpoint;
pub use error::TransferError;
pub use upload::Putter;
