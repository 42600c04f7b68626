/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Per-bucket/per-operation configuration (spec §3, "Configuration").

use std::time::Duration;

use crate::error::TransferError;
use crate::MEBI_BYTE;

/// HTTP scheme to address the endpoint with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Scheme::Https
    }
}

/// Connection-level timeout (dial), also reused as the keepalive period and
/// as the response-header timeout applied around each request's `send()` in
/// [`send_with_header_timeout`], per spec §5.
pub(crate) const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a single Getter/Putter operation, per spec §3.
#[derive(Debug, Clone)]
pub struct Config {
    /// Simultaneous in-flight parts/chunks. Minimum 1.
    pub concurrency: usize,
    /// Initial part/chunk size in bytes.
    pub part_size: u64,
    /// Per-part/chunk attempt count. Minimum 1.
    pub n_try: u32,
    /// Whether to verify whole-object integrity via the `.md5` sidecar.
    pub md5_check: bool,
    /// `http` or `https`.
    pub scheme: Scheme,
    /// Force path-style addressing even for bucket names without a dot.
    pub path_style: bool,
    /// HTTP transport. Built with [`default_client`] unless overridden.
    pub client: reqwest::Client,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 10,
            part_size: 20 * MEBI_BYTE,
            n_try: 10,
            md5_check: true,
            scheme: Scheme::Https,
            path_style: false,
            client: default_client(),
        }
    }
}

impl Config {
    /// Builder-style constructor starting from defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub(crate) fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub(crate) fn effective_n_try(&self) -> u32 {
        self.n_try.max(1)
    }
}

/// Builder-style constructor for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    concurrency: Option<usize>,
    part_size: Option<u64>,
    n_try: Option<u32>,
    md5_check: Option<bool>,
    scheme: Option<Scheme>,
    path_style: Option<bool>,
    client: Option<reqwest::Client>,
}

impl ConfigBuilder {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = Some(part_size);
        self
    }

    pub fn n_try(mut self, n_try: u32) -> Self {
        self.n_try = Some(n_try);
        self
    }

    pub fn md5_check(mut self, enabled: bool) -> Self {
        self.md5_check = Some(enabled);
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn path_style(mut self, path_style: bool) -> Self {
        self.path_style = Some(path_style);
        self
    }

    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency).max(1),
            part_size: self.part_size.unwrap_or(defaults.part_size),
            n_try: self.n_try.unwrap_or(defaults.n_try).max(1),
            md5_check: self.md5_check.unwrap_or(defaults.md5_check),
            scheme: self.scheme.unwrap_or(defaults.scheme),
            path_style: self.path_style.unwrap_or(defaults.path_style),
            client: self.client.unwrap_or(defaults.client),
        }
    }
}

/// Build the default HTTP client: 5s connect timeout and a keepalive period
/// equal to the connect timeout (spec §5). The response-header timeout is
/// applied per request by [`send_with_header_timeout`], not here — `reqwest`
/// has no separate header-arrival timeout, and its `.timeout()` covers the
/// whole request including body transfer, which would spuriously fail any
/// chunk/part whose transfer simply takes longer than the header budget.
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(DEFAULT_TRANSPORT_TIMEOUT)
        .tcp_keepalive(DEFAULT_TRANSPORT_TIMEOUT)
        .build()
        .expect("default client configuration is valid")
}

/// Send `request`, bounding only the wait for response headers to arrive
/// (spec §5, "response-header timeout"). `reqwest::RequestBuilder::send`
/// resolves as soon as headers are in hand, before the body is read, so
/// wrapping it in a timeout here never caps body-transfer duration the way
/// `reqwest`'s own `.timeout()` would.
pub(crate) async fn send_with_header_timeout(
    op: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, TransferError> {
    match tokio::time::timeout(DEFAULT_TRANSPORT_TIMEOUT, request.send()).await {
        Ok(result) => result.map_err(|e| TransferError::transport(op, e)),
        Err(_) => Err(TransferError::integrity(
            op,
            format!("timed out waiting for response headers after {DEFAULT_TRANSPORT_TIMEOUT:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = Config::default();
        assert_eq!(c.concurrency, 10);
        assert_eq!(c.part_size, 20 * MEBI_BYTE);
        assert_eq!(c.n_try, 10);
        assert!(c.md5_check);
        assert_eq!(c.scheme, Scheme::Https);
        assert!(!c.path_style);
    }

    #[test]
    fn builder_clamps_minimums() {
        let c = Config::builder().concurrency(0).n_try(0).build();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.n_try, 1);
    }
}
