/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! S3-compatible service endpoint: domain, scheme, and inferred region.

use std::env;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::TransferError;

/// The default S3 endpoint domain.
pub const DEFAULT_DOMAIN: &str = "s3.amazonaws.com";

fn region_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^s3-([a-z0-9-]+)\.amazonaws\.com$").expect("valid regex"))
}

/// Domain plus scheme for an S3-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub domain: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

impl Endpoint {
    /// Create an endpoint for the given domain. Empty string falls back to
    /// [`DEFAULT_DOMAIN`].
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        if domain.is_empty() {
            Self::default()
        } else {
            Self { domain }
        }
    }

    /// Infer the signing region from the domain, per spec §3:
    ///
    /// - `s3.amazonaws.com` / `s3-external-1.amazonaws.com` -> `us-east-1`
    /// - `s3-<region>.amazonaws.com` -> `<region>`
    /// - otherwise fall back to `AWS_REGION`, or fail
    pub fn region(&self) -> Result<String, TransferError> {
        match self.domain.as_str() {
            "s3.amazonaws.com" | "s3-external-1.amazonaws.com" => Ok("us-east-1".to_string()),
            _ => {
                if let Some(caps) = region_matcher().captures(&self.domain) {
                    return Ok(caps[1].to_string());
                }
                env::var("AWS_REGION").map_err(|_| {
                    TransferError::precondition(format!(
                        "cannot infer region for endpoint domain '{}' and AWS_REGION is not set",
                        self.domain
                    ))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_domain_is_us_east_1() {
        assert_eq!(Endpoint::default().region().unwrap(), "us-east-1");
    }

    #[test]
    fn external_1_is_us_east_1() {
        let e = Endpoint::new("s3-external-1.amazonaws.com");
        assert_eq!(e.region().unwrap(), "us-east-1");
    }

    #[test]
    fn regional_domain_matches() {
        let e = Endpoint::new("s3-eu-west-1.amazonaws.com");
        assert_eq!(e.region().unwrap(), "eu-west-1");
    }

    #[test]
    fn unrecognized_domain_falls_back_to_env_or_errors() {
        let e = Endpoint::new("minio.example.internal");
        // No AWS_REGION set in the test harness by default.
        if env::var("AWS_REGION").is_err() {
            assert!(e.region().is_err());
        }
    }

    #[test]
    fn empty_domain_uses_default() {
        assert_eq!(Endpoint::new("").domain, DEFAULT_DOMAIN);
    }
}
