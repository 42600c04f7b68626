/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credential triple used to sign every request.
//!
//! Acquisition from the process environment or a cloud-instance metadata
//! endpoint is an external collaborator's concern (see spec §1 Non-goals);
//! [`Keys::from_env`] is a minimal convenience for demos and tests, not a
//! provider chain.

use std::env;

/// Immutable AWS-style credential triple.
///
/// Constructed once at program start and shared by reference; nothing in
/// this crate mutates a `Keys` after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
}

impl Keys {
    /// Construct a new credential triple.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token: None,
        }
    }

    /// Attach a security (session) token, e.g. for temporary STS credentials.
    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }

    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
    /// from the process environment.
    ///
    /// This is the only credential source this crate implements directly;
    /// EC2/ECS instance-role metadata resolution is out of scope here (see
    /// spec §6, "Environment credential fallbacks").
    pub fn from_env() -> Result<Self, crate::error::TransferError> {
        let access_key = env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            crate::error::TransferError::precondition("AWS_ACCESS_KEY_ID not set")
        })?;
        let secret_key = env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            crate::error::TransferError::precondition("AWS_SECRET_ACCESS_KEY not set")
        })?;
        let security_token = env::var("AWS_SESSION_TOKEN").ok();
        Ok(Self {
            access_key,
            secret_key,
            security_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_attaches_token() {
        let keys = Keys::new("ak", "sk").with_security_token("tok");
        assert_eq!(keys.access_key, "ak");
        assert_eq!(keys.security_token.as_deref(), Some("tok"));
    }
}
