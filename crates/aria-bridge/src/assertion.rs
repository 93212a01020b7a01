// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JWT-bearer client assertions (RFC 7523).
//!
//! The device proves its identity by signing a short-lived JWT with its
//! RSA private key. Signing is a pure function of the claims and the key;
//! the caller supplies the clock and the nonce.
//!
//! ```text
//! base64url(header) "." base64url(claims) "." base64url(RS256 signature)
//! ```

use crate::token::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::SystemRandom;
use ring::signature::{self, RsaKeyPair};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Assertion lifetime in seconds.
pub const ASSERTION_LIFETIME_SECS: u64 = 180;

const PKCS8_TAG: &str = "PRIVATE KEY";
const PKCS1_TAG: &str = "RSA PRIVATE KEY";

/// RSA signing key for client assertions.
///
/// The key material never leaves this type.
pub struct SigningKey {
    key_pair: RsaKeyPair,
    rng: SystemRandom,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("modulus_bits", &(self.key_pair.public().modulus_len() * 8))
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Parse a PEM-encoded RSA private key (PKCS#8 or PKCS#1).
    pub fn from_pem(pem_data: &[u8]) -> Result<Self, AuthError> {
        let pem = ::pem::parse(pem_data).map_err(|e| {
            AuthError::SigningFailure(format!("failed to parse private key PEM: {}", e))
        })?;

        let key_pair = match pem.tag() {
            PKCS8_TAG => RsaKeyPair::from_pkcs8(pem.contents()),
            PKCS1_TAG => RsaKeyPair::from_der(pem.contents()),
            other => {
                return Err(AuthError::SigningFailure(format!(
                    "unsupported PEM block '{}' (RSA private key required)",
                    other
                )))
            }
        }
        .map_err(|e| AuthError::SigningFailure(format!("RSA key rejected: {}", e)))?;

        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// Read and parse a PEM key file.
    pub fn from_pem_file<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            AuthError::SigningFailure(format!(
                "failed to read private key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_pem(&data)
    }

    /// RS256 (RSASSA-PKCS1-v1_5 with SHA-256) signature over `data`.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut sig = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&signature::RSA_PKCS1_SHA256, &self.rng, data, &mut sig)
            .map_err(|e| AuthError::SigningFailure(format!("RSA signing failed: {:?}", e)))?;
        Ok(sig)
    }
}

#[derive(Debug, Serialize)]
struct JwsHeader {
    alg: &'static str,
    typ: &'static str,
}

const RS256_HEADER: JwsHeader = JwsHeader {
    alg: "RS256",
    typ: "JWT",
};

/// Registered claims carried by a client assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

impl AssertionClaims {
    /// Claims for `client_id` addressed to `audience`, valid for
    /// [`ASSERTION_LIFETIME_SECS`] from `issued_at` (Unix seconds).
    pub fn new(
        client_id: &str,
        audience: &str,
        issued_at: u64,
        jwt_id: impl Into<String>,
    ) -> Self {
        Self {
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            aud: audience.to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
            jti: jwt_id.into(),
        }
    }
}

/// Produce a compact RS256 JWS for `claims`.
pub fn sign_assertion(claims: &AssertionClaims, key: &SigningKey) -> Result<String, AuthError> {
    let header = serde_json::to_vec(&RS256_HEADER)
        .map_err(|e| AuthError::SigningFailure(format!("header encoding failed: {}", e)))?;
    let payload = serde_json::to_vec(claims)
        .map_err(|e| AuthError::SigningFailure(format!("claims encoding failed: {}", e)))?;

    let mut token = URL_SAFE_NO_PAD.encode(header);
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(payload));

    let sig = key.sign(token.as_bytes())?;
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(sig));
    Ok(token)
}
