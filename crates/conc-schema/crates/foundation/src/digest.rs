// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use ring::digest::{Context, SHA256, SHA256_OUTPUT_LEN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[cfg(test)]
#[path = "./digest_test.rs"]
mod digest_test;

/// The number of bytes in a digest
pub const DIGEST_SIZE: usize = SHA256_OUTPUT_LEN;
/// The length of the encoded form of a digest
pub const DIGEST_STR_LEN: usize = 52;
/// The length of the abbreviated form of a digest
pub const SHORT_DIGEST_LEN: usize = 7;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("Invalid digest '{text}': {message}")]
#[diagnostic(code(conc::invalid_digest))]
pub struct InvalidDigestError {
    pub text: String,
    pub message: String,
}

/// A SHA-256 digest, rendered as lowercase, unpadded base32.
#[derive(PartialEq, Eq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Compute the digest of some data.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finish()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The first few characters of the encoded digest, for display
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(SHORT_DIGEST_LEN);
        s
    }

    /// True if the encoded digest begins with the given text.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.to_string().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl From<[u8; DIGEST_SIZE]> for Digest {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&BASE32_NOPAD.encode(&self.0).to_ascii_lowercase())
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl FromStr for Digest {
    type Err = InvalidDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| InvalidDigestError {
            text: s.to_owned(),
            message,
        };
        if s.len() != DIGEST_STR_LEN {
            return Err(invalid(format!(
                "expected {DIGEST_STR_LEN} characters, got {}",
                s.len()
            )));
        }
        let bytes = BASE32_NOPAD
            .decode(s.to_ascii_uppercase().as_bytes())
            .map_err(|err| invalid(err.to_string()))?;
        let bytes: [u8; DIGEST_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| invalid(format!("expected {DIGEST_SIZE} bytes")))?;
        Ok(Digest(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incrementally computes a [`Digest`].
pub struct Hasher {
    ctx: Context,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            ctx: Context::new(&SHA256),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.ctx.update(data);
    }

    pub fn finish(self) -> Digest {
        let mut bytes = [0; DIGEST_SIZE];
        bytes.copy_from_slice(self.ctx.finish().as_ref());
        Digest(bytes)
    }
}
