// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// A cipher setting that must be supplied before use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Setting {
    Key,
    Provider,
    ByteOrder,
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Key => write!(f, "key"),
            Setting::Provider => write!(f, "provider"),
            Setting::ByteOrder => write!(f, "byte order"),
        }
    }
}

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("KDF error: {0}")]
    Kdf(String),
    #[error("decryption failed")]
    Decryption,
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("not configured: missing {0}")]
    NotConfigured(Setting),
    #[error("key error: {0}")]
    Key(String),
    #[error("MAC computation failed: {0}")]
    Mac(String),
    #[error("signature error: {0}")]
    Signature(String),
    #[error("random number generation failed: {0}")]
    Random(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
