// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::session::HandshakeState;

/// The single error surfaced by a [`super::SigmaSession`].  Lower layer
/// failures are carried as-is.
#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] crate::codec::Error),
    #[error(transparent)]
    Crypto(#[from] crate::crypto::Error),
    #[error("Handshake error: {0}")]
    Handshake(String),
    #[error("MAC mismatch: {0}")]
    MacMismatch(String),
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),
    #[error("DH key mismatch: {0}")]
    DhKeyMismatch(String),
    #[error("Replayed message: counter {received} not greater than {last_accepted}")]
    Replay { received: u32, last_accepted: u32 },
    #[error("Nonce mismatch: {0}")]
    NonceMismatch(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{operation} not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: HandshakeState,
    },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
