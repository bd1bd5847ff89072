// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! SIGMA session establishment and protected command exchange.

pub use self::errors::Error;
pub use self::handshake::{SigmaSession, DEVICE_ATTESTATION_CHAIN};
pub use self::session::{HandshakeState, KeyMaterial, PeerInfo, SessionContext};
pub use self::transport::{Transport, TransportError};

mod errors;
mod handshake;
#[cfg(test)]
mod mock;
mod session;
mod transport;
