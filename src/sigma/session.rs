// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::codec::{ByteOrder, DEVICE_ID_LEN, DH_PUBKEY_LEN};
use crate::crypto::{self, CryptoProvider, EphemeralKey, GcmCipher};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    DhEstablished,
    KeysDerived,
    SessionActive,
    TornDown,
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeState::Init => "INIT",
            HandshakeState::DhEstablished => "DH_ESTABLISHED",
            HandshakeState::KeysDerived => "KEYS_DERIVED",
            HandshakeState::SessionActive => "SESSION_ACTIVE",
            HandshakeState::TornDown => "TORN_DOWN",
            HandshakeState::Failed => "FAILED",
        };

        write!(f, "{s}")
    }
}

/// The three session keys.  Wiped when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pmk: [u8; 48],
    sek: [u8; 32],
    smk: [u8; 32],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial {{ <redacted> }}")
    }
}

fn copy_key<const N: usize>(v: &[u8]) -> Result<[u8; N], crypto::Error> {
    v.try_into()
        .map_err(|_| crypto::Error::Kdf(format!("expecting {N} bytes, got {}", v.len())))
}

impl KeyMaterial {
    /// Run the KDF once per key over the ECDH shared secret
    pub fn derive(provider: &CryptoProvider, shared_secret: &[u8]) -> Result<Self, crypto::Error> {
        Ok(Self {
            pmk: copy_key(&crypto::derive_pmk(provider, shared_secret)?)?,
            sek: copy_key(&crypto::derive_sek(provider, shared_secret)?)?,
            smk: copy_key(&crypto::derive_smk(provider, shared_secret)?)?,
        })
    }

    /// Protocol MAC key, authenticates M2
    pub fn pmk(&self) -> &[u8] {
        &self.pmk
    }

    /// Session encryption key
    pub fn sek(&self) -> &[u8] {
        &self.sek
    }

    /// Session MAC key, authenticates SIGMA_ENC traffic
    pub fn smk(&self) -> &[u8] {
        &self.smk
    }
}

/// Everything an active session owns.  Dropping it wipes the keys.
#[derive(Debug)]
pub struct SessionContext {
    local: EphemeralKey,
    local_public: [u8; DH_PUBKEY_LEN],
    remote_public: [u8; DH_PUBKEY_LEN],
    session_id: u32,
    device_id: [u8; DEVICE_ID_LEN],
    keys: KeyMaterial,
    cipher: GcmCipher,
    sent: u32,
    last_accepted: u32,
}

/// Values learnt from M2
#[derive(Clone, Copy, Debug)]
pub struct PeerInfo {
    pub remote_public: [u8; DH_PUBKEY_LEN],
    pub session_id: u32,
    pub device_id: [u8; DEVICE_ID_LEN],
}

impl SessionContext {
    pub fn new(
        local: EphemeralKey,
        peer: PeerInfo,
        keys: KeyMaterial,
        provider: CryptoProvider,
        iv_length_order: ByteOrder,
    ) -> Result<Self, Error> {
        let local_public = local.public_bytes()?;

        let cipher = GcmCipher::new()
            .with_key(keys.sek())?
            .with_provider(provider)
            .with_byte_order(iv_length_order);

        Ok(Self {
            local,
            local_public,
            remote_public: peer.remote_public,
            session_id: peer.session_id,
            device_id: peer.device_id,
            keys,
            cipher,
            sent: 0,
            last_accepted: 0,
        })
    }

    pub fn local_key(&self) -> &EphemeralKey {
        &self.local
    }

    pub fn local_public(&self) -> &[u8; DH_PUBKEY_LEN] {
        &self.local_public
    }

    pub fn remote_public(&self) -> &[u8; DH_PUBKEY_LEN] {
        &self.remote_public
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn device_id(&self) -> &[u8; DEVICE_ID_LEN] {
        &self.device_id
    }

    pub fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    pub fn cipher(&self) -> &GcmCipher {
        &self.cipher
    }

    /// Counter for the next outbound message, starting at 1
    pub fn next_counter(&mut self) -> Result<u32, Error> {
        self.sent = self
            .sent
            .checked_add(1)
            .ok_or_else(|| Error::Handshake("message counter exhausted".to_string()))?;

        Ok(self.sent)
    }

    /// Accept an inbound counter only if it is newer than any seen before
    pub fn accept_counter(&mut self, received: u32) -> Result<(), Error> {
        if received <= self.last_accepted {
            return Err(Error::Replay {
                received,
                last_accepted: self.last_accepted,
            });
        }

        self.last_accepted = received;

        Ok(())
    }

    pub fn last_accepted(&self) -> u32 {
        self.last_accepted
    }
}
