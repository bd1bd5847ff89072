// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use openssl::symm::{decrypt_aead, encrypt_aead, Cipher};
use serde::Deserialize;
use std::fmt;

pub const SHA384_LEN: usize = 48;
pub const GCM_TAG_LEN: usize = 16;

/// The cryptographic backends the verifier can be configured with
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum CryptoProvider {
    #[default]
    #[serde(rename = "openssl")]
    OpenSsl,
}

impl fmt::Display for CryptoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoProvider::OpenSsl => write!(f, "openssl"),
        }
    }
}

impl CryptoProvider {
    pub fn hmac_sha384(&self, key: &[u8], data: &[u8]) -> Result<[u8; SHA384_LEN], Error> {
        match self {
            CryptoProvider::OpenSsl => {
                let pkey = PKey::hmac(key).map_err(|e| Error::Mac(format!("{e:?}")))?;
                let mut signer = Signer::new(MessageDigest::sha384(), &pkey)
                    .map_err(|e| Error::Mac(format!("{e:?}")))?;

                signer
                    .update(data)
                    .map_err(|e| Error::Mac(format!("{e:?}")))?;

                let v = signer
                    .sign_to_vec()
                    .map_err(|e| Error::Mac(format!("{e:?}")))?;

                v.try_into()
                    .map_err(|v: Vec<u8>| Error::Mac(format!("unexpected digest size {}", v.len())))
            }
        }
    }

    pub fn sha384(&self, data: &[u8]) -> [u8; SHA384_LEN] {
        match self {
            CryptoProvider::OpenSsl => openssl::sha::sha384(data),
        }
    }

    pub fn random(&self, buf: &mut [u8]) -> Result<(), Error> {
        match self {
            CryptoProvider::OpenSsl => {
                openssl::rand::rand_bytes(buf).map_err(|e| Error::Random(format!("{e:?}")))
            }
        }
    }

    /// AES-256-GCM with empty AAD; returns ciphertext and tag
    pub fn aes_256_gcm_seal(
        &self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; GCM_TAG_LEN]), Error> {
        match self {
            CryptoProvider::OpenSsl => {
                let mut tag = [0u8; GCM_TAG_LEN];

                let ct = encrypt_aead(
                    Cipher::aes_256_gcm(),
                    key,
                    Some(iv),
                    &[],
                    plaintext,
                    &mut tag,
                )
                .map_err(|e| Error::Encryption(format!("{e:?}")))?;

                Ok((ct, tag))
            }
        }
    }

    /// Inverse of [`CryptoProvider::aes_256_gcm_seal`].  Any failure,
    /// including tag mismatch, is reported as [`Error::Decryption`].
    pub fn aes_256_gcm_open(
        &self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, Error> {
        match self {
            CryptoProvider::OpenSsl => {
                decrypt_aead(Cipher::aes_256_gcm(), key, Some(iv), &[], ciphertext, tag)
                    .map_err(|_| Error::Decryption)
            }
        }
    }
}
