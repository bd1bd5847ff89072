// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::provider::{CryptoProvider, SHA384_LEN};
use openssl::bn::BigNum;
use openssl::ec::EcKeyRef;
use openssl::ecdsa::EcdsaSig;
use openssl::pkey::Public;

/// Verify a raw (r, s) ECDSA P-384 signature over SHA-384(`data`).
///
/// Returns `Ok(false)` on a well-formed but wrong signature; errors are
/// reserved for malformed inputs and backend failures.
pub fn verify_ecdsa_p384(
    provider: &CryptoProvider,
    key: &EcKeyRef<Public>,
    r: &[u8],
    s: &[u8],
    data: &[u8],
) -> Result<bool, Error> {
    let sig = BigNum::from_slice(r)
        .and_then(|r| BigNum::from_slice(s).map(|s| (r, s)))
        .and_then(|(r, s)| EcdsaSig::from_private_components(r, s))
        .map_err(|e| Error::Signature(format!("{e:?}")))?;

    let digest = provider.sha384(data);

    sig.verify(&digest, key)
        .map_err(|e| Error::Signature(format!("{e:?}")))
}

pub fn compute_mac(
    provider: &CryptoProvider,
    key: &[u8],
    data: &[u8],
) -> Result<[u8; SHA384_LEN], Error> {
    provider.hmac_sha384(key, data)
}

/// Constant-time comparison of `expected` against HMAC-SHA384(`key`, `data`)
pub fn verify_mac(
    provider: &CryptoProvider,
    key: &[u8],
    data: &[u8],
    expected: &[u8],
) -> Result<bool, Error> {
    let mac = compute_mac(provider, key, data)?;

    Ok(expected.len() == mac.len() && openssl::memcmp::eq(&mac, expected))
}
