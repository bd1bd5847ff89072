// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::provider::CryptoProvider;
use openssl::bn::BigNumContext;
use openssl::derive::Deriver;
use openssl::ec::{EcGroup, EcKey, EcPoint, PointConversionForm};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use zeroize::Zeroizing;

/// Raw P-384 public key: X ‖ Y, 48 bytes each
pub const RAW_PUBKEY_LEN: usize = 96;

const UNCOMPRESSED_TAG: u8 = 0x04;

fn p384() -> Result<EcGroup, ErrorStack> {
    EcGroup::from_curve_name(Nid::SECP384R1)
}

/// Rebuild a P-384 public key from its raw X ‖ Y encoding, checking the
/// point is on the curve
pub fn public_key_from_raw(data: &[u8]) -> Result<EcKey<Public>, Error> {
    if data.len() != RAW_PUBKEY_LEN {
        return Err(Error::Key(format!(
            "expecting {RAW_PUBKEY_LEN} bytes raw public key, got {}",
            data.len()
        )));
    }

    let mut sec1 = Vec::with_capacity(RAW_PUBKEY_LEN + 1);
    sec1.push(UNCOMPRESSED_TAG);
    sec1.extend_from_slice(data);

    let build = || -> Result<EcKey<Public>, ErrorStack> {
        let group = p384()?;
        let mut ctx = BigNumContext::new()?;
        let point = EcPoint::from_bytes(&group, &sec1, &mut ctx)?;
        let key = EcKey::from_public_key(&group, &point)?;
        key.check_key()?;
        Ok(key)
    };

    build().map_err(|e| Error::Key(format!("invalid P-384 public key: {e:?}")))
}

/// A single-use P-384 key pair for one handshake
pub struct EphemeralKey {
    key: EcKey<Private>,
}

impl std::fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EphemeralKey(P-384)")
    }
}

impl EphemeralKey {
    pub fn generate(provider: &CryptoProvider) -> Result<Self, Error> {
        match provider {
            CryptoProvider::OpenSsl => {
                let key = p384()
                    .and_then(|g| EcKey::generate(&g))
                    .map_err(|e| Error::Key(format!("{e:?}")))?;

                Ok(Self { key })
            }
        }
    }

    pub fn public_bytes(&self) -> Result<[u8; RAW_PUBKEY_LEN], Error> {
        let encode = || -> Result<Vec<u8>, ErrorStack> {
            let group = p384()?;
            let mut ctx = BigNumContext::new()?;
            self.key
                .public_key()
                .to_bytes(&group, PointConversionForm::UNCOMPRESSED, &mut ctx)
        };

        let sec1 = encode().map_err(|e| Error::Key(format!("{e:?}")))?;

        match sec1.split_first() {
            Some((&UNCOMPRESSED_TAG, xy)) => xy
                .try_into()
                .map_err(|_| Error::Key(format!("unexpected point size {}", xy.len()))),
            _ => Err(Error::Key("unexpected point encoding".to_string())),
        }
    }

    /// ECDH with the peer's raw public key.  Fails if the peer key is not a
    /// valid curve point.
    pub fn shared_secret(&self, peer_raw: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        let peer = public_key_from_raw(peer_raw)?;

        let derive = || -> Result<Vec<u8>, ErrorStack> {
            let ours = PKey::from_ec_key(self.key.clone())?;
            let theirs = PKey::from_ec_key(peer)?;

            let mut deriver = Deriver::new(&ours)?;
            deriver.set_peer(&theirs)?;
            deriver.derive_to_vec()
        };

        derive()
            .map(Zeroizing::new)
            .map_err(|e| Error::Key(format!("ECDH failed: {e:?}")))
    }
}
