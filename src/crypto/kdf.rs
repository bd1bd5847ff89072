// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Single-iteration counter-mode KDF (NIST SP 800-108) over HMAC-SHA384.

use super::errors::Error;
use super::provider::{CryptoProvider, SHA384_LEN};
use crate::codec::{ByteOrder, SafeCursor};
use zeroize::Zeroizing;

pub const LABEL_LEN: usize = 27;
pub const CONTEXT_LEN: usize = 16;
pub const CONTEXT: &str = "PSG-SIGMA";

// counter ‖ label ‖ separator ‖ context ‖ reserved ‖ output bits
const BLOCK_LEN: usize = 4 + LABEL_LEN + 1 + CONTEXT_LEN + 4 + 4;

pub const PMK_LEN: usize = 48;
pub const SEK_LEN: usize = 32;
pub const SMK_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KdfLabel {
    ProtocolMac,
    SessionEnc,
    SessionMac,
}

impl KdfLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            KdfLabel::ProtocolMac => "PROTOCOL MAC",
            KdfLabel::SessionEnc => "SESSION ENC",
            KdfLabel::SessionMac => "SESSION MAC",
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            KdfLabel::ProtocolMac => PMK_LEN,
            KdfLabel::SessionEnc => SEK_LEN,
            KdfLabel::SessionMac => SMK_LEN,
        }
    }

    /// ASCII label right-padded with zeros
    pub fn encode(&self) -> [u8; LABEL_LEN] {
        padded(self.as_str())
    }
}

fn padded<const N: usize>(s: &str) -> [u8; N] {
    let mut b = [0u8; N];
    let n = s.len().min(N);
    b[..n].copy_from_slice(&s.as_bytes()[..n]);
    b
}

fn input_block(label: KdfLabel, out_len: usize) -> Result<[u8; BLOCK_LEN], Error> {
    let bits = u32::try_from(out_len * 8).map_err(|e| Error::Kdf(e.to_string()))?;

    let mut c = SafeCursor::new([0u8; BLOCK_LEN]).with_order(ByteOrder::LittleEndian);

    let mut fill = || -> Result<(), crate::codec::Error> {
        c.put_u32(1)?;
        c.put_bytes(&label.encode())?;
        c.put_bytes(&[0])?;
        c.put_bytes(&padded::<CONTEXT_LEN>(CONTEXT))?;
        c.put_u32(0)?;
        c.put_u32(bits)
    };

    fill().map_err(|e| Error::Kdf(e.to_string()))?;

    Ok(c.into_inner())
}

/// Derive `out_len` bytes from `secret`.  A single HMAC block is computed so
/// at most 48 bytes can be requested.
pub fn derive(
    provider: &CryptoProvider,
    secret: &[u8],
    label: KdfLabel,
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    if out_len > SHA384_LEN {
        return Err(Error::Kdf(format!(
            "{out_len} bytes requested, at most {SHA384_LEN} available"
        )));
    }

    let block = input_block(label, out_len)?;

    let hash = Zeroizing::new(
        provider
            .hmac_sha384(secret, &block)
            .map_err(|e| Error::Kdf(e.to_string()))?,
    );

    Ok(Zeroizing::new(hash[..out_len].to_vec()))
}

pub fn derive_pmk(provider: &CryptoProvider, secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    derive(provider, secret, KdfLabel::ProtocolMac, KdfLabel::ProtocolMac.output_len())
}

pub fn derive_sek(provider: &CryptoProvider, secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    derive(provider, secret, KdfLabel::SessionEnc, KdfLabel::SessionEnc.output_len())
}

pub fn derive_smk(provider: &CryptoProvider, secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    derive(provider, secret, KdfLabel::SessionMac, KdfLabel::SessionMac.output_len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const SECRET: [u8; 48] = [0x42; 48];

    #[test]
    fn output_lengths() {
        let p = CryptoProvider::OpenSsl;

        assert_eq!(derive_pmk(&p, &SECRET).unwrap().len(), 48);
        assert_eq!(derive_sek(&p, &SECRET).unwrap().len(), 32);
        assert_eq!(derive_smk(&p, &SECRET).unwrap().len(), 32);
    }

    #[test]
    fn labels_are_fixed_width() {
        for l in [KdfLabel::ProtocolMac, KdfLabel::SessionEnc, KdfLabel::SessionMac] {
            let e = l.encode();

            assert_eq!(e.len(), LABEL_LEN);
            assert_eq!(&e[..l.as_str().len()], l.as_str().as_bytes());
            assert!(e[l.as_str().len()..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn input_block_layout() {
        let b = input_block(KdfLabel::SessionEnc, 32).unwrap();

        assert_eq!(b.len(), 56);
        assert_eq!(&b[..4], &hex!("01000000"));
        assert_eq!(&b[4..15], b"SESSION ENC");
        assert_eq!(b[31], 0);
        assert_eq!(&b[32..41], b"PSG-SIGMA");
        assert_eq!(&b[48..52], &hex!("00000000"));
        // 256 bits, little-endian
        assert_eq!(&b[52..], &hex!("00010000"));
    }

    #[test]
    fn output_is_hmac_prefix() {
        let p = CryptoProvider::OpenSsl;

        let full = p
            .hmac_sha384(&SECRET, &input_block(KdfLabel::SessionMac, 32).unwrap())
            .unwrap();

        assert_eq!(derive_smk(&p, &SECRET).unwrap().as_slice(), &full[..32]);
    }

    #[test]
    fn keys_are_distinct() {
        let p = CryptoProvider::OpenSsl;

        assert_ne!(derive_sek(&p, &SECRET).unwrap(), derive_smk(&p, &SECRET).unwrap());
    }

    #[test]
    fn oversized_output_rejected() {
        assert!(matches!(
            derive(&CryptoProvider::OpenSsl, &SECRET, KdfLabel::SessionEnc, 49),
            Err(Error::Kdf(_))
        ));
    }
}
