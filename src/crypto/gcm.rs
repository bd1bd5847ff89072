// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::{Error, Setting};
use super::provider::{CryptoProvider, GCM_TAG_LEN};
use crate::codec::{ByteOrder, SafeCursor};
use zeroize::Zeroizing;

pub const IV_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

const IV_LEN_FIELD: usize = 4;

/// AES-256-GCM channel cipher.
///
/// Envelope: `iv_len (u32) ‖ iv ‖ ciphertext ‖ tag`.  Key, provider and the
/// byte order of `iv_len` must all be set before use.
#[derive(Default)]
pub struct GcmCipher {
    key: Option<Zeroizing<Vec<u8>>>,
    provider: Option<CryptoProvider>,
    order: Option<ByteOrder>,
}

impl std::fmt::Debug for GcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcmCipher")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider)
            .field("order", &self.order)
            .finish()
    }
}

impl GcmCipher {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_key(mut self, key: &[u8]) -> Result<Self, Error> {
        if key.len() != KEY_LEN {
            return Err(Error::Key(format!(
                "expecting {KEY_LEN} bytes AES key, got {}",
                key.len()
            )));
        }

        self.key = Some(Zeroizing::new(key.to_vec()));

        Ok(self)
    }

    pub fn with_provider(mut self, provider: CryptoProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = Some(order);
        self
    }

    fn settings(&self) -> Result<(&[u8], CryptoProvider, ByteOrder), Error> {
        let key = self.key.as_ref().ok_or(Error::NotConfigured(Setting::Key))?;
        let provider = self.provider.ok_or(Error::NotConfigured(Setting::Provider))?;
        let order = self.order.ok_or(Error::NotConfigured(Setting::ByteOrder))?;

        Ok((key.as_slice(), provider, order))
    }

    /// Encrypt under a fresh random IV
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let (key, provider, order) = self.settings()?;

        let mut iv = [0u8; IV_LEN];
        provider.random(&mut iv)?;

        let (ct, tag) = provider.aes_256_gcm_seal(key, &iv, plaintext)?;

        let mut c = SafeCursor::new(vec![0u8; IV_LEN_FIELD + IV_LEN + ct.len() + GCM_TAG_LEN])
            .with_order(order);

        let mut fill = || -> Result<(), crate::codec::Error> {
            c.put_u32(IV_LEN as u32)?;
            c.put_bytes(&iv)?;
            c.put_bytes(&ct)?;
            c.put_bytes(&tag)
        };

        fill().map_err(|e| Error::Encryption(e.to_string()))?;

        Ok(c.into_inner())
    }

    /// Every malformation and authentication failure is reported as
    /// [`Error::Decryption`]
    pub fn decrypt(&self, framed: &[u8]) -> Result<Vec<u8>, Error> {
        let (key, provider, order) = self.settings()?;

        let mut c = SafeCursor::new(framed).with_order(order);

        let iv_len = c.get_u32().map_err(|_| Error::Decryption)? as usize;
        if iv_len != IV_LEN {
            return Err(Error::Decryption);
        }

        let iv: [u8; IV_LEN] = c.get_array().map_err(|_| Error::Decryption)?;

        let body = &framed[c.position()..];
        if body.len() < GCM_TAG_LEN {
            return Err(Error::Decryption);
        }

        let (ct, tag) = body.split_at(body.len() - GCM_TAG_LEN);

        provider.aes_256_gcm_open(key, &iv, ct, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x11; 32];

    fn cipher() -> GcmCipher {
        GcmCipher::new()
            .with_key(&KEY)
            .unwrap()
            .with_provider(CryptoProvider::OpenSsl)
            .with_byte_order(ByteOrder::BigEndian)
    }

    #[test]
    fn round_trip() {
        let c = cipher();

        for m in [&[][..], &[0u8][..], &[1u8][..], &[1, 2, 3, 4, 5, 6, 7, 8, 9][..]] {
            let framed = c.encrypt(m).unwrap();

            assert_eq!(framed.len(), 4 + IV_LEN + m.len() + GCM_TAG_LEN);
            assert_eq!(&framed[..4], &[0, 0, 0, 12]);
            assert_eq!(c.decrypt(&framed).unwrap(), m);
        }
    }

    #[test]
    fn iv_length_order_is_configurable() {
        let c = cipher().with_byte_order(ByteOrder::LittleEndian);

        let framed = c.encrypt(b"hello").unwrap();

        assert_eq!(&framed[..4], &[12, 0, 0, 0]);
        assert_eq!(c.decrypt(&framed).unwrap(), b"hello");

        // the big-endian reader sees a bogus IV length
        assert_eq!(cipher().decrypt(&framed), Err(Error::Decryption));
    }

    #[test]
    fn fresh_iv_per_message() {
        let c = cipher();

        assert_ne!(c.encrypt(b"same").unwrap(), c.encrypt(b"same").unwrap());
    }

    #[test]
    fn wrong_iv_length_rejected() {
        let c = cipher();
        let mut framed = c.encrypt(b"payload").unwrap();
        framed[3] = 16;

        assert_eq!(c.decrypt(&framed), Err(Error::Decryption));
    }

    #[test]
    fn truncated_input_rejected() {
        let c = cipher();
        let framed = c.encrypt(b"payload").unwrap();

        for n in [0, 3, 10, 16, framed.len() - 1] {
            assert_eq!(c.decrypt(&framed[..n]), Err(Error::Decryption), "{n}");
        }
    }

    #[test]
    fn tampering_and_wrong_key_rejected() {
        let c = cipher();
        let mut framed = c.encrypt(b"payload").unwrap();

        let other = GcmCipher::new()
            .with_key(&[0x22; 32])
            .unwrap()
            .with_provider(CryptoProvider::OpenSsl)
            .with_byte_order(ByteOrder::BigEndian);
        assert_eq!(other.decrypt(&framed), Err(Error::Decryption));

        framed[20] ^= 1;
        assert_eq!(c.decrypt(&framed), Err(Error::Decryption));
    }

    #[test]
    fn missing_settings() {
        assert_eq!(
            GcmCipher::new().encrypt(b"x"),
            Err(Error::NotConfigured(Setting::Key))
        );

        let c = GcmCipher::new().with_key(&KEY).unwrap();
        assert_eq!(c.decrypt(b"x"), Err(Error::NotConfigured(Setting::Provider)));

        let c = c.with_provider(CryptoProvider::OpenSsl);
        assert_eq!(c.encrypt(b"x"), Err(Error::NotConfigured(Setting::ByteOrder)));
    }

    #[test]
    fn bad_key_length() {
        assert!(matches!(GcmCipher::new().with_key(&[0; 16]), Err(Error::Key(_))));
    }
}
