// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Typed read-only views over parsed response structures.

use super::cursor::SafeCursor;
use super::endianness::Actor;
use super::errors::Error;
use super::structure::{Structure, StructureField as F, StructureType};

pub const DH_PUBKEY_LEN: usize = 96;
pub const MAC_LEN: usize = 48;
pub const NONCE_LEN: usize = 32;
pub const DEVICE_ID_LEN: usize = 8;

const DER_SEQUENCE: u8 = 0x30;

fn array<const N: usize>(s: &Structure, field: F) -> Result<[u8; N], Error> {
    let v = s.field(field)?;

    v.try_into().map_err(|_| Error::FieldLength {
        field: field.to_string(),
        expected: N,
        actual: v.len(),
    })
}

fn expect_type(s: &Structure, allowed: &[StructureType]) -> Result<(), Error> {
    if !allowed.contains(&s.structure_type()) {
        return Err(Error::StructureValidation(format!(
            "unexpected structure {}",
            s.structure_type()
        )));
    }

    Ok(())
}

/// Raw ECDSA signature components, big-endian
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: [u8; 48],
    pub s: [u8; 48],
}

/// View over a parsed SIGMA_M2
#[derive(Clone, Debug)]
pub struct SigmaM2 {
    inner: Structure,
}

impl SigmaM2 {
    pub fn parse(actor: Actor, buf: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: Structure::parse(StructureType::SigmaM2, actor, buf)?,
        })
    }

    pub fn structure(&self) -> &Structure {
        &self.inner
    }

    pub fn sdm_session_id(&self) -> Result<u32, Error> {
        self.inner.u32(F::SigmaM2SdmSessionId)
    }

    pub fn device_unique_id(&self) -> Result<[u8; DEVICE_ID_LEN], Error> {
        array(&self.inner, F::SigmaM2DeviceUniqueId)
    }

    pub fn device_dh_pubkey(&self) -> Result<[u8; DH_PUBKEY_LEN], Error> {
        array(&self.inner, F::SigmaM2DeviceDhPubkey)
    }

    pub fn verifier_dh_pubkey(&self) -> Result<[u8; DH_PUBKEY_LEN], Error> {
        array(&self.inner, F::SigmaM2VerifierDhPubkey)
    }

    /// Decode the nested ECDSA_SIGNATURE blob.  It is encoded for the same
    /// actor as the enclosing message.
    pub fn signature(&self) -> Result<EcdsaSignature, Error> {
        let sig = Structure::parse(
            StructureType::EcdsaSignature,
            self.inner.actor(),
            self.inner.field(F::SigmaM2Signature)?,
        )?;

        Ok(EcdsaSignature {
            r: array(&sig, F::EcdsaSignatureR)?,
            s: array(&sig, F::EcdsaSignatureS)?,
        })
    }

    pub fn mac(&self) -> Result<[u8; MAC_LEN], Error> {
        array(&self.inner, F::SigmaM2Mac)
    }

    /// Wire bytes covered by the device signature
    pub fn signed_bytes(&self) -> Result<Vec<u8>, Error> {
        self.inner.bytes_before(F::SigmaM2SignatureLen)
    }

    /// Wire bytes covered by the MAC
    pub fn maced_bytes(&self) -> Result<Vec<u8>, Error> {
        self.inner.bytes_before(F::SigmaM2Mac)
    }
}

/// View over a SIGMA_ENC request or SIGMA_ENC_RESP response; both share the
/// same layout.
#[derive(Clone, Debug)]
pub struct SigmaEnc {
    inner: Structure,
}

impl SigmaEnc {
    fn fields(&self) -> (F, F, F, F) {
        match self.inner.structure_type() {
            StructureType::SigmaEncResp => (
                F::SigmaEncRespSdmSessionId,
                F::SigmaEncRespMessageCounter,
                F::SigmaEncRespPayload,
                F::SigmaEncRespMac,
            ),
            _ => (
                F::SigmaEncSdmSessionId,
                F::SigmaEncMessageCounter,
                F::SigmaEncPayload,
                F::SigmaEncMac,
            ),
        }
    }

    pub fn from_structure(inner: Structure) -> Result<Self, Error> {
        expect_type(&inner, &[StructureType::SigmaEnc, StructureType::SigmaEncResp])?;

        Ok(Self { inner })
    }

    pub fn parse(ty: StructureType, actor: Actor, buf: &[u8]) -> Result<Self, Error> {
        Self::from_structure(Structure::parse(ty, actor, buf)?)
    }

    pub fn structure(&self) -> &Structure {
        &self.inner
    }

    pub fn session_id(&self) -> Result<u32, Error> {
        self.inner.u32(self.fields().0)
    }

    pub fn counter(&self) -> Result<u32, Error> {
        self.inner.u32(self.fields().1)
    }

    pub fn payload(&self) -> Result<&[u8], Error> {
        self.inner.field(self.fields().2)
    }

    pub fn mac(&self) -> Result<[u8; MAC_LEN], Error> {
        array(&self.inner, self.fields().3)
    }

    pub fn maced_bytes(&self) -> Result<Vec<u8>, Error> {
        self.inner.bytes_before(self.fields().3)
    }
}

/// View over CERTIFICATE_RESP
#[derive(Clone, Debug)]
pub struct CertificateResponse {
    inner: Structure,
}

impl CertificateResponse {
    pub fn parse(actor: Actor, buf: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: Structure::parse(StructureType::CertificateResp, actor, buf)?,
        })
    }

    /// The DER certificates, leaf first
    pub fn certificates(&self) -> Result<Vec<&[u8]>, Error> {
        split_der_chain(self.inner.field(F::CertificateRespCertificate)?)
    }
}

/// View over CREATE_ATTESTATION_SUBKEY_RSP
#[derive(Clone, Debug)]
pub struct SubkeyResponse {
    inner: Structure,
}

impl SubkeyResponse {
    pub fn parse(actor: Actor, buf: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: Structure::parse(StructureType::CreateAttestationSubkeyRsp, actor, buf)?,
        })
    }

    pub fn structure(&self) -> &Structure {
        &self.inner
    }

    pub fn nonce(&self) -> Result<[u8; NONCE_LEN], Error> {
        array(&self.inner, F::CreateAttestationSubkeyRspVerifierNonce)
    }

    pub fn subkey_id(&self) -> Result<u32, Error> {
        self.inner.u32(F::CreateAttestationSubkeyRspSubkeyId)
    }

    pub fn certificates(&self) -> Result<Vec<&[u8]>, Error> {
        split_der_chain(self.inner.field(F::CreateAttestationSubkeyRspCertificate)?)
    }
}

/// View over GET_MEASUREMENT_RSP
#[derive(Clone, Debug)]
pub struct MeasurementResponse {
    inner: Structure,
}

impl MeasurementResponse {
    pub fn parse(actor: Actor, buf: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: Structure::parse(StructureType::GetMeasurementRsp, actor, buf)?,
        })
    }

    pub fn structure(&self) -> &Structure {
        &self.inner
    }

    pub fn nonce(&self) -> Result<[u8; NONCE_LEN], Error> {
        array(&self.inner, F::GetMeasurementRspVerifierNonce)
    }

    pub fn record_count(&self) -> Result<u16, Error> {
        self.inner.u16(F::GetMeasurementRspRecordCount)
    }

    pub fn records(&self) -> Result<&[u8], Error> {
        self.inner.field(F::GetMeasurementRspRecords)
    }
}

/// Split a concatenation of DER-encoded certificates.  Each element must be a
/// SEQUENCE; definite short and long form lengths up to 4 bytes are
/// supported.
pub fn split_der_chain(blob: &[u8]) -> Result<Vec<&[u8]>, Error> {
    let mut c = SafeCursor::new(blob);
    let mut certs = vec![];

    while c.remaining() > 0 {
        let start = c.position();

        let tag = c.get_u8()?;
        if tag != DER_SEQUENCE {
            return Err(Error::StructureValidation(format!(
                "certificate at offset {start}: expecting SEQUENCE, got tag {tag:#04x}"
            )));
        }

        let first = c.get_u8()?;
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let n = (first & 0x7f) as usize;

            if n == 0 || n > 4 {
                return Err(Error::StructureValidation(format!(
                    "certificate at offset {start}: unsupported length encoding {first:#04x}"
                )));
            }

            c.get_bytes(n)?
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize)
        };

        c.skip(len).map_err(|_| Error::BufferUnderrun {
            remaining: c.remaining(),
            requested: len,
        })?;

        certs.push(&blob[start..c.position()]);
    }

    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::structure::{StructureBuilder, ECDSA_P384_SHA384_MAGIC};
    use hex_literal::hex;

    #[test]
    fn der_chain_short_and_long_form() {
        let blob = hex!(
            "3003 010203"
            "308103 040506"
            "30820002 0708"
        );

        let certs = split_der_chain(&blob).unwrap();

        assert_eq!(certs.len(), 3);
        assert_eq!(certs[0], &hex!("3003010203"));
        assert_eq!(certs[1], &hex!("308103040506"));
        assert_eq!(certs[2], &hex!("308200020708"));
    }

    #[test]
    fn der_chain_rejects_garbage() {
        assert!(matches!(
            split_der_chain(&hex!("3103010203")),
            Err(Error::StructureValidation(_))
        ));
        assert!(matches!(
            split_der_chain(&hex!("300501")),
            Err(Error::BufferUnderrun { .. })
        ));
        assert!(matches!(
            split_der_chain(&hex!("3080")),
            Err(Error::StructureValidation(_))
        ));
        assert!(split_der_chain(&[]).unwrap().is_empty());
    }

    #[test]
    fn m2_nested_signature() {
        let sig = StructureBuilder::new(StructureType::EcdsaSignature)
            .with_field(F::EcdsaSignatureR, &[1u8; 48])
            .unwrap()
            .with_field(F::EcdsaSignatureS, &[2u8; 48])
            .unwrap()
            .finish(Actor::Firmware)
            .to_bytes();

        assert_eq!(&sig[..4], &ECDSA_P384_SHA384_MAGIC.to_le_bytes());

        let m2 = StructureBuilder::new(StructureType::SigmaM2)
            .with_u32(F::SigmaM2SdmSessionId, 7)
            .unwrap()
            .with_field(F::SigmaM2DeviceUniqueId, &hex!("0011223344556677"))
            .unwrap()
            .with_field(F::SigmaM2Signature, &sig)
            .unwrap()
            .finish(Actor::Firmware)
            .to_bytes();

        let v = SigmaM2::parse(Actor::Firmware, &m2).unwrap();

        assert_eq!(v.sdm_session_id().unwrap(), 7);
        assert_eq!(v.device_unique_id().unwrap(), hex!("0011223344556677"));

        let s = v.signature().unwrap();
        assert_eq!(s.r, [1u8; 48]);
        assert_eq!(s.s, [2u8; 48]);

        // the MAC covers everything but itself; the signature stops short of
        // its own length field
        assert_eq!(v.maced_bytes().unwrap().len(), m2.len() - MAC_LEN);
        assert_eq!(
            v.signed_bytes().unwrap().len(),
            m2.len() - MAC_LEN - sig.len() - 4
        );
    }

    #[test]
    fn sigma_enc_view_for_both_directions() {
        for ty in [StructureType::SigmaEnc, StructureType::SigmaEncResp] {
            let (sid, ctr, payload) = match ty {
                StructureType::SigmaEnc => (
                    F::SigmaEncSdmSessionId,
                    F::SigmaEncMessageCounter,
                    F::SigmaEncPayload,
                ),
                _ => (
                    F::SigmaEncRespSdmSessionId,
                    F::SigmaEncRespMessageCounter,
                    F::SigmaEncRespPayload,
                ),
            };

            let buf = StructureBuilder::new(ty)
                .with_u32(sid, 0x11)
                .unwrap()
                .with_u32(ctr, 3)
                .unwrap()
                .with_field(payload, &[9, 9, 9])
                .unwrap()
                .finish(Actor::Firmware)
                .to_bytes();

            let v = SigmaEnc::parse(ty, Actor::Firmware, &buf).unwrap();

            assert_eq!(v.session_id().unwrap(), 0x11);
            assert_eq!(v.counter().unwrap(), 3);
            assert_eq!(v.payload().unwrap(), &[9, 9, 9]);
            assert_eq!(v.maced_bytes().unwrap().len(), buf.len() - MAC_LEN);
        }
    }

    #[test]
    fn sigma_enc_view_rejects_other_types() {
        let s = StructureBuilder::new(StructureType::SigmaTeardown).finish(Actor::Service);

        assert!(SigmaEnc::from_structure(s).is_err());
    }

    #[test]
    fn measurement_response() {
        let buf = StructureBuilder::new(StructureType::GetMeasurementRsp)
            .with_field(F::GetMeasurementRspVerifierNonce, &[7u8; 32])
            .unwrap()
            .with_u16(F::GetMeasurementRspRecordCount, 2)
            .unwrap()
            .with_field(F::GetMeasurementRspRecords, &hex!("aabbccdd"))
            .unwrap()
            .finish(Actor::Firmware)
            .to_bytes();

        let m = MeasurementResponse::parse(Actor::Firmware, &buf).unwrap();

        assert_eq!(m.nonce().unwrap(), [7u8; 32]);
        assert_eq!(m.record_count().unwrap(), 2);
        assert_eq!(m.records().unwrap(), &hex!("aabbccdd"));
    }
}
