// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory device used by the handshake tests.  It plays the firmware side
//! of every command the verifier sends and can be told to misbehave.

use super::session::KeyMaterial;
use super::transport::{Transport, TransportError};
use crate::codec::{
    decode, encode, Actor, ByteOrder, CommandCode, SigmaEnc, Structure, StructureBuilder,
    StructureField as F, StructureType, STATUS_OK, STATUS_UNKNOWN_COMMAND,
};
use crate::crypto::{compute_mac, verify_mac, CryptoProvider, EphemeralKey, GcmCipher};
use openssl::ec::EcKey;
use openssl::ecdsa::EcdsaSig;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

const DEVICE_KEY: &[u8] = include_bytes!("../../testdata/device.key");
const DEVICE_CERT: &[u8] = include_bytes!("../../testdata/device.pem");
const ROOT_CERT: &[u8] = include_bytes!("../../testdata/root.pem");

pub const SUBKEY_ID: u32 = 0x55;
pub const RECORDS: &[u8] = b"\x01\x00\x00\x00measurement-record";

pub struct MockDevice {
    provider: CryptoProvider,
    attestation_key: EcKey<Private>,
    chain: Vec<u8>,
    keys: Option<KeyMaterial>,
    last_enc_response: Option<Vec<u8>>,

    pub device_id: [u8; 8],
    pub session_id: u32,

    pub tamper_m2_mac: bool,
    pub wrong_verifier_key: bool,
    pub invalid_device_key: bool,
    pub bad_signature: bool,
    pub tamper_enc_mac: bool,
    pub replay: bool,
    pub wrong_nonce: bool,
    pub link_down: bool,
    pub failing_command: Option<(CommandCode, u16)>,
    pub teardown_body: Vec<u8>,

    /// Command codes received so far, outer frames only
    pub received: Vec<u16>,
}

impl MockDevice {
    pub fn new() -> Self {
        let attestation_key = PKey::private_key_from_pem(DEVICE_KEY)
            .and_then(|k| k.ec_key())
            .unwrap();

        let mut chain = X509::from_pem(DEVICE_CERT).unwrap().to_der().unwrap();
        chain.extend(X509::from_pem(ROOT_CERT).unwrap().to_der().unwrap());

        Self {
            provider: CryptoProvider::OpenSsl,
            attestation_key,
            chain,
            keys: None,
            last_enc_response: None,
            device_id: [1, 2, 3, 4, 5, 6, 7, 8],
            session_id: 0x5e55,
            tamper_m2_mac: false,
            wrong_verifier_key: false,
            invalid_device_key: false,
            bad_signature: false,
            tamper_enc_mac: false,
            replay: false,
            wrong_nonce: false,
            link_down: false,
            failing_command: None,
            teardown_body: vec![],
            received: vec![],
        }
    }

    fn cipher(&self) -> Result<GcmCipher, TransportError> {
        let keys = self.keys.as_ref().ok_or("no session")?;

        Ok(GcmCipher::new()
            .with_key(keys.sek())?
            .with_provider(self.provider)
            .with_byte_order(ByteOrder::BigEndian))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let data = if self.bad_signature {
            b"something else".as_slice()
        } else {
            data
        };

        let sig = EcdsaSig::sign(&self.provider.sha384(data), &self.attestation_key)?;

        Ok(StructureBuilder::new(StructureType::EcdsaSignature)
            .with_field(F::EcdsaSignatureR, &sig.r().to_vec_padded(48)?)?
            .with_field(F::EcdsaSignatureS, &sig.s().to_vec_padded(48)?)?
            .finish(Actor::Firmware)
            .to_bytes())
    }

    fn certificate(&self) -> Result<Vec<u8>, TransportError> {
        Ok(StructureBuilder::new(StructureType::CertificateResp)
            .with_field(F::CertificateRespCertificate, &self.chain)?
            .finish(Actor::Firmware)
            .to_bytes())
    }

    fn m2(&mut self, m1: &[u8]) -> Result<Vec<u8>, TransportError> {
        let m1 = Structure::parse(StructureType::SigmaM1, Actor::Firmware, m1)?;
        let mut verifier_public: [u8; 96] = m1.field(F::SigmaM1VerifierDhPubkey)?.try_into()?;

        let dh = EphemeralKey::generate(&self.provider)?;
        let secret = dh.shared_secret(&verifier_public)?;
        let keys = KeyMaterial::derive(&self.provider, &secret)?;

        let mut device_public = dh.public_bytes()?;
        if self.invalid_device_key {
            device_public = [0xff; 96];
        }
        if self.wrong_verifier_key {
            verifier_public[0] ^= 1;
        }

        let b = StructureBuilder::new(StructureType::SigmaM2)
            .with_u32(F::SigmaM2SdmSessionId, self.session_id)?
            .with_field(F::SigmaM2DeviceUniqueId, &self.device_id)?
            .with_u32(F::SigmaM2RomVersion, 2)?
            .with_field(F::SigmaM2FwBuildId, &[0x3c; 28])?
            .with_u32(F::SigmaM2FwSecurityVersion, 1)?
            .with_field(F::SigmaM2PublicEfuseValues, &[0xef; 8])?
            .with_field(F::SigmaM2DeviceDhPubkey, &device_public)?
            .with_field(F::SigmaM2VerifierDhPubkey, &verifier_public)?;

        let signed = b.clone().finish(Actor::Firmware).bytes_before(F::SigmaM2SignatureLen)?;
        let b = b.with_field(F::SigmaM2Signature, &self.sign(&signed)?)?;

        let maced = b.clone().finish(Actor::Firmware).bytes_before(F::SigmaM2Mac)?;
        let mut mac = compute_mac(&self.provider, keys.pmk(), &maced)?;
        if self.tamper_m2_mac {
            mac[7] ^= 0x80;
        }

        self.keys = Some(keys);

        Ok(b.with_field(F::SigmaM2Mac, &mac)?
            .finish(Actor::Firmware)
            .to_bytes())
    }

    fn inner_response(&self, code: CommandCode, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        match code {
            CommandCode::CreateAttestationSubkey => {
                let req =
                    Structure::parse(StructureType::CreateAttestationSubkey, Actor::Firmware, body)?;
                let mut nonce = req.field(F::CreateAttestationSubkeyVerifierNonce)?.to_vec();
                if self.wrong_nonce {
                    nonce[0] ^= 1;
                }

                Ok(StructureBuilder::new(StructureType::CreateAttestationSubkeyRsp)
                    .with_field(F::CreateAttestationSubkeyRspVerifierNonce, &nonce)?
                    .with_u32(F::CreateAttestationSubkeyRspSubkeyId, SUBKEY_ID)?
                    .with_field(F::CreateAttestationSubkeyRspCertificate, &self.chain)?
                    .finish(Actor::Firmware)
                    .to_bytes())
            }
            CommandCode::GetMeasurement => {
                let req = Structure::parse(StructureType::GetMeasurement, Actor::Firmware, body)?;
                let mut nonce = req.field(F::GetMeasurementVerifierNonce)?.to_vec();
                if self.wrong_nonce {
                    nonce[0] ^= 1;
                }

                Ok(StructureBuilder::new(StructureType::GetMeasurementRsp)
                    .with_field(F::GetMeasurementRspVerifierNonce, &nonce)?
                    .with_u16(F::GetMeasurementRspRecordCount, 1)?
                    .with_field(F::GetMeasurementRspRecords, RECORDS)?
                    .finish(Actor::Firmware)
                    .to_bytes())
            }
            c => Err(format!("{c} cannot be sent over SIGMA_ENC").into()),
        }
    }

    fn enc_response(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.replay {
            if let Some(r) = &self.last_enc_response {
                return Ok(r.clone());
            }
        }

        let req = SigmaEnc::parse(StructureType::SigmaEnc, Actor::Firmware, request)?;
        let smk = self.keys.as_ref().ok_or("no session")?.smk().to_vec();

        if !verify_mac(&self.provider, &smk, &req.maced_bytes()?, &req.mac()?)? {
            return Err("bad SIGMA_ENC MAC".into());
        }

        let cipher = self.cipher()?;
        let inner = decode(&cipher.decrypt(req.payload()?)?)?;
        let code = CommandCode::from_code(inner.header.code).ok_or("unknown inner command")?;

        let inner_rsp = encode(
            STATUS_OK,
            inner.header.id,
            inner.header.client,
            &self.inner_response(code, &inner.body)?,
        )?;

        let b = StructureBuilder::new(StructureType::SigmaEncResp)
            .with_u32(F::SigmaEncRespSdmSessionId, req.session_id()?)?
            .with_u32(F::SigmaEncRespMessageCounter, req.counter()?)?
            .with_field(F::SigmaEncRespPayload, &cipher.encrypt(&inner_rsp)?)?;

        let maced = b.clone().finish(Actor::Firmware).bytes_before(F::SigmaEncRespMac)?;
        let mut mac = compute_mac(&self.provider, &smk, &maced)?;
        if self.tamper_enc_mac {
            mac[0] ^= 1;
        }

        let rsp = b
            .with_field(F::SigmaEncRespMac, &mac)?
            .finish(Actor::Firmware)
            .to_bytes();

        self.last_enc_response = Some(rsp.clone());

        Ok(rsp)
    }
}

impl Transport for MockDevice {
    fn send_and_receive(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.link_down {
            return Err("link down".into());
        }

        let frame = decode(request)?;
        self.received.push(frame.header.code);

        let reply = |code: u16, body: &[u8]| -> Result<Vec<u8>, TransportError> {
            Ok(encode(code, frame.header.id, frame.header.client, body)?)
        };

        let Some(command) = CommandCode::from_code(frame.header.code) else {
            return reply(STATUS_UNKNOWN_COMMAND, &[]);
        };

        if let Some((c, status)) = self.failing_command {
            if c == command {
                return reply(status, &[]);
            }
        }

        let body = match command {
            CommandCode::GetCertificate => self.certificate()?,
            CommandCode::SigmaM1 => self.m2(&frame.body)?,
            CommandCode::SigmaEnc => self.enc_response(&frame.body)?,
            CommandCode::SigmaTeardown => {
                Structure::parse(StructureType::SigmaTeardown, Actor::Firmware, &frame.body)?;
                self.keys = None;
                self.teardown_body.clone()
            }
            _ => return reply(STATUS_UNKNOWN_COMMAND, &[]),
        };

        reply(STATUS_OK, &body)
    }
}
