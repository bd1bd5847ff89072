// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::session::{HandshakeState, KeyMaterial, PeerInfo, SessionContext};
use super::transport::Transport;
use crate::codec::{
    self, decode_response, encode_request, Actor, CertificateResponse, CommandCode,
    MeasurementResponse, SigmaEnc, SigmaM2, Structure, StructureBuilder, StructureField as F,
    StructureType, SubkeyResponse, NONCE_LEN,
};
use crate::config::Config;
use crate::crypto::{compute_mac, verify_ecdsa_p384, verify_mac, EphemeralKey};
use crate::store::ITrustAnchorStore;
use bitmask::*;
use openssl::x509::X509;
use tracing::{debug, info, warn};

/// CERTIFICATE_REQUEST value selecting the device attestation chain
pub const DEVICE_ATTESTATION_CHAIN: u32 = 0x01;

const TXN_ID_MASK: u8 = 0xf;

bitmask! {
    #[derive(Debug)]
    mask ChecksSet: u8 where flags Checks {
        DhKey     = 0x01,
        Mac       = 0x02,
        Signature = 0x04,
    }
}

/// Drives one SIGMA session with one device.
///
/// The session owns its transport and borrows the trust anchor store.  All
/// exchanges are strictly sequential; any failure moves the session to
/// [`HandshakeState::Failed`] and drops the keys.  A new handshake can then
/// be started with [`SigmaSession::establish`].
pub struct SigmaSession<'a, T, S> {
    transport: T,
    store: &'a S,
    config: Config,
    state: HandshakeState,
    ctx: Option<SessionContext>,
    txn_id: u8,
}

impl<'a, T: Transport, S: ITrustAnchorStore> SigmaSession<'a, T, S> {
    pub fn new(transport: T, store: &'a S, config: Config) -> Self {
        Self {
            transport,
            store,
            config,
            state: HandshakeState::Init,
            ctx: None,
            txn_id: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The live session context, present only while the session is active
    pub fn context(&self) -> Option<&SessionContext> {
        self.ctx.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn transition(&mut self, to: HandshakeState) {
        debug!("SIGMA state {} -> {}", self.state, to);
        self.state = to;
    }

    fn require(&self, operation: &'static str, allowed: &[HandshakeState]) -> Result<(), Error> {
        if !allowed.contains(&self.state) {
            return Err(Error::InvalidState {
                operation,
                state: self.state,
            });
        }

        Ok(())
    }

    // run `f`, failing the whole session if it does not succeed
    fn guard<R>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        f(self).map_err(|e| {
            warn!("{operation} failed in state {}: {e}", self.state);
            self.ctx = None;
            self.transition(HandshakeState::Failed);
            e
        })
    }

    fn next_txn_id(&mut self) -> u8 {
        let id = self.txn_id;
        self.txn_id = (self.txn_id + 1) & TXN_ID_MASK;
        id
    }

    fn command(&mut self, code: CommandCode, body: &[u8]) -> Result<Vec<u8>, Error> {
        let id = self.next_txn_id();
        let request = encode_request(code, id, self.config.client_id, body)?;

        let response = self
            .transport
            .send_and_receive(&request)
            .map_err(|e| Error::Transport(format!("{code}: {e}")))?;

        Ok(decode_response(&response, code.name())?.body)
    }

    /// Run the full handshake.  Allowed from INIT, FAILED and TORN_DOWN.
    pub fn establish(&mut self) -> Result<(), Error> {
        self.require(
            "establish",
            &[
                HandshakeState::Init,
                HandshakeState::Failed,
                HandshakeState::TornDown,
            ],
        )?;

        self.ctx = None;
        if self.state != HandshakeState::Init {
            self.transition(HandshakeState::Init);
        }

        self.guard("establish", |s| s.handshake())
    }

    fn handshake(&mut self) -> Result<(), Error> {
        let provider = self.config.provider;

        let chain = self.get_certificate_chain()?;

        let local = EphemeralKey::generate(&provider)?;
        let local_public = local.public_bytes()?;

        let m1 = StructureBuilder::new(StructureType::SigmaM1)
            .with_field(F::SigmaM1VerifierDhPubkey, &local_public)?
            .finish(Actor::Firmware);
        debug!("sending {}", m1.to_log_string());

        let body = self.command(CommandCode::SigmaM1, &m1.to_bytes())?;
        let m2 = SigmaM2::parse(Actor::Firmware, &body)?;
        debug!("received {}", m2.structure().to_log_string());

        self.transition(HandshakeState::DhEstablished);

        let mut checks = ChecksSet::none();

        if m2.verifier_dh_pubkey()? != local_public {
            return Err(Error::DhKeyMismatch(
                "M2 does not echo the verifier key sent in M1".to_string(),
            ));
        }
        checks.set(Checks::DhKey);

        let remote_public = m2.device_dh_pubkey()?;
        let secret = local
            .shared_secret(&remote_public)
            .map_err(|e| Error::Handshake(format!("shared secret computation failed: {e}")))?;
        let keys = KeyMaterial::derive(&provider, &secret)?;

        self.transition(HandshakeState::KeysDerived);

        if !verify_mac(&provider, keys.pmk(), &m2.maced_bytes()?, &m2.mac()?)? {
            return Err(Error::MacMismatch("SIGMA_M2.MAC".to_string()));
        }
        checks.set(Checks::Mac);

        self.verify_signature(&m2, &chain)?;
        checks.set(Checks::Signature);

        let mandatory_checks = [
            (Checks::DhKey, "DH key consistency"),
            (Checks::Mac, "M2 MAC"),
            (Checks::Signature, "M2 signature"),
        ];

        for (c, n) in mandatory_checks.iter() {
            if !checks.contains(*c) {
                return Err(Error::Handshake(format!("{n} not verified")));
            }
        }

        let peer = PeerInfo {
            remote_public,
            session_id: m2.sdm_session_id()?,
            device_id: m2.device_unique_id()?,
        };

        self.ctx = Some(SessionContext::new(
            local,
            peer,
            keys,
            provider,
            self.config.iv_length_order,
        )?);

        self.transition(HandshakeState::SessionActive);
        info!(
            "SIGMA session {:#x} established with device {}",
            peer.session_id,
            codec::redacted(&peer.device_id)
        );

        Ok(())
    }

    fn get_certificate_chain(&mut self) -> Result<Vec<X509>, Error> {
        let request = StructureBuilder::new(StructureType::GetCertificate)
            .with_u32(F::GetCertificateRequest, DEVICE_ATTESTATION_CHAIN)?
            .finish(Actor::Firmware);

        let body = self.command(CommandCode::GetCertificate, &request.to_bytes())?;
        let response = CertificateResponse::parse(Actor::Firmware, &body)?;

        let chain = response
            .certificates()?
            .into_iter()
            .map(|der| {
                X509::from_der(der)
                    .map_err(|e| Error::SignatureInvalid(format!("device certificate: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if chain.is_empty() {
            return Err(Error::SignatureInvalid(
                "device sent an empty certificate chain".to_string(),
            ));
        }

        debug!("device certificate chain has {} certificate(s)", chain.len());

        Ok(chain)
    }

    fn verify_signature(&self, m2: &SigmaM2, chain: &[X509]) -> Result<(), Error> {
        if !self.store.verify_chain(chain) {
            return Err(Error::SignatureInvalid(
                "certificate chain does not lead to a trusted root".to_string(),
            ));
        }

        let device_id = m2.device_unique_id()?;

        if self.config.check_revocation && self.store.is_revoked(&device_id) {
            return Err(Error::SignatureInvalid(format!(
                "device {} is revoked",
                codec::redacted(&device_id)
            )));
        }

        let sig = m2
            .signature()
            .map_err(|e| Error::SignatureInvalid(format!("SIGMA_M2.SIGNATURE: {e}")))?;

        let key = chain[0]
            .public_key()
            .and_then(|k| k.ec_key())
            .map_err(|e| Error::SignatureInvalid(format!("leaf certificate key: {e}")))?;

        let ok = verify_ecdsa_p384(
            &self.config.provider,
            &key,
            &sig.r,
            &sig.s,
            &m2.signed_bytes()?,
        )
        .map_err(|e| Error::SignatureInvalid(e.to_string()))?;

        if !ok {
            return Err(Error::SignatureInvalid(
                "SIGMA_M2 signature does not verify".to_string(),
            ));
        }

        Ok(())
    }

    // Wrap `request` in SIGMA_ENC, send it and return the body of the inner
    // response frame
    fn exchange(&mut self, code: CommandCode, request: &Structure) -> Result<Vec<u8>, Error> {
        let provider = self.config.provider;
        let id = self.next_txn_id();
        let inner = encode_request(code, id, self.config.client_id, &request.to_bytes())?;
        debug!("sending {} over SIGMA_ENC", request.to_log_string());

        let enc = {
            let ctx = active(&mut self.ctx)?;

            let payload = ctx.cipher().encrypt(&inner)?;
            let counter = ctx.next_counter()?;

            let b = StructureBuilder::new(StructureType::SigmaEnc)
                .with_u32(F::SigmaEncSdmSessionId, ctx.session_id())?
                .with_u32(F::SigmaEncMessageCounter, counter)?
                .with_field(F::SigmaEncPayload, &payload)?;

            let maced = b.clone().finish(Actor::Firmware).bytes_before(F::SigmaEncMac)?;
            let mac = compute_mac(&provider, ctx.keys().smk(), &maced)?;

            b.with_field(F::SigmaEncMac, &mac)?.finish(Actor::Firmware)
        };

        let body = self.command(CommandCode::SigmaEnc, &enc.to_bytes())?;
        let response = SigmaEnc::parse(StructureType::SigmaEncResp, Actor::Firmware, &body)?;

        let ctx = active(&mut self.ctx)?;

        if response.session_id()? != ctx.session_id() {
            return Err(Error::Handshake(format!(
                "response for session {:#x}, expecting {:#x}",
                response.session_id()?,
                ctx.session_id()
            )));
        }

        if !verify_mac(
            &provider,
            ctx.keys().smk(),
            &response.maced_bytes()?,
            &response.mac()?,
        )? {
            return Err(Error::MacMismatch("SIGMA_ENC_RESP.MAC".to_string()));
        }

        ctx.accept_counter(response.counter()?)?;

        let inner = ctx.cipher().decrypt(response.payload()?)?;

        Ok(decode_response(&inner, code.name())?.body)
    }

    /// Ask the device for a new attestation subkey bound to `nonce`
    pub fn create_attestation_subkey(
        &mut self,
        cfg_id: u32,
        nonce: &[u8; NONCE_LEN],
    ) -> Result<SubkeyResponse, Error> {
        self.require("create_attestation_subkey", &[HandshakeState::SessionActive])?;

        self.guard("create_attestation_subkey", |s| {
            let request = StructureBuilder::new(StructureType::CreateAttestationSubkey)
                .with_u32(F::CreateAttestationSubkeyCfgId, cfg_id)?
                .with_field(F::CreateAttestationSubkeyVerifierNonce, nonce)?
                .finish(Actor::Firmware);

            let body = s.exchange(CommandCode::CreateAttestationSubkey, &request)?;
            let response = SubkeyResponse::parse(Actor::Firmware, &body)?;
            debug!("received {}", response.structure().to_log_string());

            if response.nonce()? != *nonce {
                return Err(Error::NonceMismatch(
                    "CREATE_ATTESTATION_SUBKEY_RSP.VERIFIER_NONCE".to_string(),
                ));
            }

            Ok(response)
        })
    }

    /// Fetch measurements signed with a previously created subkey
    pub fn get_measurement(
        &mut self,
        subkey_id: u32,
        nonce: &[u8; NONCE_LEN],
    ) -> Result<MeasurementResponse, Error> {
        self.require("get_measurement", &[HandshakeState::SessionActive])?;

        self.guard("get_measurement", |s| {
            let request = StructureBuilder::new(StructureType::GetMeasurement)
                .with_u32(F::GetMeasurementSubkeyId, subkey_id)?
                .with_field(F::GetMeasurementVerifierNonce, nonce)?
                .finish(Actor::Firmware);

            let body = s.exchange(CommandCode::GetMeasurement, &request)?;
            let response = MeasurementResponse::parse(Actor::Firmware, &body)?;
            debug!("received {}", response.structure().to_log_string());

            if response.nonce()? != *nonce {
                return Err(Error::NonceMismatch(
                    "GET_MEASUREMENT_RSP.VERIFIER_NONCE".to_string(),
                ));
            }

            Ok(response)
        })
    }

    /// Close the session.  The device must answer with an empty body.
    pub fn teardown(&mut self) -> Result<(), Error> {
        self.require("teardown", &[HandshakeState::SessionActive])?;

        self.guard("teardown", |s| {
            let session_id = active(&mut s.ctx)?.session_id();

            let request = StructureBuilder::new(StructureType::SigmaTeardown)
                .with_u32(F::SigmaTeardownSdmSessionId, session_id)?
                .finish(Actor::Firmware);

            let body = s.command(CommandCode::SigmaTeardown, &request.to_bytes())?;

            if !body.is_empty() {
                return Err(codec::Error::StructureValidation(format!(
                    "SIGMA_TEARDOWN: expecting empty response, got {} bytes",
                    body.len()
                ))
                .into());
            }

            s.ctx = None;
            s.transition(HandshakeState::TornDown);
            info!("SIGMA session {session_id:#x} torn down");

            Ok(())
        })
    }
}

fn active(ctx: &mut Option<SessionContext>) -> Result<&mut SessionContext, Error> {
    ctx.as_mut()
        .ok_or_else(|| Error::Handshake("no session context".to_string()))
}
