// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::cursor::SafeCursor;
use super::endianness::{conversion, swap, Actor, Conversion};
use super::errors::Error;
use openssl::sha::sha384;
use std::fmt;
use std::str::FromStr;

use self::FieldKind::*;

/// Shape of a single field on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    U16,
    U32,
    /// Opaque fixed-size bytes, never byte-order converted
    Bytes(usize),
    /// Fixed-size array of 32-bit words, converted word by word
    Words(usize),
    /// Opaque variable-size bytes whose length is held in the named field
    Blob(StructureField),
    /// Variable-size array of 32-bit words whose length (in bytes) is held in
    /// the named field
    WordBlob(StructureField),
}

impl FieldKind {
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            U16 => Some(2),
            U32 => Some(4),
            Bytes(n) | Words(n) => Some(*n),
            Blob(_) | WordBlob(_) => None,
        }
    }
}

macro_rules! structures {
    ($(
        $sty:ident = $sname:literal {
            $($field:ident = $fname:literal : $kind:expr),+ $(,)?
        }
    )+) => {
        /// Identifies a wire message shape
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum StructureType {
            $($sty),+
        }

        /// Identifies one field slot of a [`StructureType`]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum StructureField {
            $($($field),+),+
        }

        impl StructureType {
            pub const ALL: &'static [StructureType] = &[$(StructureType::$sty),+];

            pub fn name(&self) -> &'static str {
                match self {
                    $(StructureType::$sty => $sname),+
                }
            }

            /// The fields of the structure, in wire order
            pub fn fields(&self) -> &'static [StructureField] {
                match self {
                    $(StructureType::$sty => &[$(StructureField::$field),+]),+
                }
            }
        }

        impl StructureField {
            pub fn name(&self) -> &'static str {
                match self {
                    $($(StructureField::$field => $fname),+),+
                }
            }

            pub fn structure(&self) -> StructureType {
                match self {
                    $($(StructureField::$field => StructureType::$sty),+),+
                }
            }

            pub fn kind(&self) -> FieldKind {
                match self {
                    $($(StructureField::$field => $kind),+),+
                }
            }
        }
    };
}

structures! {
    SigmaM1 = "SIGMA_M1" {
        SigmaM1ReservedHeader = "RESERVED_HEADER": U32,
        SigmaM1Magic = "MAGIC": U32,
        SigmaM1VerifierDhPubkey = "VERIFIER_DH_PUBKEY": Bytes(96),
    }
    SigmaM2 = "SIGMA_M2" {
        SigmaM2ReservedHeader = "RESERVED_HEADER": U32,
        SigmaM2Magic = "MAGIC": U32,
        SigmaM2SdmSessionId = "SDM_SESSION_ID": U32,
        SigmaM2DeviceUniqueId = "DEVICE_UNIQUE_ID": Words(8),
        SigmaM2RomVersion = "ROM_VERSION": U32,
        SigmaM2FwBuildId = "FW_BUILD_ID": Words(28),
        SigmaM2FwSecurityVersion = "FW_SECURITY_VERSION": U32,
        SigmaM2PublicEfuseValuesLen = "PUBLIC_EFUSE_VALUES_LEN": U32,
        SigmaM2PublicEfuseValues = "PUBLIC_EFUSE_VALUES":
            WordBlob(StructureField::SigmaM2PublicEfuseValuesLen),
        SigmaM2DeviceDhPubkey = "DEVICE_DH_PUBKEY": Bytes(96),
        SigmaM2VerifierDhPubkey = "VERIFIER_DH_PUBKEY": Bytes(96),
        SigmaM2SignatureLen = "SIGNATURE_LEN": U32,
        SigmaM2Signature = "SIGNATURE": Blob(StructureField::SigmaM2SignatureLen),
        SigmaM2Mac = "MAC": Bytes(48),
    }
    EcdsaSignature = "ECDSA_SIGNATURE" {
        EcdsaSignatureMagic = "MAGIC": U32,
        EcdsaSignatureR = "R": Bytes(48),
        EcdsaSignatureS = "S": Bytes(48),
    }
    SigmaEnc = "SIGMA_ENC" {
        SigmaEncReservedHeader = "RESERVED_HEADER": U32,
        SigmaEncMagic = "MAGIC": U32,
        SigmaEncSdmSessionId = "SDM_SESSION_ID": U32,
        SigmaEncMessageCounter = "MESSAGE_COUNTER": U32,
        SigmaEncPayloadLen = "PAYLOAD_LEN": U32,
        SigmaEncPayload = "PAYLOAD": Blob(StructureField::SigmaEncPayloadLen),
        SigmaEncMac = "MAC": Bytes(48),
    }
    SigmaEncResp = "SIGMA_ENC_RESP" {
        SigmaEncRespReservedHeader = "RESERVED_HEADER": U32,
        SigmaEncRespMagic = "MAGIC": U32,
        SigmaEncRespSdmSessionId = "SDM_SESSION_ID": U32,
        SigmaEncRespMessageCounter = "MESSAGE_COUNTER": U32,
        SigmaEncRespPayloadLen = "PAYLOAD_LEN": U32,
        SigmaEncRespPayload = "PAYLOAD": Blob(StructureField::SigmaEncRespPayloadLen),
        SigmaEncRespMac = "MAC": Bytes(48),
    }
    SigmaTeardown = "SIGMA_TEARDOWN" {
        SigmaTeardownReservedHeader = "RESERVED_HEADER": U32,
        SigmaTeardownMagic = "MAGIC": U32,
        SigmaTeardownSdmSessionId = "SDM_SESSION_ID": U32,
    }
    GetCertificate = "GET_CERTIFICATE" {
        GetCertificateReservedHeader = "RESERVED_HEADER": U32,
        GetCertificateRequest = "CERTIFICATE_REQUEST": U32,
    }
    CertificateResp = "CERTIFICATE_RESP" {
        CertificateRespReservedHeader = "RESERVED_HEADER": U32,
        CertificateRespCertificateLen = "CERTIFICATE_LEN": U32,
        CertificateRespCertificate = "CERTIFICATE":
            Blob(StructureField::CertificateRespCertificateLen),
    }
    CreateAttestationSubkey = "CREATE_ATTESTATION_SUBKEY" {
        CreateAttestationSubkeyReservedHeader = "RESERVED_HEADER": U32,
        CreateAttestationSubkeyCfgId = "CFG_ID": U32,
        CreateAttestationSubkeyVerifierNonce = "VERIFIER_NONCE": Bytes(32),
    }
    CreateAttestationSubkeyRsp = "CREATE_ATTESTATION_SUBKEY_RSP" {
        CreateAttestationSubkeyRspReservedHeader = "RESERVED_HEADER": U32,
        CreateAttestationSubkeyRspMagic = "MAGIC": U32,
        CreateAttestationSubkeyRspVerifierNonce = "VERIFIER_NONCE": Bytes(32),
        CreateAttestationSubkeyRspSubkeyId = "SUBKEY_ID": U32,
        CreateAttestationSubkeyRspCertificateLen = "CERTIFICATE_LEN": U32,
        CreateAttestationSubkeyRspCertificate = "CERTIFICATE":
            Blob(StructureField::CreateAttestationSubkeyRspCertificateLen),
    }
    GetMeasurement = "GET_MEASUREMENT" {
        GetMeasurementReservedHeader = "RESERVED_HEADER": U32,
        GetMeasurementSubkeyId = "SUBKEY_ID": U32,
        GetMeasurementVerifierNonce = "VERIFIER_NONCE": Bytes(32),
    }
    GetMeasurementRsp = "GET_MEASUREMENT_RSP" {
        GetMeasurementRspReservedHeader = "RESERVED_HEADER": U32,
        GetMeasurementRspMagic = "MAGIC": U32,
        GetMeasurementRspVerifierNonce = "VERIFIER_NONCE": Bytes(32),
        GetMeasurementRspRecordCount = "RECORD_COUNT": U16,
        GetMeasurementRspReserved = "RESERVED": U16,
        GetMeasurementRspRecordsLen = "RECORDS_LEN": U32,
        GetMeasurementRspRecords = "RECORDS": Blob(StructureField::GetMeasurementRspRecordsLen),
    }
}

pub const SIGMA_M1_MAGIC: u32 = 0x5349_4731;
pub const SIGMA_M2_MAGIC: u32 = 0x5349_4732;
pub const ECDSA_P384_SHA384_MAGIC: u32 = 0x7488_1520;
pub const SIGMA_ENC_MAGIC: u32 = 0x5349_4745;
pub const SIGMA_ENC_RESP_MAGIC: u32 = 0x5349_4752;
pub const SIGMA_TEARDOWN_MAGIC: u32 = 0x5349_4754;
pub const SUBKEY_RSP_MAGIC: u32 = 0x4153_4b32;
pub const SUBKEY_RSP_LEGACY_MAGIC: u32 = 0x4153_4b31;
pub const MEASUREMENT_RSP_MAGIC: u32 = 0x4d45_4153;

impl StructureType {
    /// The magic-number field of the structure and its allowed values.  The
    /// first allowed value is the one written by [`StructureBuilder::new`].
    pub fn magic(&self) -> Option<(StructureField, &'static [u32])> {
        use StructureField as F;

        match self {
            StructureType::SigmaM1 => Some((F::SigmaM1Magic, &[SIGMA_M1_MAGIC])),
            StructureType::SigmaM2 => Some((F::SigmaM2Magic, &[SIGMA_M2_MAGIC])),
            StructureType::EcdsaSignature => {
                Some((F::EcdsaSignatureMagic, &[ECDSA_P384_SHA384_MAGIC]))
            }
            StructureType::SigmaEnc => Some((F::SigmaEncMagic, &[SIGMA_ENC_MAGIC])),
            StructureType::SigmaEncResp => Some((F::SigmaEncRespMagic, &[SIGMA_ENC_RESP_MAGIC])),
            StructureType::SigmaTeardown => {
                Some((F::SigmaTeardownMagic, &[SIGMA_TEARDOWN_MAGIC]))
            }
            StructureType::CreateAttestationSubkeyRsp => Some((
                F::CreateAttestationSubkeyRspMagic,
                &[SUBKEY_RSP_MAGIC, SUBKEY_RSP_LEGACY_MAGIC],
            )),
            StructureType::GetMeasurementRsp => {
                Some((F::GetMeasurementRspMagic, &[MEASUREMENT_RSP_MAGIC]))
            }
            StructureType::GetCertificate
            | StructureType::CertificateResp
            | StructureType::CreateAttestationSubkey
            | StructureType::GetMeasurement => None,
        }
    }

    pub fn index_of(&self, field: StructureField) -> Result<usize, Error> {
        self.fields()
            .iter()
            .position(|f| *f == field)
            .ok_or_else(|| {
                Error::StructureValidation(format!("{field} is not a field of {self}"))
            })
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for StructureType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        StructureType::ALL
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| Error::StructureValidation(format!("unknown structure type {s}")))
    }
}

impl StructureField {
    /// Sensitive fields are hashed rather than printed by
    /// [`Structure::to_log_string`]
    pub fn is_sensitive(&self) -> bool {
        use StructureField as F;

        matches!(
            self,
            F::SigmaM2DeviceUniqueId
                | F::SigmaM2PublicEfuseValues
                | F::SigmaM2Mac
                | F::SigmaEncPayload
                | F::SigmaEncMac
                | F::SigmaEncRespPayload
                | F::SigmaEncRespMac
                | F::CreateAttestationSubkeyVerifierNonce
                | F::CreateAttestationSubkeyRspVerifierNonce
                | F::GetMeasurementVerifierNonce
                | F::GetMeasurementRspVerifierNonce
        )
    }

    /// The variable field whose length this field holds, if any
    pub fn length_of(&self) -> Option<StructureField> {
        self.structure()
            .fields()
            .iter()
            .find(|f| matches!(f.kind(), Blob(l) | WordBlob(l) if l == *self))
            .copied()
    }
}

impl fmt::Display for StructureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.structure().name(), self.name())
    }
}

/// Log-safe rendering of a sensitive value: a truncated SHA-384 digest
pub fn redacted(v: &[u8]) -> String {
    format!("sha384:{}", hex::encode(&sha384(v)[..8]))
}

fn encode_len(len_field: StructureField, n: usize) -> Result<Vec<u8>, Error> {
    let too_long = || Error::FieldLength {
        field: len_field.to_string(),
        expected: match len_field.kind() {
            U16 => u16::MAX as usize,
            _ => u32::MAX as usize,
        },
        actual: n,
    };

    match len_field.kind() {
        U16 => Ok(u16::try_from(n).map_err(|_| too_long())?.to_be_bytes().to_vec()),
        U32 => Ok(u32::try_from(n).map_err(|_| too_long())?.to_be_bytes().to_vec()),
        k => Err(Error::StructureValidation(format!(
            "{len_field} cannot hold a length (kind {k:?})"
        ))),
    }
}

fn decode_len(len_field: StructureField, v: &[u8]) -> Result<usize, Error> {
    match (len_field.kind(), v.len()) {
        (U16, 2) => Ok(u16::from_be_bytes([v[0], v[1]]) as usize),
        (U32, 4) => Ok(u32::from_be_bytes([v[0], v[1], v[2], v[3]]) as usize),
        (k, _) => Err(Error::StructureValidation(format!(
            "{len_field} cannot hold a length (kind {k:?})"
        ))),
    }
}

/// Mutable accumulator for one structure.  Values are given in service order;
/// [`StructureBuilder::finish`] consumes the builder and yields the immutable,
/// wire-ready [`Structure`] for a given actor.
#[derive(Clone, Debug)]
pub struct StructureBuilder {
    ty: StructureType,
    values: Vec<Vec<u8>>,
}

impl StructureBuilder {
    /// Fixed-size fields start zeroed, variable fields empty and the magic
    /// field (if any) set to its preferred value.
    pub fn new(ty: StructureType) -> Self {
        let mut values: Vec<Vec<u8>> = ty
            .fields()
            .iter()
            .map(|f| vec![0u8; f.kind().fixed_len().unwrap_or(0)])
            .collect();

        if let Some((field, allowed)) = ty.magic() {
            if let (Ok(i), Some(m)) = (ty.index_of(field), allowed.first()) {
                values[i] = m.to_be_bytes().to_vec();
            }
        }

        Self { ty, values }
    }

    pub fn structure_type(&self) -> StructureType {
        self.ty
    }

    /// Set the raw value of `field`.  Fixed-size fields must be given exactly
    /// their size; setting a variable field also updates its length field.
    /// Length fields themselves cannot be written.
    pub fn with_field(mut self, field: StructureField, v: &[u8]) -> Result<Self, Error> {
        let i = self.ty.index_of(field)?;

        if let Some(blob) = field.length_of() {
            return Err(Error::StructureValidation(format!(
                "{field} is derived from {blob} and cannot be set"
            )));
        }

        match field.kind() {
            U16 | U32 | Bytes(_) | Words(_) => {
                let expected = field.kind().fixed_len().unwrap_or(0);

                if v.len() != expected {
                    return Err(Error::FieldLength {
                        field: field.to_string(),
                        expected,
                        actual: v.len(),
                    });
                }
            }
            Blob(len_field) | WordBlob(len_field) => {
                if matches!(field.kind(), WordBlob(_)) && v.len() % 4 != 0 {
                    return Err(Error::FieldLength {
                        field: field.to_string(),
                        expected: v.len().next_multiple_of(4),
                        actual: v.len(),
                    });
                }

                let j = self.ty.index_of(len_field)?;
                self.values[j] = encode_len(len_field, v.len())?;
            }
        }

        self.values[i] = v.to_vec();

        Ok(self)
    }

    pub fn with_u32(self, field: StructureField, v: u32) -> Result<Self, Error> {
        self.with_field(field, &v.to_be_bytes())
    }

    pub fn with_u16(self, field: StructureField, v: u16) -> Result<Self, Error> {
        self.with_field(field, &v.to_be_bytes())
    }

    pub fn finish(self, actor: Actor) -> Structure {
        Structure {
            ty: self.ty,
            actor,
            values: self.values,
        }
    }
}

/// An immutable structure value.  Field values are held in service order and
/// converted for the structure's actor when serialised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Structure {
    ty: StructureType,
    actor: Actor,
    values: Vec<Vec<u8>>,
}

impl Structure {
    /// Parse the wire bytes produced by (or destined to) `actor`
    pub fn parse(ty: StructureType, actor: Actor, buf: &[u8]) -> Result<Structure, Error> {
        let fields = ty.fields();
        let parse_err = |e: Error| Error::Parse {
            structure: ty.name(),
            source: Box::new(e),
        };

        let mut c = SafeCursor::new(buf);
        let mut values: Vec<Vec<u8>> = Vec::with_capacity(fields.len());

        for (i, field) in fields.iter().enumerate() {
            let raw = match field.kind() {
                U16 => c.get_bytes(2),
                U32 => c.get_bytes(4),
                Bytes(n) | Words(n) => c.get_bytes(n),
                Blob(len_field) | WordBlob(len_field) => {
                    let j = ty.index_of(len_field)?;
                    let declared = values
                        .get(j)
                        .ok_or_else(|| {
                            Error::StructureValidation(format!(
                                "{len_field} must precede {field}"
                            ))
                        })
                        .and_then(|v| decode_len(len_field, v))?;

                    if matches!(field.kind(), WordBlob(_)) && declared % 4 != 0 {
                        return Err(Error::StructureValidation(format!(
                            "{field}: length {declared} is not a multiple of 4"
                        )));
                    }

                    if i + 1 == fields.len() {
                        c.get_exact(declared)
                    } else {
                        c.get_bytes(declared)
                    }
                }
            }
            .map_err(parse_err)?;

            values.push(match conversion(ty, actor, *field) {
                Conversion::Convert => swap(field.kind(), raw),
                Conversion::None => raw.to_vec(),
            });
        }

        if c.remaining() != 0 {
            return Err(parse_err(Error::LengthMismatch {
                remaining: c.remaining(),
                expected: 0,
            }));
        }

        let s = Structure { ty, actor, values };

        s.validate()?;

        Ok(s)
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some((field, allowed)) = self.ty.magic() {
            let m = self.u32(field)?;

            if !allowed.contains(&m) {
                let allowed = allowed
                    .iter()
                    .map(|a| format!("{a:#010x}"))
                    .collect::<Vec<_>>()
                    .join(", ");

                return Err(Error::StructureValidation(format!(
                    "{field}: invalid value {m:#010x}, expecting one of [{allowed}]"
                )));
            }
        }

        Ok(())
    }

    pub fn structure_type(&self) -> StructureType {
        self.ty
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    /// The value of `field` in service order
    pub fn field(&self, field: StructureField) -> Result<&[u8], Error> {
        let i = self.ty.index_of(field)?;

        Ok(&self.values[i])
    }

    pub fn u32(&self, field: StructureField) -> Result<u32, Error> {
        let v = self.field(field)?;

        let b: [u8; 4] = v.try_into().map_err(|_| Error::FieldLength {
            field: field.to_string(),
            expected: 4,
            actual: v.len(),
        })?;

        Ok(u32::from_be_bytes(b))
    }

    pub fn u16(&self, field: StructureField) -> Result<u16, Error> {
        let v = self.field(field)?;

        let b: [u8; 2] = v.try_into().map_err(|_| Error::FieldLength {
            field: field.to_string(),
            expected: 2,
            actual: v.len(),
        })?;

        Ok(u16::from_be_bytes(b))
    }

    fn wire_bytes(&self, fields: &[StructureField], values: &[Vec<u8>]) -> Vec<u8> {
        fields
            .iter()
            .zip(values.iter())
            .flat_map(|(f, v)| match conversion(self.ty, self.actor, *f) {
                Conversion::Convert => swap(f.kind(), v),
                Conversion::None => v.clone(),
            })
            .collect()
    }

    /// Wire bytes: all fields in order, converted for the actor
    pub fn to_bytes(&self) -> Vec<u8> {
        self.wire_bytes(self.ty.fields(), &self.values)
    }

    /// Wire bytes of every field preceding `field`
    pub fn bytes_before(&self, field: StructureField) -> Result<Vec<u8>, Error> {
        let i = self.ty.index_of(field)?;

        Ok(self.wire_bytes(&self.ty.fields()[..i], &self.values[..i]))
    }

    /// One-line rendering for logs; sensitive fields are replaced by a
    /// truncated SHA-384 digest.
    pub fn to_log_string(&self) -> String {
        let fields = self
            .ty
            .fields()
            .iter()
            .zip(self.values.iter())
            .map(|(f, v)| {
                let rendered = if f.is_sensitive() {
                    redacted(v)
                } else {
                    match f.kind() {
                        U16 | U32 => format!("0x{}", hex::encode(v)),
                        _ => hex::encode(v),
                    }
                };

                format!("{}: {}", f.name(), rendered)
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!("{} ({}) {{ {} }}", self.ty, self.actor, fields)
    }
}
