// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Wire codec for SDM mailbox messages: bounds-checked cursor, structure
//! definitions, per-actor byte-order handling and command framing.

pub use self::cursor::{ByteOrder, SafeCursor};
pub use self::endianness::{conversion, Actor, Conversion, EndiannessMap};
pub use self::errors::Error;
pub use self::frame::{decode, decode_response, encode, encode_request, CommandCode, Frame};
pub use self::header::{
    validate_status, CommandHeader, HEADER_LEN, STATUS_OK, STATUS_UNKNOWN_COMMAND,
};
pub use self::messages::{
    split_der_chain, CertificateResponse, EcdsaSignature, MeasurementResponse, SigmaEnc, SigmaM2,
    SubkeyResponse, DEVICE_ID_LEN, DH_PUBKEY_LEN, MAC_LEN, NONCE_LEN,
};
pub use self::structure::{
    redacted, FieldKind, Structure, StructureBuilder, StructureField, StructureType,
};

mod cursor;
mod endianness;
mod errors;
mod frame;
mod header;
mod messages;
mod structure;
