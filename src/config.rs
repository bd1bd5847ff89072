// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::codec::ByteOrder;
use crate::crypto::CryptoProvider;
use serde::de::Error as _;
use serde::Deserialize;
use serde_json::Error;

const MAX_CLIENT_ID: u8 = 0xf;

/// Verifier settings.  Every key is optional in the JSON form.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Cryptographic backend
    pub provider: CryptoProvider,

    /// Value of the CLIENT field in every command header (4 bits)
    pub client_id: u8,

    /// Byte order of the IV length prefix in encrypted payloads
    pub iv_length_order: ByteOrder,

    /// Whether the device unique id is checked against the revocation list
    pub check_revocation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: CryptoProvider::OpenSsl,
            client_id: 1,
            iv_length_order: ByteOrder::BigEndian,
            check_revocation: true,
        }
    }
}

impl Config {
    pub fn load_json(j: &str) -> Result<Self, Error> {
        let v: serde_json::Value = serde_json::from_str(j)?;

        if !v.is_object() {
            return Err(Error::custom("configuration must be a JSON object"));
        }

        let c: Config = serde_json::from_value(v)?;

        if c.client_id > MAX_CLIENT_ID {
            return Err(Error::custom(format!(
                "client-id {} does not fit in 4 bits",
                c.client_id
            )));
        }

        Ok(c)
    }
}
