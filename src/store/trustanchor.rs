// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use serde::de::Error as _;
use serde::Deserialize;

/// A trusted root certificate
#[derive(Clone, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Root {
    /// Free-form name used in log messages
    #[serde(default)]
    pub label: Option<String>,

    /// The root certificate, PEM encoded as described in §5.1 of RFC7468
    pub certificate: String,
}

/// A revoked device
#[serde_with::serde_as]
#[derive(Clone, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Revocation {
    /// The 8-byte device unique id reported in SIGMA M2, hex encoded
    #[serde(rename(deserialize = "device-id"))]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub device_id: [u8; 8],

    #[serde(default)]
    pub reason: Option<String>,
}

/// The JSON layout of a trust anchor file
#[derive(Clone, Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct TrustAnchors {
    #[serde(default)]
    pub roots: Vec<Root>,

    #[serde(default)]
    pub revoked: Vec<Revocation>,
}

impl TrustAnchors {
    /// Only a JSON object is accepted at the top level
    pub fn parse(j: &str) -> Result<Self, serde_json::Error> {
        let v: serde_json::Value = serde_json::from_str(j)?;

        if !v.is_object() {
            return Err(serde_json::Error::custom(
                "trust anchors must be a JSON object",
            ));
        }

        serde_json::from_value(v)
    }
}
