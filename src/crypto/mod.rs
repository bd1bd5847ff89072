// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Cryptographic primitives used by the SIGMA handshake, all backed by the
//! configured [`CryptoProvider`].

pub use self::ecdh::{public_key_from_raw, EphemeralKey, RAW_PUBKEY_LEN};
pub use self::errors::{Error, Setting};
pub use self::gcm::{GcmCipher, IV_LEN, KEY_LEN};
pub use self::kdf::{derive, derive_pmk, derive_sek, derive_smk, KdfLabel};
pub use self::provider::{CryptoProvider, GCM_TAG_LEN, SHA384_LEN};
pub use self::signature::{compute_mac, verify_ecdsa_p384, verify_mac};

mod ecdh;
mod errors;
mod gcm;
mod kdf;
mod provider;
mod signature;
