// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use openssl::x509::X509;

/// Interface to the certificate and revocation collaborator consulted while
/// verifying a device's M2 signature.
pub trait ITrustAnchorStore {
    /// Check that `chain` (leaf first, followed by any intermediates) leads
    /// to one of the trusted roots
    fn verify_chain(&self, chain: &[X509]) -> bool;

    /// Check whether the device with the given unique id has been revoked
    fn is_revoked(&self, device_id: &[u8; 8]) -> bool;
}
