// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::trustanchor::TrustAnchors;
use super::ITrustAnchorStore;
use openssl::error::ErrorStack;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// In-memory trust anchors: root certificates indexed by label and revoked
/// devices indexed by unique id.
#[derive(Debug, Default)]
pub struct MemoTrustAnchorStore {
    roots: RwLock<Vec<(String, X509)>>,
    revoked: RwLock<HashMap<[u8; 8], Option<String>>>,
}

fn lock_err<T>(_: T) -> Error {
    Error::Sema("trust anchor store lock poisoned".to_string())
}

impl MemoTrustAnchorStore {
    /// Returns a new empty MemoTrustAnchorStore
    pub fn new() -> Self {
        Default::default()
    }

    /// Add to an existing (and possibly empty) store the roots and
    /// revocations loaded from the given JSON file
    pub fn load_json(&mut self, j: &str) -> Result<(), Error> {
        let tas = TrustAnchors::parse(j).map_err(|e| Error::Syntax(e.to_string()))?;

        for (i, root) in tas.roots.iter().enumerate() {
            let cert = X509::from_pem(root.certificate.as_bytes())
                .map_err(|e| Error::Certificate(format!("root #{i}: {e}")))?;

            let label = root.label.clone().unwrap_or_else(|| format!("root #{i}"));

            self.add_root(&label, cert)?;
        }

        for r in tas.revoked.iter() {
            self.revoke(&r.device_id, r.reason.clone())?;
        }

        Ok(())
    }

    pub fn add_root(&self, label: &str, cert: X509) -> Result<(), Error> {
        self.roots
            .write()
            .map_err(lock_err)?
            .push((label.to_string(), cert));

        Ok(())
    }

    pub fn revoke(&self, device_id: &[u8; 8], reason: Option<String>) -> Result<(), Error> {
        self.revoked
            .write()
            .map_err(lock_err)?
            .insert(*device_id, reason);

        Ok(())
    }

    pub fn root_count(&self) -> usize {
        self.roots.read().map(|r| r.len()).unwrap_or(0)
    }

    fn try_verify_chain(&self, chain: &[X509]) -> Result<bool, Error> {
        let Some((leaf, intermediates)) = chain.split_first() else {
            return Ok(false);
        };

        let roots = self.roots.read().map_err(lock_err)?;

        let verify = || -> Result<bool, ErrorStack> {
            let mut builder = X509StoreBuilder::new()?;
            for (_, root) in roots.iter() {
                builder.add_cert(root.clone())?;
            }
            let store = builder.build();

            let mut untrusted = Stack::new()?;
            for c in intermediates {
                untrusted.push(c.clone())?;
            }

            let mut ctx = X509StoreContext::new()?;
            ctx.init(&store, leaf, &untrusted, |c| {
                let ok = c.verify_cert()?;

                if !ok {
                    debug!("chain verification failed: {}", c.error());
                }

                Ok(ok)
            })
        };

        verify().map_err(|e| Error::Certificate(e.to_string()))
    }
}

impl ITrustAnchorStore for MemoTrustAnchorStore {
    fn verify_chain(&self, chain: &[X509]) -> bool {
        self.try_verify_chain(chain).unwrap_or_else(|e| {
            warn!("{e}");
            false
        })
    }

    /// A poisoned store reports every device as revoked
    fn is_revoked(&self, device_id: &[u8; 8]) -> bool {
        self.revoked
            .read()
            .map(|r| r.contains_key(device_id))
            .unwrap_or(true)
    }
}
