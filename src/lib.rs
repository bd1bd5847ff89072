// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Remote attestation of FPGA secure device managers (SDM) using the SIGMA
//! protocol.
//!
//! The crate provides:
//! * A byte-exact codec for SDM mailbox messages, including per-actor
//!   byte-order conversion and the 32-bit command header
//! * The cryptographic primitives of the protocol: the SP 800-108 KDF, the
//!   AES-GCM channel cipher, ECDH and ECDSA/HMAC verification
//! * A SIGMA session orchestrator that authenticates a device against a
//!   user-supplied trust anchor store and exchanges protected commands with it
//!
//! The transport to the device is supplied by the caller through the
//! [`sigma::Transport`] trait.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod sigma;
pub mod store;
