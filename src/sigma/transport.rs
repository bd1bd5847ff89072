// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// A synchronous request/response channel to one device.  Frames are passed
/// in device order, header included.  Timeouts are the implementation's
/// business; any error is fatal to the session using it.
pub trait Transport {
    fn send_and_receive(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}
