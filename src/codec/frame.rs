// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::cursor::SafeCursor;
use super::errors::Error;
use super::header::{CommandHeader, HEADER_LEN};
use std::fmt;

/// Mailbox commands used by the attestation flow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandCode {
    GetCertificate = 0x181,
    CreateAttestationSubkey = 0x182,
    GetMeasurement = 0x183,
    SigmaM1 = 0x1d0,
    SigmaEnc = 0x1d1,
    SigmaTeardown = 0x1d2,
}

impl CommandCode {
    const ALL: [CommandCode; 6] = [
        CommandCode::GetCertificate,
        CommandCode::CreateAttestationSubkey,
        CommandCode::GetMeasurement,
        CommandCode::SigmaM1,
        CommandCode::SigmaEnc,
        CommandCode::SigmaTeardown,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<CommandCode> {
        CommandCode::ALL.iter().find(|c| c.code() == code).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandCode::GetCertificate => "GET_CERTIFICATE",
            CommandCode::CreateAttestationSubkey => "CREATE_ATTESTATION_SUBKEY",
            CommandCode::GetMeasurement => "GET_MEASUREMENT",
            CommandCode::SigmaM1 => "SIGMA_M1",
            CommandCode::SigmaEnc => "SIGMA_ENC",
            CommandCode::SigmaTeardown => "SIGMA_TEARDOWN",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A header plus its payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: CommandHeader,
    pub body: Vec<u8>,
}

/// Frame `body` behind a device-order header whose code field is `code`
pub fn encode(code: u16, id: u8, client: u8, body: &[u8]) -> Result<Vec<u8>, Error> {
    let length = u16::try_from(body.len())
        .ok()
        .filter(|l| *l as usize <= CommandHeader::max_length())
        .ok_or_else(|| Error::FieldLength {
            field: "COMMAND_HEADER.LENGTH".to_string(),
            expected: CommandHeader::max_length(),
            actual: body.len(),
        })?;

    let header = CommandHeader::new(code, length, id, client)?;

    let mut c = SafeCursor::new(vec![0u8; HEADER_LEN + body.len()]);
    c.put_bytes(&header.build_for_transport())?;
    c.put_bytes(body)?;

    Ok(c.into_inner())
}

pub fn encode_request(command: CommandCode, id: u8, client: u8, body: &[u8]) -> Result<Vec<u8>, Error> {
    encode(command.code(), id, client, body)
}

fn split<'a>(bytes: &'a [u8], context: &str) -> Result<(CommandHeader, SafeCursor<&'a [u8]>), Error> {
    let mut c = SafeCursor::new(bytes);

    let header = CommandHeader::parse_from_transport(c.get_bytes(HEADER_LEN).map_err(|_| {
        Error::HeaderValidation(format!(
            "{context}: expecting at least {HEADER_LEN} bytes, got {}",
            bytes.len()
        ))
    })?)?;

    Ok((header, c))
}

/// Split a device-order frame into header and body.  The body must be
/// exactly as long as the header says.
pub fn decode(bytes: &[u8]) -> Result<Frame, Error> {
    let (header, mut c) = split(bytes, "frame")?;

    let body = c.get_exact(header.length as usize)?.to_vec();

    Ok(Frame { header, body })
}

/// Decode a response frame, failing on any non-OK status before looking at
/// the body
pub fn decode_response(bytes: &[u8], context: &str) -> Result<Frame, Error> {
    let (header, mut c) = split(bytes, context)?;

    header.validate_status(context)?;

    let body = c.get_exact(header.length as usize)?.to_vec();

    Ok(Frame { header, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::{STATUS_OK, STATUS_UNKNOWN_COMMAND};
    use hex_literal::hex;

    #[test]
    fn encode_decode() {
        let f = encode_request(CommandCode::SigmaTeardown, 2, 1, &hex!("0102030405")).unwrap();

        // code 0x1d2, length 5, id 2, client 1, reversed as one word
        assert_eq!(&f[..4], &hex!("d2510012"));

        let d = decode(&f).unwrap();
        assert_eq!(d.header.code, CommandCode::SigmaTeardown.code());
        assert_eq!(d.header.length, 5);
        assert_eq!(d.body, hex!("0102030405"));
    }

    #[test]
    fn body_length_must_match_header() {
        let mut f = encode(STATUS_OK, 0, 1, &[0u8; 8]).unwrap();
        f.pop();

        assert_eq!(
            decode_response(&f, "GET_MEASUREMENT"),
            Err(Error::LengthMismatch {
                remaining: 7,
                expected: 8
            })
        );
    }

    #[test]
    fn status_checked_before_body() {
        let f = encode(STATUS_UNKNOWN_COMMAND, 0, 1, &[]).unwrap();

        assert_eq!(
            decode_response(&f, "SIGMA_M1"),
            Err(Error::UnknownCommand("SIGMA_M1".to_string()))
        );
    }

    #[test]
    fn oversized_body_rejected() {
        let r = encode_request(CommandCode::SigmaEnc, 0, 1, &vec![0u8; 0x800]);

        assert_eq!(
            r,
            Err(Error::FieldLength {
                field: "COMMAND_HEADER.LENGTH".to_string(),
                expected: 2047,
                actual: 2048
            })
        );
    }

    #[test]
    fn largest_body_fits() {
        // a certificate chain must fit a single frame
        let body = vec![0x30u8; CommandHeader::max_length()];
        let f = encode(STATUS_OK, 0, 1, &body).unwrap();

        assert_eq!(f.len(), HEADER_LEN + 2047);

        let d = decode_response(&f, "GET_CERTIFICATE").unwrap();
        assert_eq!(d.header.length, 2047);
        assert_eq!(d.body, body);

        // bytes past the declared length are never taken as payload
        let mut f = f;
        f.push(0);
        assert_eq!(
            decode_response(&f, "GET_CERTIFICATE"),
            Err(Error::LengthMismatch {
                remaining: 2048,
                expected: 2047
            })
        );
    }

    #[test]
    fn short_frame_rejected() {
        assert!(matches!(decode(&hex!("0000")), Err(Error::HeaderValidation(_))));
    }

    #[test]
    fn command_codes() {
        for c in CommandCode::ALL {
            assert_eq!(CommandCode::from_code(c.code()), Some(c));
        }
        assert_eq!(CommandCode::from_code(0), None);
    }
}
