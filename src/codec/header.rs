// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::cursor::SafeCursor;
use super::errors::Error;

pub const HEADER_LEN: usize = 4;
const HEADER_BITS: u32 = 32;

pub const STATUS_OK: u16 = 0;
pub const STATUS_UNKNOWN_COMMAND: u16 = 0x3ff;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HeaderField {
    Code,
    Length,
    Id,
    Client,
}

// (field, offset from LSB, width).  Changing this table breaks wire
// compatibility with the device.
const LAYOUT: [(HeaderField, u32, u32); 4] = [
    (HeaderField::Code, 0, 11),
    (HeaderField::Length, 12, 11),
    (HeaderField::Id, 24, 4),
    (HeaderField::Client, 28, 4),
];

fn width_of(field: HeaderField) -> u32 {
    LAYOUT
        .iter()
        .find(|(f, _, _)| *f == field)
        .map(|(_, _, w)| *w)
        .unwrap_or(0)
}

fn mask(width: u32) -> u32 {
    if width >= HEADER_BITS {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// The 32-bit mailbox command header.
///
/// `code` holds the command code on requests and the status code on
/// responses.  `length` is the payload length in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandHeader {
    pub code: u16,
    pub length: u16,
    pub id: u8,
    pub client: u8,
}

impl CommandHeader {
    /// Create a header, checking every value fits its bit-field
    pub fn new(code: u16, length: u16, id: u8, client: u8) -> Result<Self, Error> {
        let h = Self {
            code,
            length,
            id,
            client,
        };

        for (field, _, width) in LAYOUT.iter() {
            let v = h.get(*field);

            if v > mask(*width) {
                return Err(Error::HeaderValidation(format!(
                    "{field:?} value {v:#x} does not fit in {width} bits"
                )));
            }
        }

        Ok(h)
    }

    fn get(&self, field: HeaderField) -> u32 {
        match field {
            HeaderField::Code => self.code as u32,
            HeaderField::Length => self.length as u32,
            HeaderField::Id => self.id as u32,
            HeaderField::Client => self.client as u32,
        }
    }

    fn set(&mut self, field: HeaderField, v: u32) {
        match field {
            HeaderField::Code => self.code = v as u16,
            HeaderField::Length => self.length = v as u16,
            HeaderField::Id => self.id = v as u8,
            HeaderField::Client => self.client = v as u8,
        }
    }

    fn word(&self) -> u32 {
        LAYOUT.iter().fold(0u32, |word, (field, offset, width)| {
            word | ((self.get(*field) & mask(*width)) << offset)
        })
    }

    /// Serialise in service order
    pub fn build(&self) -> [u8; HEADER_LEN] {
        self.word().to_be_bytes()
    }

    /// Serialise in device order: the whole word is reversed as one unit
    pub fn build_for_transport(&self) -> [u8; HEADER_LEN] {
        let mut b = self.build();
        b.reverse();
        b
    }

    /// Parse a header serialised in service order
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let mut c = SafeCursor::new(bytes);

        let word = c
            .get_exact(HEADER_LEN)
            .map_err(|_| {
                Error::HeaderValidation(format!(
                    "expecting {HEADER_LEN} bytes, got {}",
                    bytes.len()
                ))
            })
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))?;

        let mut h = CommandHeader::default();

        for (field, offset, width) in LAYOUT.iter() {
            let shift_left = HEADER_BITS - offset - width;
            let shift_right = HEADER_BITS - width;

            h.set(*field, (word << shift_left) >> shift_right);
        }

        Ok(h)
    }

    /// Parse a header serialised in device order
    pub fn parse_from_transport(bytes: &[u8]) -> Result<Self, Error> {
        let mut b = bytes.to_vec();
        b.reverse();

        CommandHeader::parse(&b)
    }

    /// Succeed only if the header carries the OK status
    pub fn validate_status(&self, context: &str) -> Result<(), Error> {
        match self.code {
            STATUS_OK => Ok(()),
            STATUS_UNKNOWN_COMMAND => Err(Error::UnknownCommand(context.to_string())),
            code => Err(Error::CommandFailed {
                code,
                context: context.to_string(),
            }),
        }
    }

    pub fn max_length() -> usize {
        mask(width_of(HeaderField::Length)) as usize
    }
}

/// Parse a service-order header and check its status
pub fn validate_status(bytes: &[u8], context: &str) -> Result<CommandHeader, Error> {
    let h = CommandHeader::parse(bytes)?;

    h.validate_status(context)?;

    Ok(h)
}
