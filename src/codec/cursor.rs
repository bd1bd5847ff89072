// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use serde::Deserialize;

/// Byte order used to interpret multi-byte integers
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// A bounds-checked cursor over a byte buffer.
///
/// Reads are available on any buffer, writes only on mutable ones.  Every
/// access checks that enough bytes remain before touching the buffer, so a
/// failed operation never moves the position.
#[derive(Debug)]
pub struct SafeCursor<B> {
    buf: B,
    pos: usize,
    limit: usize,
    order: ByteOrder,
}

impl<B: AsRef<[u8]>> SafeCursor<B> {
    /// Wrap `buf`, using big-endian for multi-byte integers
    pub fn new(buf: B) -> Self {
        let limit = buf.as_ref().len();

        Self {
            buf,
            pos: 0,
            limit,
            order: ByteOrder::BigEndian,
        }
    }

    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Restrict the readable/writable window to the first `limit` bytes
    pub fn set_limit(&mut self, limit: usize) -> Result<(), Error> {
        if limit > self.buf.as_ref().len() || limit < self.pos {
            return Err(Error::InvalidPosition {
                position: limit,
                limit: self.buf.as_ref().len(),
            });
        }

        self.limit = limit;

        Ok(())
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), Error> {
        if pos > self.limit {
            return Err(Error::InvalidPosition {
                position: pos,
                limit: self.limit,
            });
        }

        self.pos = pos;

        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        let target = self.pos.checked_add(n).ok_or(Error::InvalidPosition {
            position: usize::MAX,
            limit: self.limit,
        })?;

        self.seek(target)
    }

    fn check(&self, requested: usize) -> Result<(), Error> {
        let remaining = self.remaining();

        if remaining < requested {
            return Err(Error::BufferUnderrun {
                remaining,
                requested,
            });
        }

        Ok(())
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&[u8], Error> {
        self.check(n)?;

        let start = self.pos;
        self.pos += n;

        Ok(&self.buf.as_ref()[start..self.pos])
    }

    /// Read whatever is left, which must be exactly `n` bytes
    pub fn get_exact(&mut self, n: usize) -> Result<&[u8], Error> {
        let remaining = self.remaining();

        if remaining != n {
            return Err(Error::LengthMismatch {
                remaining,
                expected: n,
            });
        }

        self.get_bytes(n)
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut a = [0u8; N];
        a.copy_from_slice(self.get_bytes(N)?);
        Ok(a)
    }

    pub fn get_u8(&mut self) -> Result<u8, Error> {
        Ok(self.get_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, Error> {
        self.get_u16_with(self.order)
    }

    /// Read a u16 using `order` for this read only
    pub fn get_u16_with(&mut self, order: ByteOrder) -> Result<u16, Error> {
        let b = self.get_array::<2>()?;

        Ok(match order {
            ByteOrder::BigEndian => u16::from_be_bytes(b),
            ByteOrder::LittleEndian => u16::from_le_bytes(b),
        })
    }

    pub fn get_u32(&mut self) -> Result<u32, Error> {
        self.get_u32_with(self.order)
    }

    /// Read a u32 using `order` for this read only
    pub fn get_u32_with(&mut self, order: ByteOrder) -> Result<u32, Error> {
        let b = self.get_array::<4>()?;

        Ok(match order {
            ByteOrder::BigEndian => u32::from_be_bytes(b),
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
        })
    }

    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> SafeCursor<B> {
    pub fn put_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        self.check(v.len())?;

        let start = self.pos;
        self.pos += v.len();
        self.buf.as_mut()[start..self.pos].copy_from_slice(v);

        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<(), Error> {
        self.put_u16_with(v, self.order)
    }

    pub fn put_u16_with(&mut self, v: u16, order: ByteOrder) -> Result<(), Error> {
        match order {
            ByteOrder::BigEndian => self.put_bytes(&v.to_be_bytes()),
            ByteOrder::LittleEndian => self.put_bytes(&v.to_le_bytes()),
        }
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), Error> {
        self.put_u32_with(v, self.order)
    }

    pub fn put_u32_with(&mut self, v: u32, order: ByteOrder) -> Result<(), Error> {
        match order {
            ByteOrder::BigEndian => self.put_bytes(&v.to_be_bytes()),
            ByteOrder::LittleEndian => self.put_bytes(&v.to_le_bytes()),
        }
    }
}
