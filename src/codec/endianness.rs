// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::structure::{FieldKind, StructureField, StructureType};
use std::fmt;
use std::str::FromStr;

/// Which end of the protocol produced (or will consume) a byte sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Actor {
    /// The secure device manager, native little-endian
    Firmware,
    /// The verifier host; structure values are always held in this order
    Service,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Firmware => write!(f, "FIRMWARE"),
            Actor::Service => write!(f, "SERVICE"),
        }
    }
}

impl FromStr for Actor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "firmware" => Ok(Actor::Firmware),
            "service" => Ok(Actor::Service),
            _ => Err(Error::StructureValidation(format!("unknown actor {s}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    Convert,
    None,
}

/// Byte-order decision for one field of one structure as seen by `actor`.
///
/// The service actor never converts.  For the firmware actor every
/// multi-byte integer field converts; opaque byte fields never do.  Fields
/// foreign to `structure` are left alone.
pub fn conversion(structure: StructureType, actor: Actor, field: StructureField) -> Conversion {
    if field.structure() != structure {
        return Conversion::None;
    }

    match actor {
        Actor::Service => Conversion::None,
        Actor::Firmware => match field.kind() {
            FieldKind::U16 | FieldKind::U32 | FieldKind::Words(_) | FieldKind::WordBlob(_) => {
                Conversion::Convert
            }
            FieldKind::Bytes(_) | FieldKind::Blob(_) => Conversion::None,
        },
    }
}

/// The set of fields of a structure that need byte-order conversion for a
/// given actor
#[derive(Clone, Debug)]
pub struct EndiannessMap {
    structure: StructureType,
    actor: Actor,
    entries: Vec<StructureField>,
}

impl EndiannessMap {
    pub fn new(structure: StructureType, actor: Actor) -> Self {
        let entries = structure
            .fields()
            .iter()
            .filter(|f| conversion(structure, actor, **f) == Conversion::Convert)
            .copied()
            .collect();

        Self {
            structure,
            actor,
            entries,
        }
    }

    pub fn structure(&self) -> StructureType {
        self.structure
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn get(&self, field: StructureField) -> Conversion {
        if self.entries.contains(&field) {
            Conversion::Convert
        } else {
            Conversion::None
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructureField> {
        self.entries.iter()
    }
}

/// Reverse the bytes of each primitive in `v`: the whole value for scalar
/// integers, every 32-bit word for word arrays.  Opaque kinds are copied.
pub(crate) fn swap(kind: FieldKind, v: &[u8]) -> Vec<u8> {
    match kind {
        FieldKind::U16 | FieldKind::U32 => v.iter().rev().copied().collect(),
        FieldKind::Words(_) | FieldKind::WordBlob(_) => v
            .chunks(4)
            .flat_map(|w| w.iter().rev().copied())
            .collect(),
        FieldKind::Bytes(_) | FieldKind::Blob(_) => v.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn service_maps_are_empty() {
        for ty in StructureType::ALL {
            assert_eq!(EndiannessMap::new(*ty, Actor::Service).size(), 0, "{ty}");
        }
    }

    #[test]
    fn firmware_maps_cover_multi_byte_integers_only() {
        for ty in StructureType::ALL {
            let map = EndiannessMap::new(*ty, Actor::Firmware);

            assert!(map.size() > 0, "{ty}");

            for f in map.iter() {
                assert!(!matches!(
                    f.kind(),
                    FieldKind::Bytes(_) | FieldKind::Blob(_)
                ));
            }
        }

        let map = EndiannessMap::new(StructureType::SigmaM1, Actor::Firmware);
        assert_eq!(map.size(), 2);
        assert_eq!(
            map.get(StructureField::SigmaM1VerifierDhPubkey),
            Conversion::None
        );
        assert_eq!(map.get(StructureField::SigmaM1Magic), Conversion::Convert);
    }

    #[test]
    fn foreign_field_is_never_converted() {
        assert_eq!(
            conversion(
                StructureType::SigmaM1,
                Actor::Firmware,
                StructureField::SigmaM2Magic
            ),
            Conversion::None
        );
    }

    #[test]
    fn swap_granularity() {
        assert_eq!(swap(FieldKind::U16, &hex!("0102")), hex!("0201"));
        assert_eq!(swap(FieldKind::U32, &hex!("01020304")), hex!("04030201"));
        assert_eq!(
            swap(FieldKind::Words(8), &hex!("01020304 05060708")),
            hex!("04030201 08070605")
        );
        assert_eq!(swap(FieldKind::Bytes(4), &hex!("01020304")), hex!("01020304"));

        // involution
        let v = hex!("0a0b0c0d 1a1b1c1d");
        assert_eq!(
            swap(FieldKind::Words(8), &swap(FieldKind::Words(8), &v)),
            v
        );
    }

    #[test]
    fn actor_from_str() {
        assert_eq!("FIRMWARE".parse::<Actor>().unwrap(), Actor::Firmware);
        assert_eq!("service".parse::<Actor>().unwrap(), Actor::Service);
        assert!("device".parse::<Actor>().is_err());
    }
}
