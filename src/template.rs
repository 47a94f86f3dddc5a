// Copyright (C) 2020-2023 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of codeplug.
//
// codeplug is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// codeplug is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with codeplug.  If not, see <http://www.gnu.org/licenses/>. *
//! template
//!
//! # Introduction
//!
//! The struct template: a fixed, deterministic recipe (derived once by [`crate::schema`]) for
//! carving one record's raw bytes into named slots. Applying a template is a pure, one-shot
//! operation-- it holds no state of its own across calls.

use crate::error::{Cause, Error, Result};

/// One slot in a record's byte layout.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Slot {
    /// A single byte, decoded as an unsigned integer.
    U8,
    /// An `n`-byte blob, decoded as raw bytes (or, for `int`/`binary` fields wider than a byte,
    /// a little-endian unsigned integer-- cf. [`crate::field`]).
    Blob(usize),
    /// `n` bytes of declared-but-unused padding: present in the image, absent from every row.
    Padding(usize),
}

impl Slot {
    fn len(&self) -> usize {
        match self {
            Slot::U8 => 1,
            Slot::Blob(n) => *n,
            Slot::Padding(n) => *n,
        }
    }
}

/// A raw value carved out of a record by [`Template::apply`], before any domain-specific
/// decoding (BCD, UTF-16, &c) has been applied.
#[derive(Debug, Clone)]
pub enum RawValue {
    U8(u8),
    Blob(Vec<u8>),
}

impl RawValue {
    /// Interpret this raw value as a little-endian unsigned integer (`U8` or `Blob` of any
    /// width up to 8 bytes).
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            RawValue::U8(b) => Ok(*b as u64),
            RawValue::Blob(bytes) => {
                if bytes.len() > 8 {
                    return Err(Error::new(
                        Cause::DecodeError,
                        format!("cannot interpret a {}-byte blob as an integer", bytes.len()),
                    ));
                }
                let mut buf = [0u8; 8];
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(u64::from_le_bytes(buf))
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawValue::U8(b) => std::slice::from_ref(b),
            RawValue::Blob(bytes) => bytes,
        }
    }
}

/// The deterministic `(slots, names)` pair described in spec §4.3.
#[derive(Debug)]
pub struct Template {
    slots: Vec<Slot>,
    names: Vec<Option<String>>,
    total_len: usize,
}

impl Template {
    pub fn new(slots: Vec<Slot>, names: Vec<Option<String>>) -> Template {
        let total_len = slots.iter().map(Slot::len).sum();
        Template {
            slots,
            names,
            total_len,
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Carve `record` (which must be exactly [`Template::total_len`] bytes) into a
    /// `name -> raw value` list, in slot order, skipping padding.
    pub fn apply(&self, record: &[u8]) -> Result<Vec<(String, RawValue)>> {
        if record.len() != self.total_len {
            return Err(Error::new(
                Cause::StructuralMismatch,
                format!(
                    "record is {} bytes, template expects {}",
                    record.len(),
                    self.total_len
                ),
            ));
        }
        let mut out = Vec::new();
        let mut offset = 0;
        for (slot, name) in self.slots.iter().zip(self.names.iter()) {
            let len = slot.len();
            let bytes = &record[offset..offset + len];
            offset += len;
            let Some(name) = name else { continue };
            let raw = match slot {
                Slot::U8 => RawValue::U8(bytes[0]),
                Slot::Blob(_) => RawValue::Blob(bytes.to_vec()),
                Slot::Padding(_) => unreachable!("padding slots carry no name"),
            };
            out.push((name.clone(), raw));
        }
        Ok(out)
    }

    /// The inverse of [`Template::apply`]: given every named slot's encoded bytes, assemble a
    /// full record, leaving padding as `fill`.
    pub fn assemble<'a>(
        &self,
        values: impl Fn(&str) -> Option<&'a [u8]>,
        fill: u8,
    ) -> Result<Vec<u8>> {
        let mut record = vec![fill; self.total_len];
        let mut offset = 0;
        for (slot, name) in self.slots.iter().zip(self.names.iter()) {
            let len = slot.len();
            if let Some(name) = name {
                if let Some(bytes) = values(name) {
                    if bytes.len() != len {
                        return Err(Error::new(
                            Cause::CapacityExceeded,
                            format!("slot {name:?} expects {len} bytes, got {}", bytes.len()),
                        ));
                    }
                    record[offset..offset + len].copy_from_slice(bytes);
                }
            }
            offset += len;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn apply_skips_padding() -> Result<(), String> {
        use super::*;
        let slots = vec![Slot::U8, Slot::Padding(2), Slot::Blob(2)];
        let names = vec![Some("a".to_string()), None, Some("b".to_string())];
        let template = Template::new(slots, names);
        assert_eq!(template.total_len(), 5);
        let record = [0x01, 0x00, 0x00, 0x02, 0x03];
        let carved = match template.apply(&record) {
            Ok(carved) => carved,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(carved.len(), 2);
        assert_eq!(carved[0].0, "a");
        match carved[0].1.as_u64() {
            Ok(v) => assert_eq!(v, 1),
            Err(e) => return Err(format!("{}", e)),
        }
        assert_eq!(carved[1].0, "b");
        assert_eq!(carved[1].1.as_bytes(), &[0x02, 0x03]);
        Ok(())
    }

    #[test]
    fn apply_rejects_wrong_length() -> Result<(), String> {
        use super::*;
        let template = Template::new(vec![Slot::U8], vec![Some("a".to_string())]);
        match template.apply(&[1, 2]) {
            Ok(_) => Err(String::from("a record of the wrong length should have been rejected")),
            Err(_) => Ok(()),
        }
    }

    #[test]
    fn assemble_roundtrips_with_apply() -> Result<(), String> {
        use super::*;
        let slots = vec![Slot::U8, Slot::Padding(1), Slot::Blob(2)];
        let names = vec![Some("a".to_string()), None, Some("b".to_string())];
        let template = Template::new(slots, names);
        let a = [0x07u8];
        let b = [0xaa, 0xbb];
        let record = match template.assemble(
            |name| match name {
                "a" => Some(&a[..]),
                "b" => Some(&b[..]),
                _ => None,
            },
            0x00,
        ) {
            Ok(record) => record,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(record, vec![0x07, 0x00, 0xaa, 0xbb]);
        let carved = match template.apply(&record) {
            Ok(carved) => carved,
            Err(e) => return Err(format!("{}", e)),
        };
        match carved[0].1.as_u64() {
            Ok(v) => assert_eq!(v, 7),
            Err(e) => return Err(format!("{}", e)),
        }
        assert_eq!(carved[1].1.as_bytes(), &[0xaa, 0xbb]);
        Ok(())
    }
}
