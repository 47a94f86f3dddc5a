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
//! field
//!
//! # Introduction
//!
//! The runtime counterpart to a [`crate::schema::FieldDescriptor`]: the raw value actually
//! carved out of a record, plus rendering and validation. A field's [`FieldValue::display`] is
//! total-- it never fails. `set_raw`/`validate` are the only operations that can.

use crate::error::{Cause, Error, Result};
use crate::primitives;
use crate::schema::{FieldDescriptor, FieldType};

use std::rc::Rc;

/// The raw, still domain-undecoded value carved out of a record for one field.
#[derive(Debug, Clone)]
pub enum RawStorage {
    /// A field whose width is at most one byte (an aligned `bits == 8` field, or a bit-packed
    /// sub-field whose value has already been shifted/masked out of its containing octet).
    Int(u64),
    /// A field whose width is a multiple of 8 bits wider than one byte (strings, BCD, BCDT,
    /// wide integers).
    Blob(Vec<u8>),
}

/// The runtime value of one field within one row.
#[derive(Debug)]
pub struct FieldValue {
    descriptor: Rc<FieldDescriptor>,
    loaded: bool,
    raw: Option<RawStorage>,
    /// For a bit-packed sub-field only: the raw, unshifted byte of its containing octet, needed
    /// to evaluate spec §4.4's "the containing octet is unset" rule (a sub-field is never
    /// independently unset).
    containing_octet: Option<u8>,
}

impl FieldValue {
    pub fn unloaded(descriptor: Rc<FieldDescriptor>) -> FieldValue {
        FieldValue {
            descriptor,
            loaded: false,
            raw: None,
            containing_octet: None,
        }
    }

    pub fn descriptor(&self) -> &Rc<FieldDescriptor> {
        &self.descriptor
    }

    pub fn set_raw(&mut self, raw: RawStorage) {
        self.raw = Some(raw);
        self.loaded = true;
    }

    pub fn set_containing_octet(&mut self, byte: u8) {
        self.containing_octet = Some(byte);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn raw(&self) -> Option<&RawStorage> {
        self.raw.as_ref()
    }

    fn as_i64(&self) -> Result<i64> {
        match &self.raw {
            Some(RawStorage::Int(v)) => Ok(*v as i64),
            Some(RawStorage::Blob(bytes)) => {
                let mut buf = [0u8; 8];
                if bytes.len() > 8 {
                    return Err(Error::new(
                        Cause::DecodeError,
                        format!("field {:?} is too wide to interpret as an integer", self.descriptor.id),
                    ));
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(u64::from_le_bytes(buf) as i64)
            }
            None => Err(Error::new(
                Cause::DecodeError,
                format!("field {:?} has not been loaded", self.descriptor.id),
            )
            .at_field(self.descriptor.id.clone())),
        }
    }

    /// This field's raw value as an unsigned integer-- the public counterpart to `as_i64`, used
    /// by the table engine to recombine bit-packed sub-fields into a grouping octet on dump.
    pub fn raw_u64(&self) -> Result<u64> {
        self.as_i64().map(|v| v as u64)
    }

    /// This field's raw value, sized to exactly `width_bytes`, for splicing back into a record
    /// on dump. The stored raw value already *is* the on-disk encoding (spec §3's "field value"
    /// holds either an unsigned integer or an opaque byte slice), so this never re-encodes-- it
    /// only validates that the stored width matches what the template expects.
    pub fn encoded_bytes(&self, width_bytes: usize) -> Result<Vec<u8>> {
        match &self.raw {
            Some(RawStorage::Int(v)) => {
                if width_bytes > 8 {
                    return Err(Error::new(
                        Cause::CapacityExceeded,
                        format!("field {:?} cannot be widened to {width_bytes} bytes", self.descriptor.id),
                    )
                    .at_field(self.descriptor.id.clone()));
                }
                Ok(v.to_le_bytes()[..width_bytes].to_vec())
            }
            Some(RawStorage::Blob(bytes)) => {
                if bytes.len() != width_bytes {
                    return Err(Error::new(
                        Cause::CapacityExceeded,
                        format!(
                            "field {:?} holds {} bytes, template expects {width_bytes}",
                            self.descriptor.id,
                            bytes.len()
                        ),
                    )
                    .at_field(self.descriptor.id.clone()));
                }
                Ok(bytes.clone())
            }
            None => Err(Error::new(
                Cause::StructuralMismatch,
                format!("field {:?} has no value to dump", self.descriptor.id),
            )
            .at_field(self.descriptor.id.clone())),
        }
    }

    fn raw_bytes(&self) -> Vec<u8> {
        match &self.raw {
            Some(RawStorage::Int(v)) => vec![*v as u8],
            Some(RawStorage::Blob(bytes)) => bytes.clone(),
            None => Vec::new(),
        }
    }

    /// Spec §4.4's zero-valued/unset rule: unset iff every octet of the raw storage equals
    /// `zero_value`. A bit-packed sub-field defers to its containing octet.
    pub fn is_unset(&self, zero_value: u8) -> bool {
        if self.descriptor.bits < 8 {
            return self.containing_octet.map(|b| b == zero_value).unwrap_or(false);
        }
        self.raw_bytes().iter().all(|&b| b == zero_value)
    }

    /// Check this field's declared constraints (`min_value`/`max_value`/`allowed_values`).
    /// A no-op for non-numeric types, per spec §4.4.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.descriptor.ty, FieldType::Int | FieldType::Binary) {
            return Ok(());
        }
        let value = self.as_i64()?;
        if let Some(min) = self.descriptor.min_value {
            if value < min {
                return Err(Error::new(
                    Cause::ValidationFailed,
                    format!("{value} is below the minimum {min}"),
                )
                .at_field(self.descriptor.id.clone()));
            }
        }
        if let Some(max) = self.descriptor.max_value {
            if value > max {
                return Err(Error::new(
                    Cause::ValidationFailed,
                    format!("{value} is above the maximum {max}"),
                )
                .at_field(self.descriptor.id.clone()));
            }
        }
        if let Some(allowed) = &self.descriptor.allowed_values {
            if !allowed.contains(&value) {
                return Err(Error::new(
                    Cause::ValidationFailed,
                    format!("{value} is not among the allowed values"),
                )
                .at_field(self.descriptor.id.clone()));
            }
        }
        Ok(())
    }

    fn lut_display(value: i64, lut: &std::collections::BTreeMap<i64, String>) -> String {
        let label = lut
            .get(&value)
            .cloned()
            .unwrap_or_else(|| format!("** unrecognized value {value} **"));
        let all = lut
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{label} ({all})")
    }

    fn scaled_value(&self) -> Result<i64> {
        let mut value = self.as_i64()?;
        for transform in &self.descriptor.transform {
            value = transform.apply(value);
        }
        Ok(value)
    }

    /// Render this field's value for display. Total: never fails, producing one of the sentinel
    /// strings described in spec §7 instead.
    pub fn display(&self, zero_value: u8) -> String {
        if self.descriptor.ty == FieldType::Bitfield {
            return "<bitfield>".to_string();
        }
        if !self.loaded {
            return "<UNINITIALIZED>".to_string();
        }
        if self.is_unset(zero_value) {
            if let Some(lut) = &self.descriptor.lut {
                if let Ok(value) = self.as_i64() {
                    if lut.contains_key(&value) {
                        return Self::lut_display(value, lut);
                    }
                }
            }
            return "Unset/Disabled".to_string();
        }
        let bytes = self.raw_bytes();
        match self.descriptor.ty {
            FieldType::Bitfield => unreachable!("handled above"),
            FieldType::Ascii => primitives::ascii_decode(&bytes)
                .unwrap_or_else(|e| format!("** {e} **")),
            FieldType::Utf16 => primitives::utf16_decode(&bytes)
                .unwrap_or_else(|e| format!("** {e} **")),
            FieldType::Int | FieldType::Binary => {
                if let Some(lut) = &self.descriptor.lut {
                    match self.as_i64() {
                        Ok(value) => Self::lut_display(value, lut),
                        Err(e) => format!("** {e} **"),
                    }
                } else {
                    match self.scaled_value() {
                        Ok(value) => value.to_string(),
                        Err(e) => format!("** {e} **"),
                    }
                }
            }
            FieldType::Bcd => match primitives::bcd_decode(&bytes) {
                Ok(value) => format!("{:0width$}", value, width = self.descriptor.bits / 4),
                Err(e) => format!("** {e} **"),
            },
            FieldType::RevBcd => match primitives::rev_bcd_decode(&bytes) {
                Ok(value) => format!("{:0width$}", value, width = self.descriptor.bits / 4),
                Err(e) => format!("** {e} **"),
            },
            FieldType::Bcdt => {
                if bytes.len() != 2 {
                    return format!("** bcdt field is {} bytes, expected 2 **", bytes.len());
                }
                match primitives::bcdt_decode([bytes[0], bytes[1]]) {
                    Ok((tone, squelch)) => primitives::bcdt_display(tone, squelch),
                    Err(e) => format!("** {e} **"),
                }
            }
        }
    }
}
