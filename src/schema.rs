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
//! schema
//!
//! # Introduction
//!
//! Turns one table's schema file (plain CSV) into an ordered list of [`FieldDescriptor`]s plus
//! the [`crate::template::Template`] that knows how to carve one record's bytes into raw slots.
//!
//! The interesting part is the bit-packing pass: a schema may declare several sub-fields (each
//! `bits < 8`) that share a single octet. This module groups consecutive sub-fields sharing an
//! octet into a synthetic `bitfield{N}` field, the same way `pyrdt.py`'s `_read_fields` does, but
//! without the string-prefix-key surgery the Python does after the fact (cf. Design Note
//! "Grouping octets").

use crate::error::{Cause, Error, Result};
use crate::template::{Slot, Template};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::rc::Rc;

/// The closed set of field types a schema row may declare.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FieldType {
    Ascii,
    Utf16,
    Int,
    Binary,
    Bcd,
    RevBcd,
    Bcdt,
    /// A synthetic grouping octet produced by this module, never authored directly in a schema.
    Bitfield,
}

impl FieldType {
    fn parse(s: &str) -> Result<FieldType> {
        match s {
            "ascii" => Ok(FieldType::Ascii),
            "utf16" | "unicode" => Ok(FieldType::Utf16),
            "int" => Ok(FieldType::Int),
            "binary" => Ok(FieldType::Binary),
            "bcd" => Ok(FieldType::Bcd),
            "rev_bcd" => Ok(FieldType::RevBcd),
            "bcdt" => Ok(FieldType::Bcdt),
            other => Err(Error::new(
                Cause::SchemaMalformed,
                format!("unrecognized field type {other:?}"),
            )),
        }
    }
}

/// One of the small set of scalar transforms a schema may attach to a numeric field. Replaces
/// `pyrdt.py`'s `add_transformation`, which compiled an `exec`-ed string into a closure (cf.
/// Design Note "Dynamic transformation code"); here the set is closed and checked at load time.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Transform {
    MultiplyBy(u32),
    Add(i64),
    MultipleOf(u32),
}

impl Transform {
    fn parse_one(s: &str) -> Result<Transform> {
        let (name, arg) = s
            .split_once(':')
            .ok_or_else(|| Error::new(Cause::SchemaMalformed, format!("bad transform {s:?}")))?;
        let bad = || Error::new(Cause::SchemaMalformed, format!("bad transform argument in {s:?}"));
        match name {
            "multiply_by" => Ok(Transform::MultiplyBy(arg.parse().map_err(|_| bad())?)),
            "add" => Ok(Transform::Add(arg.parse().map_err(|_| bad())?)),
            "multiple_of" => Ok(Transform::MultipleOf(arg.parse().map_err(|_| bad())?)),
            other => Err(Error::new(
                Cause::SchemaMalformed,
                format!("unrecognized transform {other:?}"),
            )),
        }
    }

    fn parse_list(s: &str) -> Result<Vec<Transform>> {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Transform::parse_one)
            .collect()
    }

    /// Apply this transform to a decoded raw integer, producing the semantic value.
    pub fn apply(&self, value: i64) -> i64 {
        match self {
            Transform::MultiplyBy(n) => value * *n as i64,
            Transform::Add(n) => value + n,
            Transform::MultipleOf(_) => value,
        }
    }
}

/// An immutable, schema-authored description of one field (or, for synthetic grouping octets,
/// one shared octet). Shared via `Rc` between the row's field values and this schema's own
/// field list (cf. spec §5's single-threaded ownership model).
#[derive(Debug)]
pub struct FieldDescriptor {
    pub id: String,
    pub description: String,
    pub offset: usize,
    pub bits: usize,
    pub ty: FieldType,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub allowed_values: Option<Vec<i64>>,
    pub lut: Option<BTreeMap<i64, String>>,
    pub transform: Vec<Transform>,
    pub tentative: bool,
    /// Set on a sub-field (`bits < 8`): the id of the grouping octet it belongs to.
    pub bitfield: Option<String>,
    /// Set on a grouping octet descriptor: the ids of its constituent sub-fields, in schema
    /// order.
    pub constituents: Vec<String>,
}

impl FieldDescriptor {
    pub fn byte_offset(&self) -> usize {
        self.offset / 8
    }
}

/// One schema row, exactly as it appears in the CSV (before bitfield grouping).
#[derive(Debug, Deserialize)]
struct SchemaRow {
    id: String,
    description: String,
    #[serde(rename = "type")]
    ty: String,
    offset: usize,
    bits: usize,
    #[serde(default)]
    min_value: Option<i64>,
    #[serde(default)]
    max_value: Option<i64>,
    #[serde(default)]
    allowed_values: Option<String>,
    #[serde(default)]
    lut: Option<String>,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    tentative: Option<String>,
}

fn parse_allowed_values(s: &str) -> Result<Vec<i64>> {
    s.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                Error::new(Cause::SchemaMalformed, format!("bad allowed_values entry {s:?}"))
            })
        })
        .collect()
}

fn parse_lut(s: &str) -> Result<BTreeMap<i64, String>> {
    let mut map = BTreeMap::new();
    for entry in s.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (k, v) = entry.split_once(':').ok_or_else(|| {
            Error::new(Cause::SchemaMalformed, format!("bad lut entry {entry:?}"))
        })?;
        let k: i64 = k
            .parse()
            .map_err(|_| Error::new(Cause::SchemaMalformed, format!("bad lut key {k:?}")))?;
        map.insert(k, v.to_string());
    }
    Ok(map)
}

/// A loaded, ready-to-use schema: the ordered field list (including grouping octets, in schema
/// order) and the struct template derived from it.
#[derive(Debug)]
pub struct Schema {
    pub fields: Vec<Rc<FieldDescriptor>>,
    pub template: Template,
}

impl Schema {
    /// Parse `csv_text` into a [`Schema`], implementing the bitfield-grouping algorithm of
    /// spec §4.2, then pad the template out to `record_length` bytes.
    pub fn load(csv_text: &str, record_length: usize) -> Result<Schema> {
        let mut reader = csv::ReaderBuilder::new().from_reader(csv_text.as_bytes());

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut slots: Vec<Slot> = Vec::new();
        let mut names: Vec<Option<String>> = Vec::new();

        let mut bitoffset: usize = 0;
        let mut active_bitfield: Option<(String, usize)> = None;
        let mut bitfield_counter: usize = 0;

        for result in reader.deserialize() {
            let row: SchemaRow = result?;
            if row.id.is_empty() {
                return Err(Error::new(Cause::SchemaMalformed, "field with empty id"));
            }
            if row.offset < bitoffset {
                return Err(Error::new(
                    Cause::SchemaMalformed,
                    format!("field {:?} offset {} is not monotonically increasing", row.id, row.offset),
                ));
            }

            if row.offset > bitoffset {
                let gap = row.offset - bitoffset;
                if gap >= 8 {
                    let pad_bytes = gap / 8;
                    slots.push(Slot::Padding(pad_bytes));
                    names.push(None);
                    if let Some((name, _)) = active_bitfield.take() {
                        close_bitfield(&mut fields, &name);
                    }
                    bitoffset = row.offset;
                } else {
                    let same_octet = bitoffset / 8 == row.offset / 8;
                    if !same_octet {
                        if let Some((name, _)) = active_bitfield.take() {
                            close_bitfield(&mut fields, &name);
                        }
                    }
                    if row.bits >= 8 {
                        return Err(Error::new(
                            Cause::SchemaMalformed,
                            format!("field {:?} straddles an octet boundary", row.id),
                        ));
                    }
                    bitoffset = row.offset;
                }
            }

            let ty = FieldType::parse(&row.ty)?;
            let allowed_values = row
                .allowed_values
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(parse_allowed_values)
                .transpose()?;
            let lut = row
                .lut
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(parse_lut)
                .transpose()?;
            let transform = row
                .transform
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(Transform::parse_list)
                .transpose()?
                .unwrap_or_default();
            let tentative = matches!(row.tentative.as_deref(), Some("1") | Some("true") | Some("yes"));

            if row.bits < 8 {
                if row.offset % 8 + row.bits > 8 {
                    return Err(Error::new(
                        Cause::SchemaMalformed,
                        format!("sub-field {:?} straddles an octet boundary", row.id),
                    ));
                }
                if active_bitfield.is_none() {
                    bitfield_counter += 1;
                    let group_name = format!("bitfield{bitfield_counter}");
                    slots.push(Slot::U8);
                    names.push(Some(group_name.clone()));
                    fields.push(FieldDescriptor {
                        id: group_name.clone(),
                        description: String::new(),
                        offset: row.offset - row.offset % 8,
                        bits: 8,
                        ty: FieldType::Bitfield,
                        min_value: None,
                        max_value: None,
                        allowed_values: None,
                        lut: None,
                        transform: Vec::new(),
                        tentative: false,
                        bitfield: None,
                        constituents: Vec::new(),
                    });
                    active_bitfield = Some((group_name, bitfield_counter));
                }
                let group_name = active_bitfield
                    .as_ref()
                    .ok_or_else(|| {
                        Error::new(Cause::SchemaMalformed, "bitfield group was not opened before use")
                    })?
                    .0
                    .clone();
                fields.push(FieldDescriptor {
                    id: row.id.clone(),
                    description: row.description,
                    offset: row.offset,
                    bits: row.bits,
                    ty,
                    min_value: row.min_value,
                    max_value: row.max_value,
                    allowed_values,
                    lut,
                    transform,
                    tentative,
                    bitfield: Some(group_name.clone()),
                    constituents: Vec::new(),
                });
                if let Some(group) = fields.iter_mut().find(|f| f.id == group_name) {
                    group.constituents.push(row.id.clone());
                }
            } else if row.bits == 8 {
                if row.offset % 8 != 0 {
                    return Err(Error::new(
                        Cause::SchemaMalformed,
                        format!("field {:?} is not octet-aligned", row.id),
                    ));
                }
                slots.push(Slot::U8);
                names.push(Some(row.id.clone()));
                fields.push(FieldDescriptor {
                    id: row.id.clone(),
                    description: row.description,
                    offset: row.offset,
                    bits: row.bits,
                    ty,
                    min_value: row.min_value,
                    max_value: row.max_value,
                    allowed_values,
                    lut,
                    transform,
                    tentative,
                    bitfield: None,
                    constituents: Vec::new(),
                });
            } else if row.bits % 8 == 0 {
                if row.offset % 8 != 0 {
                    return Err(Error::new(
                        Cause::SchemaMalformed,
                        format!("field {:?} is not octet-aligned", row.id),
                    ));
                }
                slots.push(Slot::Blob(row.bits / 8));
                names.push(Some(row.id.clone()));
                fields.push(FieldDescriptor {
                    id: row.id.clone(),
                    description: row.description,
                    offset: row.offset,
                    bits: row.bits,
                    ty,
                    min_value: row.min_value,
                    max_value: row.max_value,
                    allowed_values,
                    lut,
                    transform,
                    tentative,
                    bitfield: None,
                    constituents: Vec::new(),
                });
            } else {
                return Err(Error::new(
                    Cause::SchemaMalformed,
                    format!("field {:?} has a width that is neither < 8 nor a multiple of 8", row.id),
                ));
            }

            bitoffset += row.bits;
            if bitoffset % 8 == 0 {
                if let Some((name, _)) = active_bitfield.take() {
                    close_bitfield(&mut fields, &name);
                }
            }
        }

        if let Some((name, _)) = active_bitfield.take() {
            close_bitfield(&mut fields, &name);
        }

        let target_bits = record_length * 8;
        if bitoffset > target_bits {
            return Err(Error::new(
                Cause::StructuralMismatch,
                format!("schema declares {bitoffset} bits, which exceeds record_length {record_length} bytes"),
            ));
        }
        if bitoffset < target_bits {
            slots.push(Slot::Padding((target_bits - bitoffset) / 8));
            names.push(None);
        }

        let template = Template::new(slots, names);
        if template.total_len() != record_length {
            return Err(Error::new(
                Cause::StructuralMismatch,
                format!(
                    "struct template is {} bytes, record_length is {record_length}",
                    template.total_len()
                ),
            ));
        }

        Ok(Schema {
            fields: fields.into_iter().map(Rc::new).collect(),
            template,
        })
    }
}

fn close_bitfield(fields: &mut [FieldDescriptor], name: &str) {
    // A no-op placeholder for symmetry with the algorithm's "close the active bitfield" step:
    // the grouping descriptor is already fully built incrementally via `constituents.push`, so
    // there is nothing left to finalize here beyond the state transition the caller performs.
    debug_assert!(fields.iter().any(|f| f.id == name));
}

#[cfg(test)]
mod tests {
    #[test]
    fn simple_byte_fields() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits\n\
                   a,first,int,0,8\n\
                   b,second,int,8,8\n";
        let schema = match Schema::load(csv, 2) {
            Ok(schema) => schema,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.fields[0].id, "a");
        assert_eq!(schema.fields[1].id, "b");
        assert_eq!(schema.template.total_len(), 2);
        Ok(())
    }

    #[test]
    fn bitfield_grouping() -> Result<(), String> {
        use super::*;
        // S2-style: two sub-fields sharing one octet.
        let csv = "id,description,type,offset,bits\n\
                   talk_permit_tone,tpt,int,0,2\n\
                   disable_all_tone,dat,int,2,1\n";
        let schema = match Schema::load(csv, 1) {
            Ok(schema) => schema,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].id, "bitfield1");
        assert_eq!(schema.fields[0].ty, FieldType::Bitfield);
        assert_eq!(schema.fields[0].constituents, vec!["talk_permit_tone", "disable_all_tone"]);
        assert_eq!(schema.fields[1].bitfield.as_deref(), Some("bitfield1"));
        Ok(())
    }

    #[test]
    fn gap_inserts_padding() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits\n\
                   a,first,int,8,8\n";
        let schema = match Schema::load(csv, 2) {
            Ok(schema) => schema,
            Err(e) => return Err(format!("{}", e)),
        };
        assert!(matches!(schema.template.slots()[0], Slot::Padding(1)));
        Ok(())
    }

    #[test]
    fn straddling_subfield_is_rejected() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits\n\
                   a,first,int,6,4\n";
        match Schema::load(csv, 1) {
            Ok(_) => Err(String::from("a sub-field straddling an octet boundary should have been rejected")),
            Err(_) => Ok(()),
        }
    }

    #[test]
    fn non_monotone_offsets_are_rejected() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits\n\
                   a,first,int,8,8\n\
                   b,second,int,0,8\n";
        match Schema::load(csv, 2) {
            Ok(_) => Err(String::from("a non-monotone offset should have been rejected")),
            Err(_) => Ok(()),
        }
    }

    #[test]
    fn trailing_padding_to_record_length() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits\n\
                   a,first,int,0,8\n";
        let schema = match Schema::load(csv, 4) {
            Ok(schema) => schema,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(schema.template.total_len(), 4);
        Ok(())
    }

    #[test]
    fn structural_mismatch_when_schema_overruns_record_length() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits\n\
                   a,first,int,0,16\n";
        match Schema::load(csv, 1) {
            Ok(_) => Err(String::from("a schema wider than record_length should have been rejected")),
            Err(_) => Ok(()),
        }
    }

    #[test]
    fn lut_and_allowed_values_parse() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits,allowed_values,lut\n\
                   mode,mode,int,0,8,,0:MR;255:CH\n";
        let schema = match Schema::load(csv, 1) {
            Ok(schema) => schema,
            Err(e) => return Err(format!("{}", e)),
        };
        let lut = match schema.fields[0].lut.as_ref() {
            Some(lut) => lut,
            None => return Err(String::from("expected a lut")),
        };
        match lut.get(&255) {
            Some(label) => assert_eq!(label, "CH"),
            None => return Err(String::from("lut is missing key 255")),
        }
        Ok(())
    }

    #[test]
    fn transform_list_parses() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits,transform\n\
                   tx_preamble,tp,int,0,8,\"multiply_by:60\"\n";
        let schema = match Schema::load(csv, 1) {
            Ok(schema) => schema,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(schema.fields[0].transform, vec![Transform::MultiplyBy(60)]);
        Ok(())
    }

    #[test]
    fn unknown_transform_is_schema_malformed() -> Result<(), String> {
        use super::*;
        let csv = "id,description,type,offset,bits,transform\n\
                   a,a,int,0,8,bogus:1\n";
        match Schema::load(csv, 1) {
            Ok(_) => Err(String::from("an unrecognized transform name should have been rejected")),
            Err(_) => Ok(()),
        }
    }
}
