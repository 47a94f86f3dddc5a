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
//! table
//!
//! # Introduction
//!
//! The table engine (spec §4.6): for one table kind's fixed geometry and schema, loads every
//! record slot out of an image into a [`crate::row::Row`], and dumps rows back into bytes.

use crate::error::{Cause, Error, Result};
use crate::field::{FieldValue, RawStorage};
use crate::row::Row;
use crate::schema::{FieldType, Schema};
use crate::template::RawValue;

use parse_display::Display;

use std::collections::HashMap;
use std::rc::Rc;

/// The closed set of codeplug table kinds (spec §3).
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy, Hash)]
pub enum TableKind {
    Settings,
    Channel,
    Contact,
    RxGroup,
    Scanlist,
    Textmessage,
    Zone,
}

impl TableKind {
    /// All seven kinds, in the load order the image façade uses (spec §4.7).
    pub const ALL: [TableKind; 7] = [
        TableKind::Settings,
        TableKind::Channel,
        TableKind::Contact,
        TableKind::RxGroup,
        TableKind::Scanlist,
        TableKind::Textmessage,
        TableKind::Zone,
    ];
}

/// A table kind's fixed, immutable record geometry (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub first_record_offset: usize,
    pub record_length: usize,
    pub num_records: usize,
    pub zero_value: u8,
    /// `(byte offset within record, marker value)`.
    pub deletion: (usize, u8),
}

/// One table: its kind, geometry, loaded schema, and (once `load` has run) its rows.
#[derive(Debug)]
pub struct Table {
    kind: TableKind,
    geometry: Geometry,
    schema: Schema,
    descriptors_by_id: HashMap<String, Rc<crate::schema::FieldDescriptor>>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(kind: TableKind, geometry: Geometry, schema_csv: &str) -> Result<Table> {
        let schema = Schema::load(schema_csv, geometry.record_length)
            .map_err(|e| e.in_table(kind))?;
        let descriptors_by_id = schema
            .fields
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();
        Ok(Table {
            kind,
            geometry,
            schema,
            descriptors_by_id,
            rows: Vec::new(),
        })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    /// Field ids in schema order, excluding grouping octets (spec §6 public API).
    pub fn field_names(&self) -> Vec<String> {
        self.schema
            .fields
            .iter()
            .filter(|d| d.ty != FieldType::Bitfield)
            .map(|d| d.id.clone())
            .collect()
    }

    fn record_slice<'a>(&self, image: &'a [u8], i: usize) -> Result<&'a [u8]> {
        let start = self.geometry.first_record_offset + i * self.geometry.record_length;
        let end = start + self.geometry.record_length;
        if end > image.len() {
            return Err(Error::new(
                Cause::StructuralMismatch,
                format!(
                    "record {i} of {} extends to byte {end}, image is only {} bytes",
                    self.kind,
                    image.len()
                ),
            )
            .in_table(self.kind)
            .at_row(i));
        }
        Ok(&image[start..end])
    }

    /// Load every record slot out of `image`, per spec §4.6.
    pub fn load(&mut self, image: &[u8]) -> Result<()> {
        let total_extent =
            self.geometry.first_record_offset + self.geometry.num_records * self.geometry.record_length;
        if total_extent > image.len() {
            return Err(Error::new(
                Cause::StructuralMismatch,
                format!(
                    "{} declares an extent of {total_extent} bytes, image is only {} bytes",
                    self.kind,
                    image.len()
                ),
            )
            .in_table(self.kind));
        }

        let mut rows = Vec::with_capacity(self.geometry.num_records);
        let mut num_deleted = 0usize;
        for i in 0..self.geometry.num_records {
            let record = self.record_slice(image, i)?;
            let deleted = record[self.geometry.deletion.0] == self.geometry.deletion.1;
            if deleted {
                num_deleted += 1;
            }

            let order: Vec<String> = self.schema.fields.iter().map(|d| d.id.clone()).collect();
            let fields: HashMap<String, FieldValue> = self
                .schema
                .fields
                .iter()
                .map(|d| (d.id.clone(), FieldValue::unloaded(d.clone())))
                .collect();
            let mut row = Row::new(order, fields, deleted);

            let carved = self
                .schema
                .template
                .apply(record)
                .map_err(|e| e.in_table(self.kind).at_row(i))?;

            let mut groups_to_remove = Vec::new();
            for (name, raw) in carved {
                let descriptor = self.descriptors_by_id.get(&name).ok_or_else(|| {
                    Error::new(Cause::StructuralMismatch, format!("unknown field {name:?} in template"))
                        .in_table(self.kind)
                        .at_row(i)
                })?;

                if descriptor.ty == FieldType::Bitfield {
                    let octet = raw
                        .as_u64()
                        .map_err(|e| e.in_table(self.kind).at_row(i).at_field(name.clone()))?
                        as u8;
                    for constituent_id in &descriptor.constituents {
                        let constituent = self.descriptors_by_id.get(constituent_id).ok_or_else(|| {
                            Error::new(
                                Cause::StructuralMismatch,
                                format!("unknown constituent {constituent_id:?}"),
                            )
                            .in_table(self.kind)
                            .at_row(i)
                        })?;
                        let shift = constituent.offset % 8;
                        let mask: u32 = (1u32 << constituent.bits) - 1;
                        let value = ((octet as u32 >> shift) & mask) as u64;
                        let fv = row.get_mut(constituent_id).ok_or_else(|| {
                            Error::new(
                                Cause::StructuralMismatch,
                                format!("row is missing constituent {constituent_id:?}"),
                            )
                            .in_table(self.kind)
                            .at_row(i)
                        })?;
                        fv.set_raw(RawStorage::Int(value));
                        fv.set_containing_octet(octet);
                        fv.validate()
                            .map_err(|e| e.in_table(self.kind).at_row(i))?;
                    }
                    groups_to_remove.push(name);
                } else {
                    let storage = match raw {
                        RawValue::U8(b) => RawStorage::Int(b as u64),
                        RawValue::Blob(bytes) => RawStorage::Blob(bytes),
                    };
                    let fv = row.get_mut(&name).ok_or_else(|| {
                        Error::new(Cause::StructuralMismatch, format!("row is missing field {name:?}"))
                            .in_table(self.kind)
                            .at_row(i)
                    })?;
                    fv.set_raw(storage);
                    fv.validate()
                        .map_err(|e| e.in_table(self.kind).at_row(i))?;
                }
            }
            for name in groups_to_remove {
                row.remove(&name);
            }

            log::debug!("{}: loaded record {i} (deleted={deleted})", self.kind);
            rows.push(row);
        }
        log::info!(
            "{}: loaded {} records, {} flagged deleted",
            self.kind,
            self.geometry.num_records,
            num_deleted
        );
        self.rows = rows;
        Ok(())
    }

    /// Serialize every row back into this table's byte region, per spec §4.6.
    pub fn dump(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.geometry.num_records * self.geometry.record_length);
        for (i, row) in self.rows.iter().enumerate() {
            let mut byte_map: HashMap<String, Vec<u8>> = HashMap::new();
            for descriptor in &self.schema.fields {
                if descriptor.ty == FieldType::Bitfield {
                    let mut octet: u32 = 0;
                    for constituent_id in &descriptor.constituents {
                        let constituent = self.descriptors_by_id.get(constituent_id).ok_or_else(|| {
                            Error::new(
                                Cause::StructuralMismatch,
                                format!("unknown constituent {constituent_id:?}"),
                            )
                            .in_table(self.kind)
                            .at_row(i)
                        })?;
                        let fv = row.get(constituent_id).ok_or_else(|| {
                            Error::new(
                                Cause::StructuralMismatch,
                                format!("row is missing field {constituent_id:?}"),
                            )
                            .in_table(self.kind)
                            .at_row(i)
                        })?;
                        let value = fv
                            .raw_u64()
                            .map_err(|e| e.in_table(self.kind).at_row(i))?;
                        let shift = constituent.offset % 8;
                        let mask: u32 = (1u32 << constituent.bits) - 1;
                        octet |= (value as u32 & mask) << shift;
                    }
                    byte_map.insert(descriptor.id.clone(), vec![octet as u8]);
                } else {
                    let fv = row.get(&descriptor.id).ok_or_else(|| {
                        Error::new(
                            Cause::StructuralMismatch,
                            format!("row is missing field {:?}", descriptor.id),
                        )
                        .in_table(self.kind)
                        .at_row(i)
                    })?;
                    let width = descriptor.bits / 8;
                    let bytes = fv
                        .encoded_bytes(width.max(1))
                        .map_err(|e| e.in_table(self.kind).at_row(i))?;
                    byte_map.insert(descriptor.id.clone(), bytes);
                }
            }

            let mut record = self
                .schema
                .template
                .assemble(|name| byte_map.get(name).map(|v| v.as_slice()), self.geometry.zero_value)
                .map_err(|e| e.in_table(self.kind).at_row(i))?;
            if row.deleted() {
                record[self.geometry.deletion.0] = self.geometry.deletion.1;
            }
            out.extend_from_slice(&record);
        }
        log::debug!("{}: dumped {} records", self.kind, self.rows.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry {
            first_record_offset: 0,
            record_length: 2,
            num_records: 2,
            zero_value: 0xFF,
            deletion: (0, 0xFF),
        }
    }

    fn csv() -> &'static str {
        "id,description,type,offset,bits\n\
         a,first,int,0,8\n\
         b,second,int,8,8\n"
    }

    #[test]
    fn load_then_dump_is_idempotent() -> Result<(), String> {
        let image = vec![0x01, 0x02, 0xFF, 0x03];
        let mut table = match Table::new(TableKind::Channel, geometry(), csv()) {
            Ok(table) => table,
            Err(e) => return Err(format!("{}", e)),
        };
        if let Err(e) = table.load(&image) {
            return Err(format!("{}", e));
        }
        assert_eq!(table.rows().len(), 2);
        assert!(!table.rows()[0].deleted());
        assert!(table.rows()[1].deleted());
        let dumped = match table.dump() {
            Ok(dumped) => dumped,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(dumped, image);
        Ok(())
    }

    #[test]
    fn deletion_marker_is_independent_of_other_fields() -> Result<(), String> {
        let image = vec![0x01, 0x02, 0xFF, 0x03];
        let mut table = match Table::new(TableKind::Channel, geometry(), csv()) {
            Ok(table) => table,
            Err(e) => return Err(format!("{}", e)),
        };
        if let Err(e) = table.load(&image) {
            return Err(format!("{}", e));
        }
        table.rows_mut()[0].set_deleted(true);
        table.rows_mut()[0].set_deleted(false);
        let dumped = match table.dump() {
            Ok(dumped) => dumped,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(dumped, image);
        Ok(())
    }

    #[test]
    fn load_rejects_image_too_small() -> Result<(), String> {
        let image = vec![0x01];
        let mut table = match Table::new(TableKind::Channel, geometry(), csv()) {
            Ok(table) => table,
            Err(e) => return Err(format!("{}", e)),
        };
        match table.load(&image) {
            Ok(_) => Err(String::from("a one-byte image should not satisfy a two-record table")),
            Err(_) => Ok(()),
        }
    }

    #[test]
    fn bitfield_round_trips() -> Result<(), String> {
        let csv = "id,description,type,offset,bits\n\
                   talk_permit_tone,tpt,int,0,2\n\
                   disable_all_tone,dat,int,2,1\n";
        let geometry = Geometry {
            first_record_offset: 0,
            record_length: 1,
            num_records: 1,
            zero_value: 0x00,
            deletion: (0, 0xFE),
        };
        let image = vec![0b10101011u8];
        let mut table = match Table::new(TableKind::Settings, geometry, csv) {
            Ok(table) => table,
            Err(e) => return Err(format!("{}", e)),
        };
        if let Err(e) = table.load(&image) {
            return Err(format!("{}", e));
        }
        let row = &table.rows()[0];
        let tpt = match row.get("talk_permit_tone") {
            Some(fv) => match fv.raw_u64() {
                Ok(v) => v,
                Err(e) => return Err(format!("{}", e)),
            },
            None => return Err(String::from("row is missing talk_permit_tone")),
        };
        assert_eq!(tpt, 3);
        let dat = match row.get("disable_all_tone") {
            Some(fv) => match fv.raw_u64() {
                Ok(v) => v,
                Err(e) => return Err(format!("{}", e)),
            },
            None => return Err(String::from("row is missing disable_all_tone")),
        };
        assert_eq!(dat, 0);
        let dumped = match table.dump() {
            Ok(dumped) => dumped,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(dumped, image);
        Ok(())
    }
}
