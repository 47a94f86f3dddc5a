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
//! image
//!
//! # Introduction
//!
//! The image façade (spec §4.7): the sole public entry point. Owns one [`Table`] per
//! [`TableKind`], their fixed geometries, and the original image buffer (kept around so `dump`
//! can splice each table's region back in while leaving undeclared bytes-- headers, inter-table
//! gaps-- exactly as they were read).

use crate::error::Result;
use crate::table::{Geometry, Table, TableKind};

const SETTINGS_SCHEMA: &str = include_str!("../schemas/settings.csv");
const CHANNEL_SCHEMA: &str = include_str!("../schemas/channel.csv");
const CONTACT_SCHEMA: &str = include_str!("../schemas/contact.csv");
const RXGROUP_SCHEMA: &str = include_str!("../schemas/rxgroup.csv");
const SCANLIST_SCHEMA: &str = include_str!("../schemas/scanlist.csv");
const TEXTMESSAGE_SCHEMA: &str = include_str!("../schemas/textmessage.csv");
const ZONE_SCHEMA: &str = include_str!("../schemas/zone.csv");

fn geometry(kind: TableKind) -> Geometry {
    match kind {
        TableKind::Settings => Geometry {
            first_record_offset: 8805,
            record_length: 144,
            num_records: 1,
            zero_value: 0xFF,
            deletion: (0, 0x01),
        },
        TableKind::Channel => Geometry {
            first_record_offset: 127013,
            record_length: 64,
            num_records: 1000,
            zero_value: 0xFF,
            deletion: (16, 0xFF),
        },
        TableKind::Contact => Geometry {
            first_record_offset: 24997,
            record_length: 36,
            num_records: 1000,
            zero_value: 0xFF,
            deletion: (4, 0x00),
        },
        TableKind::RxGroup => Geometry {
            first_record_offset: 60997,
            record_length: 96,
            num_records: 250,
            zero_value: 0x00,
            deletion: (0, 0x00),
        },
        TableKind::Scanlist => Geometry {
            first_record_offset: 100997,
            record_length: 104,
            num_records: 250,
            zero_value: 0x00,
            deletion: (0, 0x00),
        },
        TableKind::Textmessage => Geometry {
            first_record_offset: 9125,
            record_length: 288,
            num_records: 50,
            zero_value: 0x00,
            deletion: (0, 0x00),
        },
        TableKind::Zone => Geometry {
            first_record_offset: 84997,
            record_length: 64,
            num_records: 250,
            zero_value: 0x00,
            deletion: (0, 0x00),
        },
    }
}

fn schema_csv(kind: TableKind) -> &'static str {
    match kind {
        TableKind::Settings => SETTINGS_SCHEMA,
        TableKind::Channel => CHANNEL_SCHEMA,
        TableKind::Contact => CONTACT_SCHEMA,
        TableKind::RxGroup => RXGROUP_SCHEMA,
        TableKind::Scanlist => SCANLIST_SCHEMA,
        TableKind::Textmessage => TEXTMESSAGE_SCHEMA,
        TableKind::Zone => ZONE_SCHEMA,
    }
}

/// The codeplug image: one table per kind, plus the original bytes it was built from.
pub struct Image {
    settings: Table,
    channel: Table,
    contact: Table,
    rxgroup: Table,
    scanlist: Table,
    textmessage: Table,
    zone: Table,
    original: Vec<u8>,
}

impl Image {
    fn table(&self, kind: TableKind) -> &Table {
        match kind {
            TableKind::Settings => &self.settings,
            TableKind::Channel => &self.channel,
            TableKind::Contact => &self.contact,
            TableKind::RxGroup => &self.rxgroup,
            TableKind::Scanlist => &self.scanlist,
            TableKind::Textmessage => &self.textmessage,
            TableKind::Zone => &self.zone,
        }
    }

    fn table_mut(&mut self, kind: TableKind) -> &mut Table {
        match kind {
            TableKind::Settings => &mut self.settings,
            TableKind::Channel => &mut self.channel,
            TableKind::Contact => &mut self.contact,
            TableKind::RxGroup => &mut self.rxgroup,
            TableKind::Scanlist => &mut self.scanlist,
            TableKind::Textmessage => &mut self.textmessage,
            TableKind::Zone => &mut self.zone,
        }
    }

    /// Parse every table out of `image_bytes`, in the fixed order spec §4.7 mandates.
    pub fn from_bytes(image_bytes: Vec<u8>) -> Result<Image> {
        let mut image = Image {
            settings: Table::new(TableKind::Settings, geometry(TableKind::Settings), schema_csv(TableKind::Settings))?,
            channel: Table::new(TableKind::Channel, geometry(TableKind::Channel), schema_csv(TableKind::Channel))?,
            contact: Table::new(TableKind::Contact, geometry(TableKind::Contact), schema_csv(TableKind::Contact))?,
            rxgroup: Table::new(TableKind::RxGroup, geometry(TableKind::RxGroup), schema_csv(TableKind::RxGroup))?,
            scanlist: Table::new(TableKind::Scanlist, geometry(TableKind::Scanlist), schema_csv(TableKind::Scanlist))?,
            textmessage: Table::new(
                TableKind::Textmessage,
                geometry(TableKind::Textmessage),
                schema_csv(TableKind::Textmessage),
            )?,
            zone: Table::new(TableKind::Zone, geometry(TableKind::Zone), schema_csv(TableKind::Zone))?,
            original: image_bytes,
        };

        for kind in TableKind::ALL {
            image.table_mut(kind).load(&image.original)?;
        }
        log::info!("loaded codeplug image ({} bytes)", image.original.len());
        Ok(image)
    }

    pub fn settings(&self) -> &Table {
        &self.settings
    }
    pub fn channel(&self) -> &Table {
        &self.channel
    }
    pub fn contact(&self) -> &Table {
        &self.contact
    }
    pub fn rxgroup(&self) -> &Table {
        &self.rxgroup
    }
    pub fn scanlist(&self) -> &Table {
        &self.scanlist
    }
    pub fn textmessage(&self) -> &Table {
        &self.textmessage
    }
    pub fn zone(&self) -> &Table {
        &self.zone
    }

    pub fn settings_mut(&mut self) -> &mut Table {
        &mut self.settings
    }
    pub fn channel_mut(&mut self) -> &mut Table {
        &mut self.channel
    }
    pub fn contact_mut(&mut self) -> &mut Table {
        &mut self.contact
    }
    pub fn rxgroup_mut(&mut self) -> &mut Table {
        &mut self.rxgroup
    }
    pub fn scanlist_mut(&mut self) -> &mut Table {
        &mut self.scanlist
    }
    pub fn textmessage_mut(&mut self) -> &mut Table {
        &mut self.textmessage
    }
    pub fn zone_mut(&mut self) -> &mut Table {
        &mut self.zone
    }

    /// Table of a given kind, for callers that already have a [`TableKind`] in hand.
    pub fn by_kind(&self, kind: TableKind) -> &Table {
        self.table(kind)
    }

    pub fn by_kind_mut(&mut self, kind: TableKind) -> &mut Table {
        self.table_mut(kind)
    }

    /// Serialize every table back into a full image, splicing each table's dumped bytes into a
    /// copy of the original buffer-- bytes not covered by any table are preserved untouched.
    pub fn dump(&self) -> Result<Vec<u8>> {
        let mut out = self.original.clone();
        for kind in TableKind::ALL {
            let table = self.table(kind);
            let bytes = table.dump()?;
            let geom = table.geometry();
            out[geom.first_record_offset..geom.first_record_offset + bytes.len()]
                .copy_from_slice(&bytes);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_image() -> Vec<u8> {
        // Large enough to hold every table's declared extent; filled with each table's own
        // zero_value is not possible with one fill byte, so start all-zero and let Channel's
        // rows (zero_value 0xFF) simply decode as all-zero rather than all-unset; that's fine
        // for a structural smoke test. A handful of bytes are patched so every row still passes
        // its declared bounds: Settings' scan hangtimes have a minimum of 5, and Channel's
        // repeater_slot only allows 1 or 2.
        let mut bytes = vec![0u8; 300_000];
        bytes[8805 + 83] = 5; // settings.scan_digital_hangtime
        bytes[8805 + 84] = 5; // settings.scan_analog_hangtime
        for i in 0..1000 {
            bytes[127013 + i * 64 + 8] = 1; // channel[i].repeater_slot
        }
        bytes
    }

    #[test]
    fn from_bytes_loads_every_table() -> Result<(), String> {
        let image = match Image::from_bytes(blank_image()) {
            Ok(image) => image,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(image.settings().rows().len(), 1);
        assert_eq!(image.channel().rows().len(), 1000);
        assert_eq!(image.contact().rows().len(), 1000);
        assert_eq!(image.rxgroup().rows().len(), 250);
        assert_eq!(image.scanlist().rows().len(), 250);
        assert_eq!(image.textmessage().rows().len(), 50);
        assert_eq!(image.zone().rows().len(), 250);
        Ok(())
    }

    #[test]
    fn dump_round_trips_a_blank_image() -> Result<(), String> {
        let bytes = blank_image();
        let image = match Image::from_bytes(bytes.clone()) {
            Ok(image) => image,
            Err(e) => return Err(format!("{}", e)),
        };
        let dumped = match image.dump() {
            Ok(dumped) => dumped,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(dumped, bytes);
        Ok(())
    }

    #[test]
    fn dump_preserves_bytes_outside_any_table() -> Result<(), String> {
        let mut bytes = blank_image();
        bytes[0] = 0x42; // well before the Settings table's first_record_offset
        let image = match Image::from_bytes(bytes.clone()) {
            Ok(image) => image,
            Err(e) => return Err(format!("{}", e)),
        };
        let dumped = match image.dump() {
            Ok(dumped) => dumped,
            Err(e) => return Err(format!("{}", e)),
        };
        assert_eq!(dumped[0], 0x42);
        Ok(())
    }
}
