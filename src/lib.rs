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
//! codeplug
//!
//! # Introduction
//!
//! A data-driven binary-record codec for Tytera MD-380 family "codeplug" images: the ~256 KiB
//! file that holds a handheld DMR radio's general settings plus its fixed-capacity tables of
//! channels, contacts, receive-group lists, scan lists, text messages and zones.
//!
//! This crate does *not* talk to a radio, infer a schema, or provide a CLI-- it reads a schema
//! (bundled in) and an image buffer the caller already has in hand, and hands back strongly
//! typed, validated rows; [`Image::dump`] does the reverse. See [`Image`] for the entry point.
//!
//! # Discussion
//!
//! ## Records, fields, and bitfields
//!
//! Every table ([`TableKind`]) is a fixed-size array of fixed-length records. Each record is
//! described by a schema (see [`schema`]): a sequence of fields, most byte-aligned, a few
//! bit-packed sub-fields sharing a single octet with their neighbors (a "bitfield group"). The
//! schema loader turns that declaration into a [`template::Template`]-- a recipe for carving one
//! record's bytes into named raw values-- and [`table::Table`] applies it to every record slot,
//! explodes bitfield groups into their named constituents, and validates the result.
//!
//! ## The "unset" sentinel
//!
//! Each table has a `zero_value` (`0x00` or `0xFF`) that its unprogrammed fields are filled
//! with. A field whose raw bytes are all `zero_value` displays as `"Unset/Disabled"`, *unless*
//! it has a lookup table containing that exact numeric value, in which case the lookup label
//! wins (e.g. Settings' `mode` field: `0xFF` is both "unset" and the documented "CH" value).
//! See [`field::FieldValue::display`].

pub mod error;
pub mod field;
pub mod image;
pub mod primitives;
pub mod row;
pub mod schema;
pub mod table;
pub mod template;

pub use error::{Cause, Error, Result};
pub use field::FieldValue;
pub use image::Image;
pub use row::Row;
pub use table::{Geometry, Table, TableKind};
