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
//! error
//!
//! The single error type returned by every public operation in this crate.
//!
//! Every component-- the schema loader, the struct-template builder, the field-value model, the
//! row model and the table engine-- raises the *same* [`Error`], just filled in with whatever
//! context it has at hand. A lower layer that doesn't yet know which table or row it's working on
//! (e.g. [`crate::primitives`], which decodes a handful of bytes with no notion of "table") leaves
//! those fields unset; the table engine (the first layer that *does* know) fills them in as the
//! error propagates back out via `?`.

use parse_display::Display;

use crate::table::TableKind;

use std::fmt;

/// The enumerated reason an [`Error`] occurred. This mirrors the error taxonomy in the codec's
/// design: a schema that doesn't parse, a declared geometry that doesn't fit the image, a value
/// that can't be decoded, a value that fails its declared constraints, or a value that can't be
/// squeezed back into its declared width on dump.
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy)]
pub enum Cause {
    /// A schema row violates one of the schema invariants (non-monotone offsets, a sub-field
    /// straddling an octet, a wide field whose width isn't a multiple of 8, a missing id, &c).
    #[display("schema is malformed")]
    SchemaMalformed,
    /// The table's declared geometry doesn't fit the image, or the struct template's size doesn't
    /// match the table's declared record length.
    #[display("declared table geometry does not match the image")]
    StructuralMismatch,
    /// A raw value could not be decoded (malformed BCD digit, invalid UTF-16, a non-ASCII byte in
    /// an ascii field, an unrecognized BCDT squelch-type code).
    #[display("could not decode a field's raw value")]
    DecodeError,
    /// A field's value violates its declared `min_value`/`max_value`/`allowed_values`.
    #[display("a field's value failed validation")]
    ValidationFailed,
    /// On dump, a value doesn't fit its declared width (BCD overflow, oversized string, &c).
    #[display("a value does not fit its declared width")]
    CapacityExceeded,
    /// An error in another crate took place-- cf. source.
    #[display("an error in another crate took place-- cf. source")]
    Other,
}

/// Structured context attached to every [`Error`]: which table, which record, which field. Any of
/// these may be unknown at the point the error was first raised (e.g. [`crate::primitives`]
/// doesn't know about tables at all); they are filled in by the first caller who does know.
#[derive(Debug, Default, Clone)]
struct Context {
    table_kind: Option<TableKind>,
    row_index: Option<usize>,
    field_id: Option<String>,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table: {}, row: {}, field: {}",
            self.table_kind
                .map(|k| format!("{}", k))
                .unwrap_or_else(|| "?".to_string()),
            self.row_index
                .map(|i| i.to_string())
                .unwrap_or_else(|| "?".to_string()),
            self.field_id.as_deref().unwrap_or("?"),
        )
    }
}

/// The error type returned by every public operation in this crate.
#[derive(Debug, Display)]
#[display("{cause}: {reason} ({context}) Source (if any): {source} Stack trace (if any): {trace}")]
pub struct Error {
    /// Enumerated reason for this error
    #[display("{}")]
    cause: Cause,
    /// Human-readable detail-- synthesized once, at the point of failure
    reason: String,
    #[display("{}")]
    context: Context,
    // This is an Option that may contain a Box containing something that implements
    // std::error::Error. It is still unclear to me how this satisfies the lifetime bound in
    // std::error::Error::source, which additionally mandates that the boxed thing have 'static
    // lifetime. There is a discussion of this at
    // <https://users.rust-lang.org/t/what-does-it-mean-to-return-dyn-error-static/37619/6>,
    // but at the time of this writing, i cannot follow it.
    #[display("{:#?}")]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    /// Optional backtrace
    #[display("{:#?}")]
    trace: Option<backtrace::Backtrace>,
}

impl Error {
    pub(crate) fn new(cause: Cause, reason: impl Into<String>) -> Error {
        Error {
            cause,
            reason: reason.into(),
            context: Context::default(),
            source: None,
            trace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Attach the table this error occurred in, if not already set.
    pub(crate) fn in_table(mut self, kind: TableKind) -> Self {
        self.context.table_kind.get_or_insert(kind);
        self
    }

    /// Attach the record index this error occurred at, if not already set.
    pub(crate) fn at_row(mut self, row_index: usize) -> Self {
        self.context.row_index.get_or_insert(row_index);
        self
    }

    /// Attach the field id this error occurred at, if not already set.
    pub(crate) fn at_field(mut self, field_id: impl Into<String>) -> Self {
        self.context.field_id.get_or_insert(field_id.into());
        self
    }

    /// Attach a lower-level error as this error's source.
    pub(crate) fn with_source<E>(mut self, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(err));
        self
    }

    pub fn cause(&self) -> Cause {
        self.cause
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn table_kind(&self) -> Option<TableKind> {
        self.context.table_kind
    }

    pub fn row_index(&self) -> Option<usize> {
        self.context.row_index
    }

    pub fn field_id(&self) -> Option<&str> {
        self.context.field_id.as_deref()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(bx) => Some(bx.as_ref()),
            None => None,
        }
    }
}

impl std::convert::From<std::string::FromUtf16Error> for Error {
    fn from(err: std::string::FromUtf16Error) -> Self {
        Error::new(Cause::DecodeError, "invalid UTF-16 sequence").with_source(err)
    }
}

impl std::convert::From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::new(Cause::DecodeError, "invalid UTF-8 sequence").with_source(err)
    }
}

impl std::convert::From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::new(Cause::SchemaMalformed, "failed to parse schema file").with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
