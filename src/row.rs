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
//! row
//!
//! # Introduction
//!
//! One record's worth of field values, in schema order, plus the `deleted` flag. Per Design Note
//! "Ordered mapping with shadow key", `deleted` is *not* an in-band entry in the field map-- it
//! cannot be, since `Row["deleted"]` and `Row["some_field"]` would need different output types
//! for a single `Index` impl to work, so this is a plain struct with explicit accessors rather
//! than operator-overload sugar.

use crate::field::FieldValue;

use std::collections::HashMap;

/// An ordered mapping from field id to field value for one record slot, plus the `deleted` flag,
/// which is addressable but outside the iteration surface (spec §4.5).
#[derive(Debug)]
pub struct Row {
    order: Vec<String>,
    fields: HashMap<String, FieldValue>,
    deleted: bool,
}

impl Row {
    pub fn new(order: Vec<String>, fields: HashMap<String, FieldValue>, deleted: bool) -> Row {
        Row {
            order,
            fields,
            deleted,
        }
    }

    pub fn deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.fields.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut FieldValue> {
        self.fields.get_mut(id)
    }

    /// Remove a field from both the backing map and the ordered-id list-- used to drop grouping
    /// octets once their constituents have been populated (spec §4.6 step 2e).
    pub fn remove(&mut self, id: &str) {
        self.fields.remove(id);
        self.order.retain(|existing| existing != id);
    }

    /// Field ids in schema order. Never includes `"deleted"`.
    pub fn field_names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.order
            .iter()
            .filter_map(move |id| self.fields.get(id).map(|fv| (id, fv)))
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::{FieldDescriptor, FieldType};
    use std::rc::Rc;

    fn field(id: &str) -> (String, crate::field::FieldValue) {
        let desc = Rc::new(FieldDescriptor {
            id: id.to_string(),
            description: String::new(),
            offset: 0,
            bits: 8,
            ty: FieldType::Int,
            min_value: None,
            max_value: None,
            allowed_values: None,
            lut: None,
            transform: Vec::new(),
            tentative: false,
            bitfield: None,
            constituents: Vec::new(),
        });
        (id.to_string(), crate::field::FieldValue::unloaded(desc))
    }

    #[test]
    fn deleted_is_not_in_the_iteration_order() -> Result<(), String> {
        use super::*;
        let (id, fv) = field("a");
        let mut fields = HashMap::new();
        fields.insert(id.clone(), fv);
        let row = Row::new(vec![id], fields, true);
        assert!(row.deleted());
        assert_eq!(row.len(), 1);
        assert!(row.iter().all(|(k, _)| k != "deleted"));
        Ok(())
    }

    #[test]
    fn remove_drops_from_order_and_map() -> Result<(), String> {
        use super::*;
        let (id_a, fv_a) = field("a");
        let (id_b, fv_b) = field("b");
        let mut fields = HashMap::new();
        fields.insert(id_a.clone(), fv_a);
        fields.insert(id_b.clone(), fv_b);
        let mut row = Row::new(vec![id_a.clone(), id_b.clone()], fields, false);
        row.remove(&id_a);
        assert_eq!(row.len(), 1);
        assert!(row.get(&id_a).is_none());
        assert!(row.get(&id_b).is_some());
        Ok(())
    }

    #[test]
    fn set_deleted_is_independent_of_fields() -> Result<(), String> {
        use super::*;
        let (id, fv) = field("a");
        let mut fields = HashMap::new();
        fields.insert(id.clone(), fv);
        let mut row = Row::new(vec![id], fields, false);
        row.set_deleted(true);
        row.set_deleted(false);
        assert!(!row.deleted());
        assert_eq!(row.len(), 1);
        Ok(())
    }
}
