// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Type-erased component columns.
//!
//! A column stores one component type for one archetype. The archetype and
//! registry only ever see the erased capability set; typed access goes
//! through `as_any` downcasts at the call sites that statically know `T`.

use std::any::{Any, TypeId};

use serde_json::Value;

use crate::access::ColumnAccess;
use crate::component::Component;
use crate::segvec::SegVec;

/// Erased capability set shared by every column.
pub(crate) trait Column: Send + Sync {
    /// Number of rows.
    fn len(&self) -> usize;

    /// Size of one element in bytes.
    fn element_size(&self) -> usize;

    /// Mangled name of the stored type.
    fn type_name(&self) -> &'static str;

    /// TypeId of the stored type.
    fn type_id_of(&self) -> TypeId;

    /// Append a default-constructed row.
    fn push_default(&mut self);

    /// Drop the last row.
    fn pop_row(&mut self);

    /// Erase `row` by swapping the last row over it. Returns whether a swap
    /// occurred (false when `row` was the last row).
    fn swap_remove_row(&mut self, row: usize) -> bool;

    /// Swap two rows.
    fn swap_rows(&mut self, a: usize, b: usize);

    /// Append a copy of `source[row]`. `source` must store the same type.
    fn copy_push_from(&mut self, source: &dyn Column, row: usize);

    /// A fresh, empty column of the same concrete type.
    fn clone_empty(&self) -> Box<dyn Column>;

    /// Drop every row, retaining one segment.
    fn clear(&mut self);

    /// Snapshot encoding of one row.
    fn value_json(&self, row: usize) -> Value;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Concrete column over a segmented vector of `T`.
pub(crate) struct TypedColumn<T: Component> {
    rows: SegVec<T>,
    access: ColumnAccess,
}

impl<T: Component> TypedColumn<T> {
    pub fn with_segment_bits(segment_bits: u32) -> Self {
        Self {
            rows: SegVec::with_segment_bits(segment_bits),
            access: ColumnAccess::new(),
        }
    }

    pub fn push(&mut self, value: T) {
        let _w = self.access.write();
        self.rows.push(value);
    }

    pub fn get(&self, row: usize) -> Option<&T> {
        let _r = self.access.read();
        self.rows.get(row)
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        let _w = self.access.write();
        self.rows.get_mut(row)
    }

    pub fn put(&mut self, row: usize, value: T) -> Option<()> {
        let _w = self.access.write();
        *self.rows.get_mut(row)? = value;
        Some(())
    }
}

impl<T: Component> Column for TypedColumn<T> {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn element_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn type_id_of(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn push_default(&mut self) {
        self.push(T::default());
    }

    fn pop_row(&mut self) {
        let _w = self.access.write();
        self.rows.pop();
    }

    fn swap_remove_row(&mut self, row: usize) -> bool {
        let _w = self.access.write();
        let swapped = row + 1 < self.rows.len();
        self.rows.swap_remove(row);
        swapped
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        let _w = self.access.write();
        self.rows.swap(a, b);
    }

    fn copy_push_from(&mut self, source: &dyn Column, row: usize) {
        let source = source
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
            .expect("column type mismatch in row copy");
        let value = source.rows[row].clone();
        self.push(value);
    }

    fn clone_empty(&self) -> Box<dyn Column> {
        Box::new(TypedColumn::<T>::with_segment_bits(
            self.rows.segment_bits(),
        ))
    }

    fn clear(&mut self) {
        let _w = self.access.write();
        self.rows.clear();
    }

    fn value_json(&self, row: usize) -> Value {
        match self.rows.get(row) {
            Some(value) => json_primitive(value as &dyn Any),
            None => Value::Null,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Encode a value under the snapshot contract: integers and floats as JSON
/// numbers, bools as JSON bools, strings and chars as JSON strings, anything
/// else as the literal `"<unknown>"`.
fn json_primitive(value: &dyn Any) -> Value {
    macro_rules! encode {
        ($($ty:ty),+ $(,)?) => {
            $(if let Some(v) = value.downcast_ref::<$ty>() {
                return Value::from(v.clone());
            })+
        };
    }
    encode!(
        i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, String, &'static str,
    );
    if let Some(v) = value.downcast_ref::<char>() {
        return Value::String(v.to_string());
    }
    Value::String("<unknown>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erased_push_and_copy() {
        let mut a = TypedColumn::<u32>::with_segment_bits(2);
        a.push(11);
        a.push(22);

        let mut b = a.clone_empty();
        assert_eq!(b.len(), 0);
        b.copy_push_from(&a, 1);
        assert_eq!(b.len(), 1);

        let b = b.as_any().downcast_ref::<TypedColumn<u32>>().unwrap();
        assert_eq!(b.get(0), Some(&22));
        // Source row is untouched by the copy.
        assert_eq!(a.get(1), Some(&22));
    }

    #[test]
    fn swap_remove_reports_swap() {
        let mut col = TypedColumn::<i64>::with_segment_bits(2);
        for i in 0..4 {
            col.push(i);
        }
        assert!(col.swap_remove_row(0));
        assert_eq!(col.get(0), Some(&3));
        // Erasing the (new) last row needs no swap.
        assert!(!col.swap_remove_row(2));
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn swap_and_pop_through_the_erased_surface() {
        let mut col: Box<dyn Column> = Box::new(TypedColumn::<u32>::with_segment_bits(1));
        let typed = |c: &Box<dyn Column>, row: usize| {
            c.as_any()
                .downcast_ref::<TypedColumn<u32>>()
                .unwrap()
                .get(row)
                .copied()
        };
        for i in 0..4u32 {
            col.as_any_mut()
                .downcast_mut::<TypedColumn<u32>>()
                .unwrap()
                .push(i);
        }
        col.swap_rows(0, 3);
        assert_eq!(typed(&col, 0), Some(3));
        assert_eq!(typed(&col, 3), Some(0));
        col.pop_row();
        assert_eq!(col.len(), 3);
    }

    #[test]
    fn default_rows_append() {
        let mut col: Box<dyn Column> = Box::new(TypedColumn::<String>::with_segment_bits(2));
        col.push_default();
        assert_eq!(col.len(), 1);
        assert_eq!(col.value_json(0), Value::String(String::new()));
    }

    #[test]
    fn json_encodings() {
        let mut ints = TypedColumn::<u32>::with_segment_bits(2);
        ints.push(7);
        assert_eq!(ints.value_json(0), Value::from(7u32));

        let mut floats = TypedColumn::<f32>::with_segment_bits(2);
        floats.push(2.5);
        assert_eq!(floats.value_json(0), Value::from(2.5f32));

        let mut chars = TypedColumn::<char>::with_segment_bits(2);
        chars.push('x');
        assert_eq!(chars.value_json(0), Value::String("x".into()));

        #[derive(Clone, Default)]
        struct Opaque;
        let mut opaque = TypedColumn::<Opaque>::with_segment_bits(2);
        opaque.push(Opaque);
        assert_eq!(opaque.value_json(0), Value::String("<unknown>".into()));
    }
}
