//! The indexed container.  See [`Array`].

use crate::{
  codec::{
    bounds_check, empty_container, read_len, read_u8, write_len, FormErr, Tag,
    TypeRegistry,
  },
  record::Record,
  value::Value,
  view::ByteView,
};
use core::fmt::{Debug, Formatter};
use smallvec::SmallVec;

/// An ordered, index-addressable collection of lazy records.
///
/// Materialization is total: the first access parses the element count and
/// the whole per-element size table, slicing every element into a
/// slice-backed [`Record`] without decoding any value.  Unlike [`Struct`],
/// there is no per-slot overlay: once materialized, the in-memory record list
/// is the single authority.
///
/// Wire layout (all length/count fields little-endian `i32`):
///
/// ```text
/// 0x02 · elementCount · elementCount × elementByteLen
///      · elementCount × element bytes
/// ```
///
/// Arrays nest freely: elements may be structs, other arrays, or any other
/// value kind, all sharing the parent's backing buffer until mutated.
///
/// [`Struct`]: crate::Struct
#[derive(Clone)]
pub struct Array {
  registry: TypeRegistry,
  backing:  ByteView,
  records:  Option<Vec<Record>>,
  dirty:    bool,
}

impl Array {
  /// Creates an empty array.
  pub fn new(registry: TypeRegistry) -> Self {
    Array::from_view(registry, empty_container(Tag::Array))
  }

  /// Creates a lazy array over an existing encoded buffer.
  ///
  /// The buffer is not inspected here; a malformed buffer surfaces as a
  /// decode fault on first access.
  pub fn from_view(
    registry: TypeRegistry,
    backing: impl Into<ByteView>,
  ) -> Self {
    Array {
      registry,
      backing: backing.into(),
      records: None,
      dirty: false,
    }
  }

  /// The registry this array encodes and decodes through.
  pub fn registry(&self) -> &TypeRegistry {
    &self.registry
  }

  /// Parses the backing buffer into records, if it hasn't been already.
  fn records_mut(&mut self) -> Result<&mut Vec<Record>, FormErr> {
    if self.records.is_none() {
      let bytes = self.backing.bytes();
      let cursor = &mut 0;
      let observed = Tag::from_byte(read_u8(bytes, cursor)?)?;
      if observed != Tag::Array {
        return Err(err!(
          trace,
          FormErr::UnexpectedTag {
            expected: Tag::Array,
            observed,
          }
        ));
      }
      let count = read_len(bytes, cursor)?;

      let mut sizes: SmallVec<[usize; 16]> = SmallVec::new();
      for _ in 0..count {
        sizes.push(read_len(bytes, cursor)?);
      }

      let mut records = Vec::new();
      for size in sizes {
        let start = *cursor;
        let end = start
          .checked_add(size)
          .ok_or_else(|| err!(trace, FormErr::LenOverflow(size)))?;
        bounds_check(bytes, end)?;
        *cursor = end;
        records.push(Record::from_view(self.backing.slice(start, end)?));
      }
      self.records = Some(records);
    }
    Ok(self.records.get_or_insert_with(Vec::new))
  }

  /// The number of elements, materializing if needed.
  pub fn len(&mut self) -> Result<usize, FormErr> {
    Ok(self.records_mut()?.len())
  }

  /// Returns `true` iff the array has no elements.
  pub fn is_empty(&mut self) -> Result<bool, FormErr> {
    Ok(self.records_mut()?.is_empty())
  }

  /// Returns element `index`, decoding it on first access.
  pub fn get(&mut self, index: usize) -> Result<&Value, FormErr> {
    let registry = self.registry.clone();
    let records = self.records_mut()?;
    let length = records.len();
    match records.get_mut(index) {
      Some(record) => record.value(&registry),
      None => Err(err!(trace, FormErr::IndexRange { index, length })),
    }
  }

  /// Returns mutable access to element `index`.
  ///
  /// As with [`Struct::get_mut`](crate::Struct::get_mut), mutable access
  /// marks the element's record dirty.
  pub fn get_mut(&mut self, index: usize) -> Result<&mut Value, FormErr> {
    let registry = self.registry.clone();
    let records = self.records_mut()?;
    let length = records.len();
    match records.get_mut(index) {
      Some(record) => record.value_mut(&registry),
      None => Err(err!(trace, FormErr::IndexRange { index, length })),
    }
  }

  /// Replaces element `index`, returning the previous value.
  pub fn set(
    &mut self,
    index: usize,
    value: impl Into<Value>,
  ) -> Result<Value, FormErr> {
    let registry = self.registry.clone();
    let length = self.records_mut()?.len();
    if index >= length {
      return Err(err!(trace, FormErr::IndexRange { index, length }));
    }
    self.dirty = true;
    let records = self.records.get_or_insert_with(Vec::new);
    let old =
      core::mem::replace(&mut records[index], Record::with_value(value));
    old.into_value(&registry)
  }

  /// Appends a new element.
  pub fn push(&mut self, value: impl Into<Value>) -> Result<(), FormErr> {
    self.records_mut()?.push(Record::with_value(value));
    self.dirty = true;
    Ok(())
  }

  /// Inserts a new element at `index`, shifting later elements up by one.
  ///
  /// `index` may equal the current length, in which case this appends.
  pub fn insert(
    &mut self,
    index: usize,
    value: impl Into<Value>,
  ) -> Result<(), FormErr> {
    let length = self.records_mut()?.len();
    if index > length {
      return Err(err!(trace, FormErr::IndexRange { index, length }));
    }
    self.dirty = true;
    self
      .records
      .get_or_insert_with(Vec::new)
      .insert(index, Record::with_value(value));
    Ok(())
  }

  /// Removes element `index`, shifting later elements down by one, and
  /// returns the removed value.  No mutation is performed on an
  /// out-of-range index.
  pub fn remove(&mut self, index: usize) -> Result<Value, FormErr> {
    let registry = self.registry.clone();
    let length = self.records_mut()?.len();
    if index >= length {
      return Err(err!(trace, FormErr::IndexRange { index, length }));
    }
    self.dirty = true;
    let record = self.records.get_or_insert_with(Vec::new).remove(index);
    record.into_value(&registry)
  }

  /// Discards every element, leaving an empty, fully materialized array.
  pub fn clear(&mut self) {
    self.records = Some(Vec::new());
    self.dirty = true;
  }

  /// Serializes the array.
  ///
  /// If the array was never mutated (no element replaced, added, removed, or
  /// mutably accessed), the original backing buffer is returned unchanged,
  /// whether or not the element list was materialized for reading.
  /// Otherwise the buffer is rebuilt element by element, with untouched
  /// elements contributing their original bytes through their records.
  ///
  /// Null elements are omitted from the output entirely, so later elements
  /// shift down by one slot in the re-decoded array.
  pub fn to_bytes(&mut self) -> Result<ByteView, FormErr> {
    let untouched = !self.dirty
      && self.records.as_ref().map_or(true, |records| {
        records.iter().all(|record| !record.is_assigned())
      });
    if untouched {
      return Ok(self.backing.clone());
    }
    let registry = self.registry.clone();
    let records = self.records.get_or_insert_with(Vec::new);

    let mut parts: Vec<ByteView> = Vec::with_capacity(records.len());
    for record in records.iter_mut() {
      if let Some(view) = record.to_bytes(&registry)? {
        parts.push(view);
      }
    }

    let mut total = 1 + 4 + 4 * parts.len();
    for part in &parts {
      total += part.len();
    }
    let mut out = Vec::with_capacity(total);
    out.push(Tag::Array.byte());
    write_len(&mut out, parts.len())?;
    for part in &parts {
      write_len(&mut out, part.len())?;
    }
    for part in &parts {
      out.extend_from_slice(part.bytes());
    }
    Ok(ByteView::from(out))
  }

  /// Byte equality over the current serialized form of both sides.
  pub(crate) fn value_eq(&self, other: &Array) -> bool {
    let (mut a, mut b) = (self.clone(), other.clone());
    match (a.to_bytes(), b.to_bytes()) {
      (Ok(a), Ok(b)) => a == b,
      _ => false,
    }
  }
}

impl Debug for Array {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Array")
      .field("backing_len", &self.backing.len())
      .field("materialized", &self.records.is_some())
      .field("dirty", &self.dirty)
      .finish()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn reg() -> TypeRegistry {
    TypeRegistry::new()
  }

  fn of(values: &[i32]) -> Array {
    let mut array = Array::new(reg());
    for v in values {
      array.push(*v).unwrap();
    }
    array
  }

  fn contents(array: &mut Array) -> Vec<i32> {
    let mut out = Vec::new();
    for i in 0..array.len().unwrap() {
      out.push(array.get(i).unwrap().as_i32().unwrap());
    }
    out
  }

  #[test]
  fn push_insert_remove_ordering() -> Result<(), FormErr> {
    let mut array = of(&[10, 20, 30]);
    array.insert(1, 99i32)?;
    assert_eq!(contents(&mut array), vec![10, 99, 20, 30]);

    assert_eq!(array.remove(0)?, Value::Int32(10));
    assert_eq!(contents(&mut array), vec![99, 20, 30]);
    assert_eq!(array.len()?, 3);
    Ok(())
  }

  #[test]
  fn set_reports_previous() -> Result<(), FormErr> {
    let mut array = of(&[1, 2]);
    assert_eq!(array.set(1, 5i32)?, Value::Int32(2));
    assert_eq!(contents(&mut array), vec![1, 5]);
    Ok(())
  }

  #[test]
  fn index_faults() {
    let mut array = of(&[1]);
    assert!(matches!(
      array.get(1),
      Err(FormErr::IndexRange { index: 1, length: 1 })
    ));
    assert!(matches!(
      array.remove(7),
      Err(FormErr::IndexRange { index: 7, length: 1 })
    ));
    assert!(matches!(array.insert(2, 0i32), Err(FormErr::IndexRange { .. })));
    // Failed mutations leave the array untouched.
    assert_eq!(contents(&mut array), vec![1]);
  }

  #[test]
  fn insert_at_len_appends() -> Result<(), FormErr> {
    let mut array = of(&[1]);
    array.insert(1, 2i32)?;
    assert_eq!(contents(&mut array), vec![1, 2]);
    Ok(())
  }

  #[test]
  fn reads_keep_the_zero_copy_path() -> Result<(), FormErr> {
    let mut array = of(&[1, 2, 3]);
    let bytes = array.to_bytes()?;

    // Materializing and decoding for reads is not a mutation.
    let mut decoded = Array::from_view(reg(), bytes.clone());
    assert_eq!(decoded.len()?, 3);
    decoded.get(0)?;
    let out = decoded.to_bytes()?;
    assert_eq!(out.bytes().as_ptr(), bytes.bytes().as_ptr());

    // Replacing an element is, even with an identical value.
    decoded.set(0, 1i32)?;
    let out = decoded.to_bytes()?;
    assert_ne!(out.bytes().as_ptr(), bytes.bytes().as_ptr());
    assert_eq!(out, bytes);
    Ok(())
  }

  #[test]
  fn clear_discards_backing() -> Result<(), FormErr> {
    let mut array = of(&[1, 2, 3]);
    let mut decoded = Array::from_view(reg(), array.to_bytes()?);
    decoded.clear();
    assert_eq!(decoded.len()?, 0);
    let bytes = decoded.to_bytes()?;
    assert_eq!(bytes.bytes(), &[0x02, 0, 0, 0, 0]);
    Ok(())
  }

  #[test]
  fn null_elements_are_omitted() -> Result<(), FormErr> {
    let mut array = of(&[1, 2, 3]);
    array.set(1, Value::Null)?;
    let mut decoded = Array::from_view(reg(), array.to_bytes()?);
    assert_eq!(contents(&mut decoded), vec![1, 3]);
    Ok(())
  }

  #[test]
  fn wrong_container_tag_is_fatal() {
    let mut array = Array::from_view(reg(), empty_container(Tag::Struct));
    assert!(matches!(
      array.len(),
      Err(FormErr::UnexpectedTag {
        expected: Tag::Array,
        observed: Tag::Struct,
      })
    ));
  }
}
