//! The keyed container.  See [`Struct`].

use crate::{
  codec::{
    bounds_check, empty_container, read_bytes, read_len, read_u8, read_utf16,
    utf16_len, write_len, write_utf16, FormErr, Tag, TypeRegistry,
  },
  record::Record,
  value::Value,
  view::ByteView,
};
use core::fmt::{Debug, Formatter};
use indexmap::IndexMap;
use smallvec::SmallVec;

/// A keyed collection of lazy records over an immutable backing buffer.
///
/// A `Struct` constructed from a buffer parses nothing up front.  The first
/// keyed access *materializes* the directory: every key and per-value size is
/// read and each value becomes a slice-backed [`Record`], still undecoded.
/// Individual values decode on first read and stay cached.
///
/// Writes never touch the backing buffer.  They land in an insertion-ordered
/// overlay that shadows the directory; putting [`Value::Null`] marks a key
/// deleted.  [`to_bytes`](Struct::to_bytes) merges directory and overlay into
/// a fresh buffer, or hands back the original buffer untouched when nothing
/// was ever read or written.
///
/// Wire layout (all length/count fields little-endian `i32`):
///
/// ```text
/// 0x01 · keyCount · keyCount × (keyByteLen · UTF-16LE key bytes)
///      · keyCount × valueByteLen · keyCount × value bytes
/// ```
///
/// Not thread-safe: materialization and decode caching mutate in place, so a
/// caller sharing one instance across threads must serialize access.
#[derive(Clone)]
pub struct Struct {
  registry:  TypeRegistry,
  backing:   ByteView,
  directory: Option<IndexMap<String, Record>>,
  overlay:   IndexMap<String, Value>,
}

impl Struct {
  /// Creates an empty struct.
  ///
  /// The backing view is a valid empty encoding, so serializing an untouched
  /// empty struct is still the zero-copy path.
  pub fn new(registry: TypeRegistry) -> Self {
    Struct::from_view(registry, empty_container(Tag::Struct))
  }

  /// Creates a lazy struct over an existing encoded buffer.
  ///
  /// The buffer is not inspected here; a malformed buffer surfaces as a
  /// decode fault on first access.
  pub fn from_view(
    registry: TypeRegistry,
    backing: impl Into<ByteView>,
  ) -> Self {
    Struct {
      registry,
      backing: backing.into(),
      directory: None,
      overlay: IndexMap::new(),
    }
  }

  /// The registry this struct encodes and decodes through.
  pub fn registry(&self) -> &TypeRegistry {
    &self.registry
  }

  /// Parses the backing directory, if it hasn't been already.
  ///
  /// Keys and value sizes are decoded eagerly; values are sliced, not
  /// decoded.  Nested containers share the backing buffer.
  fn materialize(&mut self) -> Result<(), FormErr> {
    if self.directory.is_some() {
      return Ok(());
    }

    let bytes = self.backing.bytes();
    let cursor = &mut 0;
    let observed = Tag::from_byte(read_u8(bytes, cursor)?)?;
    if observed != Tag::Struct {
      return Err(err!(
        trace,
        FormErr::UnexpectedTag {
          expected: Tag::Struct,
          observed,
        }
      ));
    }
    let count = read_len(bytes, cursor)?;

    let mut keys: Vec<String> = Vec::new();
    for _ in 0..count {
      let key_len = read_len(bytes, cursor)?;
      keys.push(read_utf16(read_bytes(bytes, cursor, key_len)?)?);
    }

    let mut sizes: SmallVec<[usize; 16]> = SmallVec::new();
    for _ in 0..count {
      sizes.push(read_len(bytes, cursor)?);
    }

    let mut directory = IndexMap::with_capacity(keys.len());
    for (key, size) in keys.into_iter().zip(sizes) {
      let start = *cursor;
      let end = start
        .checked_add(size)
        .ok_or_else(|| err!(trace, FormErr::LenOverflow(size)))?;
      bounds_check(bytes, end)?;
      *cursor = end;
      let view = self.backing.slice(start, end)?;
      if directory.insert(key.clone(), Record::from_view(view)).is_some() {
        return Err(err!(trace, FormErr::KeyCollision(key)));
      }
    }
    self.directory = Some(directory);
    Ok(())
  }

  /// Returns the value stored under `key`, or `None` if the key is absent.
  ///
  /// The overlay is consulted first, then the backing directory
  /// (materializing it if needed and decoding the one requested value).  A
  /// key deleted through the overlay reads back as absent; a stored null
  /// cannot otherwise occur, since null is encoded as absence.
  pub fn get(&mut self, key: &str) -> Result<Option<&Value>, FormErr> {
    if self.overlay.contains_key(key) {
      return Ok(self.overlay.get(key).filter(|v| !v.is_null()));
    }
    self.materialize()?;
    let registry = self.registry.clone();
    match self.directory.as_mut().and_then(|dir| dir.get_mut(key)) {
      Some(record) => record.value(&registry).map(Some),
      None => Ok(None),
    }
  }

  /// Returns mutable access to the value stored under `key`.
  ///
  /// Taking mutable access to a backing value marks its record dirty, so any
  /// change made through the reference (e.g., to a nested container) is
  /// reflected on the next serialization.
  pub fn get_mut(&mut self, key: &str) -> Result<Option<&mut Value>, FormErr> {
    if self.overlay.contains_key(key) {
      return Ok(self.overlay.get_mut(key).filter(|v| !v.is_null()));
    }
    self.materialize()?;
    let registry = self.registry.clone();
    match self.directory.as_mut().and_then(|dir| dir.get_mut(key)) {
      Some(record) => record.value_mut(&registry).map(Some),
      None => Ok(None),
    }
  }

  /// Installs `value` under `key` in the overlay, returning the previous
  /// value, if any.
  ///
  /// Putting [`Value::Null`] marks the key deleted: it disappears from
  /// [`keys`](Struct::keys) and from the serialized output.
  pub fn put(
    &mut self,
    key: impl Into<String>,
    value: impl Into<Value>,
  ) -> Result<Option<Value>, FormErr> {
    let key = key.into();
    let previous = self.get(&key)?.cloned();
    self.overlay.insert(key, value.into());
    Ok(previous)
  }

  /// Returns `true` iff `key` currently maps to a non-null value.
  pub fn contains_key(&mut self, key: &str) -> Result<bool, FormErr> {
    if let Some(value) = self.overlay.get(key) {
      return Ok(!value.is_null());
    }
    self.materialize()?;
    Ok(
      self
        .directory
        .as_ref()
        .map_or(false, |dir| dir.contains_key(key)),
    )
  }

  /// Returns every present key: backing keys in their original order, then
  /// overlay-only keys in insertion order, with deleted keys omitted.
  ///
  /// Materializes the directory as a side effect.
  pub fn keys(&mut self) -> Result<Vec<String>, FormErr> {
    self.materialize()?;
    let mut keys = Vec::new();
    if let Some(dir) = &self.directory {
      for key in dir.keys() {
        match self.overlay.get(key) {
          Some(value) if value.is_null() => {},
          _ => keys.push(key.clone()),
        }
      }
    }
    for (key, value) in &self.overlay {
      if value.is_null() {
        continue;
      }
      if self
        .directory
        .as_ref()
        .map_or(false, |dir| dir.contains_key(key))
      {
        continue;
      }
      keys.push(key.clone());
    }
    Ok(keys)
  }

  /// Serializes the struct.
  ///
  /// If nothing was ever written (the overlay is empty and no record was
  /// assigned or mutably accessed), the original backing buffer is returned
  /// unchanged, whether or not the directory was materialized for reading.
  /// Otherwise backing and overlay are merged into a fresh buffer: every
  /// surviving backing key keeps its original relative order (contributing
  /// its original bytes unless overridden), and overlay-only keys are
  /// appended in insertion order.  The result is stable across repeated
  /// calls.
  pub fn to_bytes(&mut self) -> Result<ByteView, FormErr> {
    let untouched = self.overlay.is_empty()
      && self
        .directory
        .as_ref()
        .map_or(true, |dir| dir.values().all(|record| !record.is_assigned()));
    if untouched {
      return Ok(self.backing.clone());
    }
    self.materialize()?;
    let registry = self.registry.clone();

    let mut entries: Vec<(String, ByteView)> = Vec::new();
    let directory = self.directory.get_or_insert_with(IndexMap::new);
    for (key, record) in directory.iter_mut() {
      if let Some(value) = self.overlay.get_mut(key) {
        if let Some(bytes) = registry.encode(value)? {
          entries.push((key.clone(), ByteView::from(bytes)));
        }
      } else if let Some(view) = record.to_bytes(&registry)? {
        entries.push((key.clone(), view));
      }
    }
    for (key, value) in self.overlay.iter_mut() {
      if directory.contains_key(key) {
        continue;
      }
      if let Some(bytes) = registry.encode(value)? {
        entries.push((key.clone(), ByteView::from(bytes)));
      }
    }

    let mut total = 1 + 4;
    for (key, view) in &entries {
      total += 4 + utf16_len(key) + 4 + view.len();
    }
    let mut out = Vec::with_capacity(total);
    out.push(Tag::Struct.byte());
    write_len(&mut out, entries.len())?;
    for (key, _) in &entries {
      write_len(&mut out, utf16_len(key))?;
      write_utf16(&mut out, key);
    }
    for (_, view) in &entries {
      write_len(&mut out, view.len())?;
    }
    for (_, view) in &entries {
      out.extend_from_slice(view.bytes());
    }
    Ok(ByteView::from(out))
  }

  /// Byte equality over the current serialized form of both sides.
  pub(crate) fn value_eq(&self, other: &Struct) -> bool {
    let (mut a, mut b) = (self.clone(), other.clone());
    match (a.to_bytes(), b.to_bytes()) {
      (Ok(a), Ok(b)) => a == b,
      _ => false,
    }
  }
}

impl Debug for Struct {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Struct")
      .field("backing_len", &self.backing.len())
      .field("materialized", &self.directory.is_some())
      .field("overlay_len", &self.overlay.len())
      .finish()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn reg() -> TypeRegistry {
    TypeRegistry::new()
  }

  #[test]
  fn empty_struct_round_trip() -> Result<(), FormErr> {
    let mut empty = Struct::new(reg());
    let bytes = empty.to_bytes()?;
    assert_eq!(bytes.bytes(), &[0x01, 0, 0, 0, 0]);

    let mut decoded = Struct::from_view(reg(), bytes);
    assert!(decoded.keys()?.is_empty());
    Ok(())
  }

  #[test]
  fn put_then_get() -> Result<(), FormErr> {
    let mut s = Struct::new(reg());
    assert_eq!(s.put("callsign", "Rocinante")?, None);
    assert_eq!(s.get("callsign")?, Some(&Value::from("Rocinante")));
    assert_eq!(s.get("registry")?, None);

    // A second put reports the shadowed value.
    let previous = s.put("callsign", "Tachi")?;
    assert_eq!(previous, Some(Value::from("Rocinante")));
    assert_eq!(s.get("callsign")?, Some(&Value::from("Tachi")));
    Ok(())
  }

  #[test]
  fn keys_keep_backing_order_and_append_new() -> Result<(), FormErr> {
    let mut s = Struct::new(reg());
    s.put("alpha", 1i32)?;
    s.put("beta", 2i32)?;
    s.put("gamma", 3i32)?;
    let mut decoded = Struct::from_view(reg(), s.to_bytes()?);

    decoded.put("beta", 20i32)?;
    decoded.put("delta", 4i32)?;
    assert_eq!(decoded.keys()?, vec!["alpha", "beta", "gamma", "delta"]);
    Ok(())
  }

  #[test]
  fn reads_keep_the_zero_copy_path() -> Result<(), FormErr> {
    let mut s = Struct::new(reg());
    s.put("a", 1i32)?;
    s.put("b", "two")?;
    let bytes = s.to_bytes()?;

    // Materializing and decoding for reads is not a write.
    let mut decoded = Struct::from_view(reg(), bytes.clone());
    decoded.get("a")?;
    decoded.keys()?;
    let out = decoded.to_bytes()?;
    assert_eq!(out.bytes().as_ptr(), bytes.bytes().as_ptr());

    // Mutable access is, and forces reassembly.
    decoded.get_mut("a")?;
    let out = decoded.to_bytes()?;
    assert_ne!(out.bytes().as_ptr(), bytes.bytes().as_ptr());
    assert_eq!(out, bytes);
    Ok(())
  }

  #[test]
  fn duplicate_backing_key_is_fatal() -> Result<(), FormErr> {
    // Hand-build a directory containing the key "k" twice.
    let mut out = vec![0x01u8];
    write_len(&mut out, 2)?;
    for _ in 0..2 {
      write_len(&mut out, 2)?;
      write_utf16(&mut out, "k");
    }
    for _ in 0..2 {
      write_len(&mut out, 5)?;
    }
    for v in [1i32, 2i32] {
      out.push(0x07);
      out.extend_from_slice(&v.to_le_bytes());
    }

    let mut s = Struct::from_view(reg(), out);
    assert!(matches!(s.get("k"), Err(FormErr::KeyCollision(_))));
    Ok(())
  }

  #[test]
  fn truncated_directory_is_fatal() -> Result<(), FormErr> {
    let mut s = Struct::new(reg());
    s.put("key", "value")?;
    let bytes = s.to_bytes()?.to_vec();

    let mut truncated = Struct::from_view(reg(), &bytes[..bytes.len() - 3]);
    assert!(matches!(
      truncated.get("key"),
      Err(FormErr::OutOfBounds { .. })
    ));
    Ok(())
  }

  #[test]
  fn wrong_container_tag_is_fatal() {
    let mut s = Struct::from_view(reg(), empty_container(Tag::Array));
    assert!(matches!(
      s.keys(),
      Err(FormErr::UnexpectedTag {
        expected: Tag::Struct,
        observed: Tag::Array,
      })
    ));
  }
}
