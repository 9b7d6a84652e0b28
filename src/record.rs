//! The lazy unit of storage: one field or element, decoded on demand.

use crate::{
  codec::{FormErr, TypeRegistry},
  value::Value,
  view::ByteView,
};

/// A lazy box holding either an undecoded byte slice or a decoded/assigned
/// value.
///
/// A record sliced from a backing buffer starts as a pure view.  The first
/// call to [`value`](Record::value) decodes the slice through the registry and
/// caches the result; decoding does *not* count as dirtying, so an untouched
/// record re-serializes as its original bytes verbatim.  Assigning a new value
/// (or taking mutable access to the current one) makes the decoded value
/// authoritative, and re-serialization is computed from it instead.
///
/// At most one of the slice and the value is ever the source of truth.
#[derive(Clone, Debug)]
pub struct Record {
  view:     Option<ByteView>,
  cached:   Option<Value>,
  assigned: bool,
}

impl Record {
  /// Creates a record holding [`Value::Null`].
  pub fn new() -> Self {
    Record {
      view:     None,
      cached:   Some(Value::Null),
      assigned: true,
    }
  }

  /// Creates a lazy record over an undecoded `tag + payload` slice.
  pub fn from_view(view: ByteView) -> Self {
    Record {
      view:     Some(view),
      cached:   None,
      assigned: false,
    }
  }

  /// Creates a record already holding `value`.
  pub fn with_value(value: impl Into<Value>) -> Self {
    Record {
      view:     None,
      cached:   Some(value.into()),
      assigned: true,
    }
  }

  /// Replaces the record's value; the original slice is discarded.
  pub fn assign(&mut self, value: impl Into<Value>) {
    self.view = None;
    self.cached = Some(value.into());
    self.assigned = true;
  }

  /// Returns the current value, decoding the held slice on first call.
  ///
  /// Idempotent: the decoded value is cached and later calls return it
  /// without touching the buffer again.
  pub fn value(&mut self, registry: &TypeRegistry) -> Result<&Value, FormErr> {
    if self.cached.is_none() {
      let decoded = match &self.view {
        Some(view) => registry.decode(view)?,
        None => Value::Null,
      };
      self.cached = Some(decoded);
    }
    Ok(&*self.cached.get_or_insert(Value::Null))
  }

  /// Returns mutable access to the current value.
  ///
  /// Mutable access makes the decoded value authoritative: the record is
  /// marked assigned and will re-encode from the value on serialization,
  /// whether or not the caller actually changes anything.
  pub fn value_mut(
    &mut self,
    registry: &TypeRegistry,
  ) -> Result<&mut Value, FormErr> {
    self.value(registry)?;
    self.view = None;
    self.assigned = true;
    Ok(self.cached.get_or_insert(Value::Null))
  }

  /// Consumes the record, returning its value.
  pub fn into_value(
    mut self,
    registry: &TypeRegistry,
  ) -> Result<Value, FormErr> {
    self.value(registry)?;
    Ok(self.cached.take().unwrap_or(Value::Null))
  }

  /// Reports whether the record was assigned or mutably accessed since it
  /// was constructed.  Plain reads never set this.
  pub fn is_assigned(&self) -> bool {
    self.assigned
  }

  /// Reports whether the current value is null, without forcing a decode.
  ///
  /// An undecoded slice is never null: the wire format encodes null as
  /// absence, so anything actually present in a buffer is some other kind.
  pub fn is_null(&self) -> bool {
    match &self.cached {
      Some(value) => value.is_null(),
      None => self.view.is_none(),
    }
  }

  /// Serializes the record.
  ///
  /// - Never assigned, holding a primitive or still undecoded: the original
  ///   slice is returned verbatim (byte-identical, zero-copy).
  /// - Never assigned, but decoded into a container: the container serializes
  ///   itself, which takes its own zero-copy fast path when untouched.
  /// - Assigned: re-encoded from the value through the registry.
  ///
  /// Returns `None` when the current value is null: the enclosing key or
  /// slot is omitted from the output.
  pub fn to_bytes(
    &mut self,
    registry: &TypeRegistry,
  ) -> Result<Option<ByteView>, FormErr> {
    if !self.assigned {
      match self.cached.as_mut() {
        Some(Value::Struct(s)) => return s.to_bytes().map(Some),
        Some(Value::Array(a)) => return a.to_bytes().map(Some),
        _ => {
          if let Some(view) = &self.view {
            return Ok(Some(view.clone()));
          }
        },
      }
    }
    match self.cached.as_mut() {
      Some(value) => Ok(registry.encode(value)?.map(ByteView::from)),
      None => Ok(None),
    }
  }
}

impl Default for Record {
  fn default() -> Self {
    Record::new()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn encoded(value: impl Into<Value>) -> ByteView {
    let registry = TypeRegistry::new();
    ByteView::from(registry.encode(&mut value.into()).unwrap().unwrap())
  }

  #[test]
  fn lazy_decode_and_cache() -> Result<(), FormErr> {
    let registry = TypeRegistry::new();
    let mut record = Record::from_view(encoded(42i32));
    assert_eq!(record.value(&registry)?, &Value::Int32(42));
    // Second read hits the cache and agrees.
    assert_eq!(record.value(&registry)?, &Value::Int32(42));
    Ok(())
  }

  #[test]
  fn untouched_record_is_verbatim() -> Result<(), FormErr> {
    let registry = TypeRegistry::new();
    let view = encoded("verbatim");
    let mut record = Record::from_view(view.clone());

    // Reading does not dirty the record.
    record.value(&registry)?;
    let out = record.to_bytes(&registry)?.unwrap();
    assert_eq!(out.bytes().as_ptr(), view.bytes().as_ptr());
    Ok(())
  }

  #[test]
  fn assignment_reencodes() -> Result<(), FormErr> {
    let registry = TypeRegistry::new();
    let mut record = Record::from_view(encoded(1i32));
    record.assign(2i64);
    let out = record.to_bytes(&registry)?.unwrap();
    assert_eq!(registry.decode(&out)?, Value::Int64(2));
    Ok(())
  }

  #[test]
  fn fresh_record_is_null_and_absent() -> Result<(), FormErr> {
    let registry = TypeRegistry::new();
    let mut record = Record::new();
    assert!(record.is_null());
    assert!(record.to_bytes(&registry)?.is_none());
    Ok(())
  }

  #[test]
  fn undecoded_slice_is_never_null() {
    let record = Record::from_view(encoded(0i32));
    assert!(!record.is_null());
  }
}
