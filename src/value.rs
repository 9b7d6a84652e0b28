//! The closed set of value kinds the format can carry.
//!
//! [`Value`] is a tagged union matched exhaustively at encode and decode
//! time.  There is no open-ended fallback: host-defined types are carried
//! explicitly as [`Opaque`] blobs, serialized at the API boundary by the
//! registry's pluggable codec.

use crate::collections::{Array, Struct};
use core::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A dynamically typed value, decoded from or destined for a buffer.
///
/// `Char` holds a single UTF-16 code unit, matching the wire format's 2-byte
/// character payload; characters outside the basic multilingual plane must be
/// carried as strings.
///
/// Equality is structural for primitives (floating point compares by bit
/// pattern, so NaNs and signed zeros round-trip faithfully), byte-wise for
/// opaque blobs, and byte-wise over the *current serialized form* for
/// containers.
#[derive(Clone, Debug)]
pub enum Value {
  Null,
  Byte(i8),
  Char(u16),
  Double(f64),
  Float(f32),
  Int32(i32),
  Int64(i64),
  Int16(i16),
  String(String),
  Struct(Struct),
  Array(Array),
  Opaque(Opaque),
}

impl Value {
  /// Returns `true` iff this is [`Value::Null`].
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_byte(&self) -> Option<i8> {
    match self {
      Value::Byte(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_char(&self) -> Option<u16> {
    match self {
      Value::Char(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_double(&self) -> Option<f64> {
    match self {
      Value::Double(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_float(&self) -> Option<f32> {
    match self {
      Value::Float(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_i32(&self) -> Option<i32> {
    match self {
      Value::Int32(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Int64(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_i16(&self) -> Option<i16> {
    match self {
      Value::Int16(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(v) => Some(v.as_str()),
      _ => None,
    }
  }

  pub fn as_struct(&self) -> Option<&Struct> {
    match self {
      Value::Struct(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_struct_mut(&mut self) -> Option<&mut Struct> {
    match self {
      Value::Struct(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&Array> {
    match self {
      Value::Array(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_array_mut(&mut self) -> Option<&mut Array> {
    match self {
      Value::Array(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_opaque(&self) -> Option<&Opaque> {
    match self {
      Value::Opaque(v) => Some(v),
      _ => None,
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Byte(a), Value::Byte(b)) => a == b,
      (Value::Char(a), Value::Char(b)) => a == b,
      (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
      (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
      (Value::Int32(a), Value::Int32(b)) => a == b,
      (Value::Int64(a), Value::Int64(b)) => a == b,
      (Value::Int16(a), Value::Int16(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Struct(a), Value::Struct(b)) => a.value_eq(b),
      (Value::Array(a), Value::Array(b)) => a.value_eq(b),
      (Value::Opaque(a), Value::Opaque(b)) => a == b,
      _ => false,
    }
  }
}

impl From<i8> for Value {
  fn from(v: i8) -> Self {
    Value::Byte(v)
  }
}

impl From<u16> for Value {
  fn from(v: u16) -> Self {
    Value::Char(v)
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self {
    Value::Double(v)
  }
}

impl From<f32> for Value {
  fn from(v: f32) -> Self {
    Value::Float(v)
  }
}

impl From<i32> for Value {
  fn from(v: i32) -> Self {
    Value::Int32(v)
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Int64(v)
  }
}

impl From<i16> for Value {
  fn from(v: i16) -> Self {
    Value::Int16(v)
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::String(v.to_owned())
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Value::String(v)
  }
}

impl From<Struct> for Value {
  fn from(v: Struct) -> Self {
    Value::Struct(v)
  }
}

impl From<Array> for Value {
  fn from(v: Array) -> Self {
    Value::Array(v)
  }
}

impl From<Opaque> for Value {
  fn from(v: Opaque) -> Self {
    Value::Opaque(v)
  }
}

/// A host-defined blob in its serialized form.
///
/// The bytes are whatever the registry's [`OpaqueCodec`] produced; this crate
/// only moves them around.  The serialized form is shared, so cloning an
/// opaque value never copies the blob.
///
/// [`OpaqueCodec`]: crate::OpaqueCodec
#[derive(Clone, PartialEq, Eq)]
pub struct Opaque {
  bytes: Arc<[u8]>,
}

impl Opaque {
  /// The serializer-defined bytes of the blob.
  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }
}

impl From<Vec<u8>> for Opaque {
  fn from(bytes: Vec<u8>) -> Self {
    Opaque {
      bytes: Arc::from(bytes),
    }
  }
}

impl From<&[u8]> for Opaque {
  fn from(bytes: &[u8]) -> Self {
    Opaque {
      bytes: Arc::from(bytes),
    }
  }
}

impl Debug for Opaque {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "Opaque({} bytes)", self.bytes.len())
  }
}
