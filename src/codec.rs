//! The tagged-value dispatch table: one byte of type tag, then a payload.
//!
//! Every encoded value starts with a [`Tag`] byte.  Fixed-width primitives
//! are followed immediately by their little-endian payload; strings by UTF-16
//! code units; containers by their own directory structures (see the
//! `collections` module); opaque blobs by serializer-defined bytes.  None of
//! the variable-length payloads are self-delimited: their lengths come from
//! the enclosing container's recorded value sizes.
//!
//! All multi-byte quantities in this format, including the signed 32-bit
//! length and count fields, are little-endian.
//!
//! [`TypeRegistry`] is the encode/decode engine itself: an immutable dispatch
//! value constructed once and captured by every container.  Decoding is pure
//! dispatch on the leading tag byte; an unrecognized tag means the buffer is
//! not a well-formed instance of this format and is surfaced as a fatal
//! [`FormErr::UnknownTag`].

use crate::{
  collections::{Array, Struct},
  value::{Opaque, Value},
  view::ByteView,
};
use core::fmt::{Debug, Display, Formatter};
use std::{any::Any, error::Error, sync::Arc};

/// The one-byte type tag leading every encoded value.
///
/// Note the gap between `Int16` and `String`: the tag values are part of the
/// wire format and are not contiguous.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum Tag {
  Struct = 0x01,
  Array = 0x02,
  Byte = 0x03,
  Char = 0x04,
  Double = 0x05,
  Float = 0x06,
  Int32 = 0x07,
  Int64 = 0x08,
  Int16 = 0x09,
  String = 0x10,
  Opaque = 0x11,
}

impl Tag {
  /// Maps a leading byte back to its tag.
  ///
  /// An unrecognized byte indicates corruption or a version mismatch, both of
  /// which are out of scope for recovery, so this is a fatal decode fault.
  pub fn from_byte(byte: u8) -> Result<Tag, FormErr> {
    match byte {
      0x01 => Ok(Tag::Struct),
      0x02 => Ok(Tag::Array),
      0x03 => Ok(Tag::Byte),
      0x04 => Ok(Tag::Char),
      0x05 => Ok(Tag::Double),
      0x06 => Ok(Tag::Float),
      0x07 => Ok(Tag::Int32),
      0x08 => Ok(Tag::Int64),
      0x09 => Ok(Tag::Int16),
      0x10 => Ok(Tag::String),
      0x11 => Ok(Tag::Opaque),
      other => Err(err!(trace, FormErr::UnknownTag(other))),
    }
  }

  /// The wire value of this tag.
  pub fn byte(self) -> u8 {
    self as u8
  }
}

/// Faults arising from encoding or decoding.
///
/// Decode faults are never recovered from locally: a buffer is assumed to be
/// a well-formed instance of the format, and a fault indicates corruption or
/// a version mismatch.  Nothing is ever silently substituted with a default.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum FormErr {
  /// A leading byte that names no known value kind.
  UnknownTag(u8),

  /// A container was constructed over a buffer of some other kind.
  UnexpectedTag {
    expected: Tag,
    observed: Tag,
  },

  /// A length field describes a slice running past the end of the buffer.
  OutOfBounds {
    index:  usize,
    length: usize,
  },

  /// A signed 32-bit count or length field was negative.
  NegativeLength(i32),

  /// A fixed-width payload with the wrong number of bytes for its tag.
  PayloadSize {
    tag:      Tag,
    expected: usize,
    actual:   usize,
  },

  /// A string payload with an odd byte length or unpairable surrogates.
  BadUtf16,

  /// A backing directory containing the same key twice.
  KeyCollision(String),

  /// Array access or mutation with an out-of-range index.
  IndexRange {
    index:  usize,
    length: usize,
  },

  /// The pluggable opaque serializer failed; the cause is preserved.
  OpaqueCodec(Box<dyn Error + Send + Sync>),

  /// An opaque conversion was requested on a registry without a codec.
  NoOpaqueCodec,

  /// A value too large for a signed 32-bit length field.
  LenOverflow(usize),
}

impl Display for FormErr {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      FormErr::UnknownTag(byte) => write!(f, "unknown tag byte 0x{byte:02x}"),
      FormErr::UnexpectedTag { expected, observed } => {
        write!(f, "expected a {expected:?} tag but observed {observed:?}")
      },
      FormErr::OutOfBounds { index, length } => {
        write!(f, "index {index} out of bounds for buffer of {length} bytes")
      },
      FormErr::NegativeLength(value) => {
        write!(f, "negative length field {value}")
      },
      FormErr::PayloadSize {
        tag,
        expected,
        actual,
      } => write!(
        f,
        "{tag:?} payload must be {expected} bytes, observed {actual}"
      ),
      FormErr::BadUtf16 => write!(f, "malformed UTF-16 string payload"),
      FormErr::KeyCollision(key) => {
        write!(f, "duplicate key {key:?} in struct directory")
      },
      FormErr::IndexRange { index, length } => {
        write!(f, "index {index} out of range for array of length {length}")
      },
      FormErr::OpaqueCodec(cause) => write!(f, "opaque codec failed: {cause}"),
      FormErr::NoOpaqueCodec => {
        write!(f, "no opaque codec was provided to the registry")
      },
      FormErr::LenOverflow(len) => {
        write!(f, "length {len} overflows a signed 32-bit length field")
      },
    }
  }
}

impl Error for FormErr {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      FormErr::OpaqueCodec(cause) => Some(cause.as_ref()),
      _ => None,
    }
  }
}

/// Bounds check that returns [`FormErr::OutOfBounds`] on failure.
#[inline(always)]
pub(crate) fn bounds_check(buf: &[u8], to: usize) -> Result<(), FormErr> {
  if to > buf.len() {
    Err(err!(
      trace,
      FormErr::OutOfBounds {
        index:  to,
        length: buf.len(),
      }
    ))
  } else {
    Ok(())
  }
}

/// Reads one byte at the cursor and advances it.
#[inline(always)]
pub(crate) fn read_u8(src: &[u8], cursor: &mut usize) -> Result<u8, FormErr> {
  bounds_check(src, *cursor + 1)?;
  let byte = src[*cursor];
  *cursor += 1;
  Ok(byte)
}

/// Reads a little-endian `i32` at the cursor and advances it.
#[inline(always)]
pub(crate) fn read_i32(src: &[u8], cursor: &mut usize) -> Result<i32, FormErr> {
  bounds_check(src, *cursor + 4)?;
  let bytes = [
    src[*cursor],
    src[*cursor + 1],
    src[*cursor + 2],
    src[*cursor + 3],
  ];
  *cursor += 4;
  Ok(i32::from_le_bytes(bytes))
}

/// Reads a signed 32-bit count/length field, rejecting negative values.
#[inline(always)]
pub(crate) fn read_len(
  src: &[u8],
  cursor: &mut usize,
) -> Result<usize, FormErr> {
  let value = read_i32(src, cursor)?;
  if value < 0 {
    Err(err!(trace, FormErr::NegativeLength(value)))
  } else {
    Ok(value as usize)
  }
}

/// Borrows `len` bytes at the cursor and advances it.
#[inline(always)]
pub(crate) fn read_bytes<'a>(
  src: &'a [u8],
  cursor: &mut usize,
  len: usize,
) -> Result<&'a [u8], FormErr> {
  let end = cursor
    .checked_add(len)
    .ok_or_else(|| err!(trace, FormErr::LenOverflow(len)))?;
  bounds_check(src, end)?;
  let bytes = &src[*cursor..end];
  *cursor = end;
  Ok(bytes)
}

/// Appends a signed 32-bit count/length field.
#[inline(always)]
pub(crate) fn write_len(
  target: &mut Vec<u8>,
  len: usize,
) -> Result<(), FormErr> {
  let value =
    i32::try_from(len).map_err(|_| err!(error, FormErr::LenOverflow(len)))?;
  target.extend_from_slice(&value.to_le_bytes());
  Ok(())
}

/// The encoded byte length of `s` as UTF-16 code units.
pub(crate) fn utf16_len(s: &str) -> usize {
  s.encode_utf16().count() * 2
}

/// Appends `s` as little-endian UTF-16 code units, no terminator.
pub(crate) fn write_utf16(target: &mut Vec<u8>, s: &str) {
  for unit in s.encode_utf16() {
    target.extend_from_slice(&unit.to_le_bytes());
  }
}

/// Decodes a little-endian UTF-16 payload.
pub(crate) fn read_utf16(bytes: &[u8]) -> Result<String, FormErr> {
  if bytes.len() % 2 != 0 {
    return Err(err!(trace, FormErr::BadUtf16));
  }
  let units: Vec<u16> = bytes
    .chunks_exact(2)
    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
    .collect();
  String::from_utf16(&units).map_err(|_| err!(trace, FormErr::BadUtf16))
}

/// The 5-byte encoding of an empty container: a tag and a zero count.
pub(crate) fn empty_container(tag: Tag) -> ByteView {
  let mut bytes = Vec::with_capacity(5);
  bytes.push(tag.byte());
  bytes.extend_from_slice(&0i32.to_le_bytes());
  ByteView::from(bytes)
}

/// A pluggable serializer for host-defined values.
///
/// The format has no dedicated tags for application types; anything outside
/// the closed [`Value`] set is carried as an opaque blob under [`Tag::Opaque`],
/// serialized by a codec supplied by the embedding application.  The codec is
/// only consulted at the API boundary ([`TypeRegistry::encode_opaque`] and
/// [`TypeRegistry::decode_opaque`]); blobs inside buffers round-trip untouched
/// whether or not a codec is present.
pub trait OpaqueCodec: Send + Sync {
  /// Serializes a host value to bytes.
  fn encode(
    &self,
    value: &dyn Any,
  ) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>>;

  /// Deserializes a host value from bytes.
  fn decode(
    &self,
    bytes: &[u8],
  ) -> Result<Box<dyn Any + Send + Sync>, Box<dyn Error + Send + Sync>>;
}

/// The encode/decode dispatch table.
///
/// A registry is immutable configuration: it is built once, has no runtime
/// registration surface, and is cheap to clone.  Every container captures a
/// copy, so alternate registries (e.g., with a different opaque codec) stay
/// isolated from each other.
#[derive(Clone, Default)]
pub struct TypeRegistry {
  opaque: Option<Arc<dyn OpaqueCodec>>,
}

impl TypeRegistry {
  /// Creates a registry without an opaque codec.
  pub fn new() -> Self {
    Default::default()
  }

  /// Creates a registry carrying the given opaque codec capability.
  pub fn with_opaque<C>(codec: C) -> Self
  where
    C: OpaqueCodec + 'static,
  {
    TypeRegistry {
      opaque: Some(Arc::new(codec)),
    }
  }

  /// Encodes a value as `tag + payload` bytes.
  ///
  /// Returns `Ok(None)` for [`Value::Null`]: null serializes as *absence*
  /// (the enclosing key or slot is omitted), never as an explicit tag.
  ///
  /// The value is taken mutably because encoding a container drives its own
  /// [`to_bytes`](crate::Struct::to_bytes), which may materialize it.
  pub fn encode(&self, value: &mut Value) -> Result<Option<Vec<u8>>, FormErr> {
    match value {
      Value::Null => Ok(None),
      Value::Byte(v) => Ok(Some(fixed(Tag::Byte, &v.to_le_bytes()))),
      Value::Char(v) => Ok(Some(fixed(Tag::Char, &v.to_le_bytes()))),
      Value::Double(v) => Ok(Some(fixed(Tag::Double, &v.to_le_bytes()))),
      Value::Float(v) => Ok(Some(fixed(Tag::Float, &v.to_le_bytes()))),
      Value::Int32(v) => Ok(Some(fixed(Tag::Int32, &v.to_le_bytes()))),
      Value::Int64(v) => Ok(Some(fixed(Tag::Int64, &v.to_le_bytes()))),
      Value::Int16(v) => Ok(Some(fixed(Tag::Int16, &v.to_le_bytes()))),
      Value::String(s) => {
        let mut out = Vec::with_capacity(1 + utf16_len(s));
        out.push(Tag::String.byte());
        write_utf16(&mut out, s);
        Ok(Some(out))
      },
      Value::Struct(s) => Ok(Some(s.to_bytes()?.to_vec())),
      Value::Array(a) => Ok(Some(a.to_bytes()?.to_vec())),
      Value::Opaque(o) => {
        let mut out = Vec::with_capacity(1 + o.bytes().len());
        out.push(Tag::Opaque.byte());
        out.extend_from_slice(o.bytes());
        Ok(Some(out))
      },
    }
  }

  /// Decodes a value from a full `tag + payload` view.
  ///
  /// Containers are *not* parsed here: decoding a struct or array produces a
  /// lazy container over the same backing buffer, whose directory is read on
  /// first access.  Primitives are decoded eagerly.
  pub fn decode(&self, view: &ByteView) -> Result<Value, FormErr> {
    let bytes = view.bytes();
    let tag = Tag::from_byte(read_u8(bytes, &mut 0)?)?;
    let payload = &bytes[1..];
    match tag {
      Tag::Struct => {
        Ok(Value::Struct(Struct::from_view(self.clone(), view.clone())))
      },
      Tag::Array => {
        Ok(Value::Array(Array::from_view(self.clone(), view.clone())))
      },
      Tag::Byte => Ok(Value::Byte(fixed_payload::<1>(tag, payload)?[0] as i8)),
      Tag::Char => {
        Ok(Value::Char(u16::from_le_bytes(fixed_payload(tag, payload)?)))
      },
      Tag::Double => Ok(Value::Double(f64::from_le_bytes(fixed_payload(
        tag, payload,
      )?))),
      Tag::Float => {
        Ok(Value::Float(f32::from_le_bytes(fixed_payload(tag, payload)?)))
      },
      Tag::Int32 => {
        Ok(Value::Int32(i32::from_le_bytes(fixed_payload(tag, payload)?)))
      },
      Tag::Int64 => {
        Ok(Value::Int64(i64::from_le_bytes(fixed_payload(tag, payload)?)))
      },
      Tag::Int16 => {
        Ok(Value::Int16(i16::from_le_bytes(fixed_payload(tag, payload)?)))
      },
      Tag::String => Ok(Value::String(read_utf16(payload)?)),
      Tag::Opaque => Ok(Value::Opaque(Opaque::from(payload))),
    }
  }

  /// Serializes a host value into an opaque [`Value`] via the codec.
  pub fn encode_opaque(&self, value: &dyn Any) -> Result<Value, FormErr> {
    let codec = match &self.opaque {
      Some(codec) => codec,
      None => return Err(err!(debug, FormErr::NoOpaqueCodec)),
    };
    let bytes = codec
      .encode(value)
      .map_err(|cause| err!(debug, FormErr::OpaqueCodec(cause)))?;
    Ok(Value::Opaque(Opaque::from(bytes)))
  }

  /// Deserializes a host value out of an opaque blob via the codec.
  pub fn decode_opaque(
    &self,
    opaque: &Opaque,
  ) -> Result<Box<dyn Any + Send + Sync>, FormErr> {
    let codec = match &self.opaque {
      Some(codec) => codec,
      None => return Err(err!(debug, FormErr::NoOpaqueCodec)),
    };
    codec
      .decode(opaque.bytes())
      .map_err(|cause| err!(debug, FormErr::OpaqueCodec(cause)))
  }
}

impl Debug for TypeRegistry {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("TypeRegistry")
      .field("opaque_codec", &self.opaque.is_some())
      .finish()
  }
}

/// A `tag + payload` encoding for a fixed-width primitive.
fn fixed(tag: Tag, payload: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(1 + payload.len());
  out.push(tag.byte());
  out.extend_from_slice(payload);
  out
}

/// Checks a fixed-width payload has exactly `N` bytes.
fn fixed_payload<const N: usize>(
  tag: Tag,
  payload: &[u8],
) -> Result<[u8; N], FormErr> {
  payload.try_into().map_err(|_| {
    err!(
      trace,
      FormErr::PayloadSize {
        tag,
        expected: N,
        actual: payload.len(),
      }
    )
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use std::fmt;

  fn round_trip(registry: &TypeRegistry, mut value: Value) -> Value {
    let bytes = registry
      .encode(&mut value)
      .unwrap()
      .expect("null has no encoding");
    let decoded = registry.decode(&ByteView::from(bytes)).unwrap();
    assert_eq!(decoded, value);
    decoded
  }

  #[test]
  fn primitive_round_trips() {
    let registry = TypeRegistry::new();
    round_trip(&registry, Value::Byte(-7));
    round_trip(&registry, Value::Char('c' as u16));
    round_trip(&registry, Value::Double(2.0));
    round_trip(&registry, Value::Float(3.0));
    round_trip(&registry, Value::Int32(4));
    round_trip(&registry, Value::Int64(5));
    round_trip(&registry, Value::Int16(-6));
    round_trip(&registry, Value::String("Hello World".into()));
    round_trip(&registry, Value::Opaque(Opaque::from(vec![0xAB, 0xCD])));
  }

  #[test]
  fn floats_survive_bit_for_bit() {
    let registry = TypeRegistry::new();
    for bits in [0u64, f64::NAN.to_bits(), (-0.0f64).to_bits(), u64::MAX] {
      round_trip(&registry, Value::Double(f64::from_bits(bits)));
    }
    round_trip(&registry, Value::Float(f32::from_bits(0x7FC0_0001)));
  }

  #[test]
  fn null_is_absence() {
    let registry = TypeRegistry::new();
    assert!(registry.encode(&mut Value::Null).unwrap().is_none());
  }

  #[test]
  fn unknown_tag_is_fatal() {
    let registry = TypeRegistry::new();
    let err = registry.decode(&ByteView::from(vec![0x7Fu8])).unwrap_err();
    assert!(matches!(err, FormErr::UnknownTag(0x7F)));
  }

  #[test]
  fn short_payload_is_fatal() {
    let registry = TypeRegistry::new();
    // An Int64 tag with only four payload bytes.
    let err = registry
      .decode(&ByteView::from(vec![0x08u8, 1, 2, 3, 4]))
      .unwrap_err();
    assert!(matches!(
      err,
      FormErr::PayloadSize {
        tag: Tag::Int64,
        expected: 8,
        actual: 4,
      }
    ));
  }

  #[test]
  fn odd_string_payload_is_fatal() {
    let registry = TypeRegistry::new();
    let err = registry
      .decode(&ByteView::from(vec![0x10u8, 0x48, 0x00, 0x69]))
      .unwrap_err();
    assert!(matches!(err, FormErr::BadUtf16));
  }

  #[test]
  fn string_payload_is_utf16le() {
    let registry = TypeRegistry::new();
    let mut value = Value::from("Hi");
    let bytes = registry.encode(&mut value).unwrap().unwrap();
    assert_eq!(bytes, vec![0x10, b'H', 0x00, b'i', 0x00]);
  }

  #[derive(Debug)]
  struct Unsupported;

  impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "unsupported host type")
    }
  }

  impl std::error::Error for Unsupported {}

  struct U32Codec;

  impl OpaqueCodec for U32Codec {
    fn encode(
      &self,
      value: &dyn Any,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
      let value = value.downcast_ref::<u32>().ok_or(Unsupported)?;
      Ok(value.to_le_bytes().to_vec())
    }

    fn decode(
      &self,
      bytes: &[u8],
    ) -> Result<Box<dyn Any + Send + Sync>, Box<dyn std::error::Error + Send + Sync>>
    {
      let bytes: [u8; 4] = bytes.try_into().map_err(|_| Unsupported)?;
      Ok(Box::new(u32::from_le_bytes(bytes)))
    }
  }

  #[test]
  fn opaque_codec_round_trip() {
    let registry = TypeRegistry::with_opaque(U32Codec);
    let value = registry.encode_opaque(&0xDEAD_BEEFu32).unwrap();
    let blob = match &value {
      Value::Opaque(o) => o.clone(),
      other => panic!("expected an opaque value, got {other:?}"),
    };
    let host = registry.decode_opaque(&blob).unwrap();
    assert_eq!(host.downcast_ref::<u32>(), Some(&0xDEAD_BEEFu32));
  }

  #[test]
  fn opaque_codec_failure_keeps_cause() {
    let registry = TypeRegistry::with_opaque(U32Codec);
    let err = registry.encode_opaque(&"not a u32").unwrap_err();
    match err {
      FormErr::OpaqueCodec(cause) => {
        assert_eq!(cause.to_string(), "unsupported host type")
      },
      other => panic!("expected an opaque codec fault, got {other:?}"),
    }
  }

  #[test]
  fn missing_codec_is_reported() {
    let registry = TypeRegistry::new();
    assert!(matches!(
      registry.encode_opaque(&1u32),
      Err(FormErr::NoOpaqueCodec)
    ));
  }
}
