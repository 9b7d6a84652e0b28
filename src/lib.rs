//! A lazy, convert-on-write binary object model.
//!
//! This crate reads and writes a compact tagged binary format built from
//! keyed structs, indexed arrays, a closed set of primitives, UTF-16 strings,
//! and opaque application-defined blobs.  Its defining property is laziness:
//! constructing a container over an encoded buffer parses nothing, reading a
//! field decodes exactly that field, and serializing an untouched container
//! hands back the original buffer without copying a byte.
//!
//! # Format
//!
//! Every value is a one-byte [`Tag`] followed by a payload.  Primitives carry
//! fixed-width little-endian payloads; strings carry UTF-16LE code units;
//! containers carry a directory of lengths followed by their members.  All
//! length and count fields are signed 32-bit little-endian.  Null has no
//! encoding at all: a null field or element is simply absent from the output.
//!
//! # Laziness and the overlay
//!
//! A [`Struct`] built from bytes keeps the buffer and an insertion-ordered
//! write overlay.  Reads materialize the key directory on first access and
//! decode values individually; writes land in the overlay and never touch the
//! buffer.  Serialization merges the two, preserving the original key order
//! and re-using the original bytes of every untouched value.  An [`Array`]
//! materializes its element list as a whole but still defers per-element
//! decoding the same way.
//!
//! ```
//! use byteform::{Struct, TypeRegistry};
//!
//! # fn main() -> Result<(), byteform::FormErr> {
//! let registry = TypeRegistry::new();
//!
//! let mut ship = Struct::new(registry.clone());
//! ship.put("callsign", "Rocinante")?;
//! ship.put("crew", 4i32)?;
//! let bytes = ship.to_bytes()?;
//!
//! let mut decoded = Struct::from_view(registry, bytes);
//! let callsign = decoded.get("callsign")?.and_then(|v| v.as_str());
//! assert_eq!(callsign, Some("Rocinante"));
//! # Ok(())
//! # }
//! ```
//!
//! # Faults
//!
//! Buffers are assumed well-formed; any structural problem observed during
//! decoding (an unknown tag, a length running past the buffer, a duplicate
//! key) is corruption or a version mismatch and surfaces as a fatal
//! [`FormErr`].  Nothing is ever silently replaced with a default.

#[macro_use]
mod macros;

mod codec;
mod collections;
mod record;
mod value;
mod view;

pub use self::{
  codec::{FormErr, OpaqueCodec, Tag, TypeRegistry},
  collections::{Array, Struct},
  record::Record,
  value::{Opaque, Value},
  view::ByteView,
};
