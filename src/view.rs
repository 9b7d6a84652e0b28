//! Shared, read-only views into backing buffers.
//!
//! Every container and record constructed from an encoded buffer keeps a
//! [`ByteView`] rather than a copy of the bytes.  The underlying allocation is
//! reference-counted, so a nested container sliced out of its parent shares
//! the parent's buffer and keeps it alive for as long as the view exists.
//! Nothing in this crate ever writes through a `ByteView`.

use crate::codec::FormErr;
use core::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A cheaply cloneable `[start, end)` window into a shared byte buffer.
#[derive(Clone)]
pub struct ByteView {
  buf:   Arc<[u8]>,
  start: usize,
  end:   usize,
}

impl ByteView {
  /// Creates a view covering the entire buffer.
  pub fn new(buf: Arc<[u8]>) -> Self {
    let end = buf.len();
    ByteView { buf, start: 0, end }
  }

  /// Returns a sub-view of `self`, with `start..end` relative to this view.
  ///
  /// The new view shares the same backing allocation.  Returns
  /// [`FormErr::OutOfBounds`] if the requested range does not lie within
  /// this view.
  pub fn slice(&self, start: usize, end: usize) -> Result<ByteView, FormErr> {
    if start > end || end > self.len() {
      return Err(err!(
        trace,
        FormErr::OutOfBounds {
          index:  end,
          length: self.len(),
        }
      ));
    }
    Ok(ByteView {
      buf:   Arc::clone(&self.buf),
      start: self.start + start,
      end:   self.start + end,
    })
  }

  /// The number of bytes visible through this view.
  pub fn len(&self) -> usize {
    self.end - self.start
  }

  /// Returns `true` iff the view covers zero bytes.
  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }

  /// The bytes visible through this view.
  pub fn bytes(&self) -> &[u8] {
    &self.buf[self.start..self.end]
  }

  /// Copies the visible bytes into a new vector.
  pub fn to_vec(&self) -> Vec<u8> {
    self.bytes().to_vec()
  }
}

impl From<Vec<u8>> for ByteView {
  fn from(value: Vec<u8>) -> Self {
    ByteView::new(Arc::from(value))
  }
}

impl From<&[u8]> for ByteView {
  fn from(value: &[u8]) -> Self {
    ByteView::new(Arc::from(value))
  }
}

impl AsRef<[u8]> for ByteView {
  fn as_ref(&self) -> &[u8] {
    self.bytes()
  }
}

impl PartialEq for ByteView {
  fn eq(&self, other: &Self) -> bool {
    self.bytes() == other.bytes()
  }
}

impl Eq for ByteView {}

impl Debug for ByteView {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "ByteView({} bytes", self.len())?;
    for byte in self.bytes().iter().take(16) {
      write!(f, " {:02x}", byte)?;
    }
    if self.len() > 16 {
      write!(f, " ..")?;
    }
    write!(f, ")")
  }
}
