//! Reference-counted, address-stable pixel byte storage.
//!
//! [`PixelBuffer`] owns a fixed-length, zero-initialized byte allocation
//! whose heap address never changes for the allocation's lifetime. The
//! buffer carries an explicit reference count: every owner calls
//! [`add_reference`](PixelBuffer::add_reference) /
//! [`release_reference`](PixelBuffer::release_reference), and the storage
//! is freed deterministically the moment the count reaches zero — the
//! handle outlives the bytes, not the other way around.
//!
//! The count is deliberately non-atomic (`Cell`): this core is
//! single-threaded, and a multi-threaded host must serialize access.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Errors from pixel storage allocation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AllocationError {
    /// The allocator refused to reserve the requested storage.
    #[error("could not allocate {requested} bytes of pixel storage")]
    OutOfMemory {
        /// Requested byte length.
        requested: usize,
    },
    /// Width, height, and stride multiply past the addressable range.
    #[error("image dimensions overflow addressable memory")]
    DimensionsOverflow,
}

struct Shared {
    /// `None` once the count has hit zero and the storage was freed.
    bytes: RefCell<Option<Box<[u8]>>>,
    refs: Cell<usize>,
    len: usize,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let refs = self.refs.get();
        if refs != 0 {
            // Cannot panic in drop; report the invariant violation instead.
            log::error!("pixel buffer dropped with {refs} outstanding references");
        }
    }
}

/// Handle to reference-counted pixel byte storage.
///
/// Cloning the handle duplicates the *handle only* — it does not touch
/// the reference count. Owners that want to keep the storage alive must
/// call [`add_reference`](Self::add_reference) and balance it with
/// exactly one [`release_reference`](Self::release_reference).
///
/// Byte access is exposed only to the windowing layer; everything else
/// goes through [`PixelWindow`](crate::PixelWindow).
#[derive(Clone)]
pub struct PixelBuffer {
    shared: Rc<Shared>,
}

impl PixelBuffer {
    /// Allocate zero-filled storage of `len` bytes with a reference
    /// count of 1.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::OutOfMemory`] if the allocator cannot
    /// reserve the storage.
    pub fn allocate(len: usize) -> Result<Self, AllocationError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| AllocationError::OutOfMemory { requested: len })?;
        bytes.resize(len, 0);
        Ok(Self {
            shared: Rc::new(Shared {
                bytes: RefCell::new(Some(bytes.into_boxed_slice())),
                refs: Cell::new(1),
                len,
            }),
        })
    }

    /// Byte length fixed at allocation.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len
    }

    /// Whether the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.len == 0
    }

    /// Whether the storage has been freed (count reached zero).
    #[inline]
    pub fn is_released(&self) -> bool {
        self.shared.bytes.borrow().is_none()
    }

    /// Increment the reference count.
    ///
    /// No upper bound and no side effects beyond the counter.
    pub fn add_reference(&self) {
        if self.is_released() {
            log::error!("add_reference on a released pixel buffer");
            return;
        }
        self.shared.refs.set(self.shared.refs.get() + 1);
    }

    /// Decrement the reference count, freeing the storage at zero.
    ///
    /// Releasing past zero saturates and reports a fault rather than
    /// going negative; the storage is freed exactly once.
    pub fn release_reference(&self) {
        let refs = self.shared.refs.get();
        if refs == 0 {
            log::error!("release_reference on a pixel buffer whose count is already zero");
            return;
        }
        self.shared.refs.set(refs - 1);
        if refs == 1 {
            // Last reference gone: free the storage now, not at handle drop.
            self.shared.bytes.borrow_mut().take();
        }
    }

    /// Current reference count. Diagnostics and tests only — callers
    /// must not branch on it.
    #[inline]
    pub fn reference_count(&self) -> usize {
        self.shared.refs.get()
    }

    /// Force-close the buffer, freeing its storage.
    ///
    /// Idempotent when the count is already zero.
    ///
    /// # Panics
    ///
    /// Panics if any reference is still outstanding — closing live
    /// storage is a programming error, not a runtime condition.
    pub fn close(&self) {
        let refs = self.shared.refs.get();
        assert!(
            refs == 0,
            "closing a pixel buffer with {refs} outstanding references"
        );
        self.shared.bytes.borrow_mut().take();
    }

    /// Run `f` over the raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if the storage has been released.
    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.shared.bytes.borrow();
        let bytes = guard.as_deref().expect("pixel buffer used after release");
        f(bytes)
    }

    /// Run `f` over the raw bytes, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the storage has been released.
    pub(crate) fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.shared.bytes.borrow_mut();
        let bytes = guard.as_deref_mut().expect("pixel buffer used after release");
        f(bytes)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelBuffer({} bytes, {} refs{})",
            self.shared.len,
            self.shared.refs.get(),
            if self.is_released() { ", released" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_starts_at_one() {
        let buf = PixelBuffer::allocate(64).unwrap();
        assert_eq!(buf.reference_count(), 1);
        assert_eq!(buf.len(), 64);
        assert!(!buf.is_released());
        buf.release_reference();
    }

    #[test]
    fn zero_initialized() {
        let buf = PixelBuffer::allocate(16).unwrap();
        buf.with_bytes(|bytes| assert_eq!(bytes, &[0u8; 16]));
        buf.release_reference();
    }

    #[test]
    fn add_then_release_to_zero() {
        let buf = PixelBuffer::allocate(8).unwrap();
        buf.add_reference();
        assert_eq!(buf.reference_count(), 2);
        buf.release_reference();
        assert_eq!(buf.reference_count(), 1);
        assert!(!buf.is_released());
        buf.release_reference();
        assert_eq!(buf.reference_count(), 0);
        assert!(buf.is_released());
    }

    #[test]
    fn release_past_zero_saturates() {
        let buf = PixelBuffer::allocate(8).unwrap();
        buf.release_reference();
        buf.release_reference();
        assert_eq!(buf.reference_count(), 0);
        assert!(buf.is_released());
    }

    #[test]
    fn clone_shares_the_count() {
        let buf = PixelBuffer::allocate(8).unwrap();
        let other = buf.clone();
        other.add_reference();
        assert_eq!(buf.reference_count(), 2);
        buf.release_reference();
        other.release_reference();
        assert!(buf.is_released());
    }

    #[test]
    fn writes_are_visible_through_any_handle() {
        let buf = PixelBuffer::allocate(4).unwrap();
        let other = buf.clone();
        buf.with_bytes_mut(|bytes| bytes[2] = 0xAB);
        other.with_bytes(|bytes| assert_eq!(bytes[2], 0xAB));
        buf.release_reference();
    }

    #[test]
    #[should_panic(expected = "used after release")]
    fn access_after_release_panics() {
        let buf = PixelBuffer::allocate(8).unwrap();
        buf.release_reference();
        buf.with_bytes(|_| ());
    }

    #[test]
    #[should_panic(expected = "outstanding references")]
    fn close_with_live_references_panics() {
        let buf = PixelBuffer::allocate(8).unwrap();
        buf.close();
    }

    #[test]
    fn close_after_release_is_idempotent() {
        let buf = PixelBuffer::allocate(8).unwrap();
        buf.release_reference();
        buf.close();
        buf.close();
        assert!(buf.is_released());
    }

    #[test]
    fn zero_length_allocation() {
        let buf = PixelBuffer::allocate(0).unwrap();
        assert!(buf.is_empty());
        buf.with_bytes(|bytes| assert!(bytes.is_empty()));
        buf.release_reference();
    }
}
