//! Format-typed rectangular views over shared pixel storage.

use std::cell::Cell;
use std::fmt;

use thiserror::Error;

use crate::buffer::PixelBuffer;
use crate::format::PixelFormat;

// ---------------------------------------------------------------------------
// Rect
// ---------------------------------------------------------------------------

/// Axis-aligned pixel rectangle in absolute buffer coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge, in pixels.
    pub x: u32,
    /// Top edge, in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle covers no pixels.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ---------------------------------------------------------------------------
// BoundsError
// ---------------------------------------------------------------------------

/// Errors from window creation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BoundsError {
    /// The stride cannot hold the rectangle's right edge.
    #[error("stride {stride} is smaller than the {required} bytes the rectangle's right edge needs")]
    StrideTooSmall {
        /// Provided stride in bytes.
        stride: usize,
        /// Bytes needed up to the rectangle's right edge.
        required: usize,
    },
    /// The rectangle addresses bytes past the end of the buffer.
    #[error("window needs {required} bytes but the buffer holds {available}")]
    InsufficientData {
        /// Bytes the window addresses.
        required: usize,
        /// Bytes the buffer holds.
        available: usize,
    },
    /// Rectangle or stride arithmetic overflows.
    #[error("window dimensions overflow the addressable range")]
    InvalidDimensions,
    /// The rectangle lies outside the image's pixel extents.
    #[error("rectangle exceeds the image extents ({width}x{height})")]
    OutsideImage {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
}

// ---------------------------------------------------------------------------
// PixelWindow
// ---------------------------------------------------------------------------

/// Bounded, format-typed view over a shared [`PixelBuffer`].
///
/// A window never copies pixel bytes — all access goes through the
/// shared buffer, and many windows may view the same storage. Creating
/// a window takes a reference on the buffer; [`dispose`](Self::dispose)
/// (or drop) releases it exactly once.
pub struct PixelWindow {
    buffer: PixelBuffer,
    format: PixelFormat,
    stride: usize,
    rect: Rect,
    disposed: Cell<bool>,
}

impl PixelWindow {
    /// Create a window over `buffer`, validating the rectangle against
    /// the buffer's extents.
    ///
    /// On success the buffer's reference count is incremented.
    ///
    /// # Errors
    ///
    /// Returns a [`BoundsError`] when the stride cannot hold the
    /// rectangle, the rectangle addresses bytes the buffer does not
    /// have, or the arithmetic overflows. Nothing is referenced on
    /// failure.
    pub fn new(
        buffer: &PixelBuffer,
        format: PixelFormat,
        stride: usize,
        rect: Rect,
    ) -> Result<Self, BoundsError> {
        let bpp = format.bytes_per_pixel();
        let right = (rect.x as usize)
            .checked_add(rect.width as usize)
            .and_then(|px| px.checked_mul(bpp))
            .ok_or(BoundsError::InvalidDimensions)?;
        if right > stride {
            return Err(BoundsError::StrideTooSmall {
                stride,
                required: right,
            });
        }
        if !rect.is_empty() {
            let last_row = rect.y as usize + rect.height as usize - 1;
            let required = last_row
                .checked_mul(stride)
                .and_then(|start| start.checked_add(right))
                .ok_or(BoundsError::InvalidDimensions)?;
            if required > buffer.len() {
                return Err(BoundsError::InsufficientData {
                    required,
                    available: buffer.len(),
                });
            }
        }
        buffer.add_reference();
        Ok(Self {
            buffer: buffer.clone(),
            format,
            stride,
            rect,
            disposed: Cell::new(false),
        })
    }

    /// The shared buffer backing this window.
    #[inline]
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Pixel format of the viewed bytes.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Byte distance between row starts.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The window rectangle, in absolute buffer coordinates.
    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Window width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.rect.width
    }

    /// Window height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.rect.height
    }

    /// Byte offset of pixel `(x, y)`: `stride * y + bpp * x`.
    ///
    /// Coordinates are absolute and must lie inside the window
    /// rectangle (debug-asserted).
    #[inline]
    pub fn byte_offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(
            x >= self.rect.x && x < self.rect.x + self.rect.width,
            "x={x} outside window columns {}..{}",
            self.rect.x,
            self.rect.x + self.rect.width
        );
        debug_assert!(
            y >= self.rect.y && y < self.rect.y + self.rect.height,
            "y={y} outside window rows {}..{}",
            self.rect.y,
            self.rect.y + self.rect.height
        );
        self.stride * y as usize + self.format.bytes_per_pixel() * x as usize
    }

    /// Whether [`dispose`](Self::dispose) has already run.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Release the buffer reference taken at creation.
    ///
    /// Idempotent: only the first call releases. Also runs on drop, so
    /// calling it explicitly is optional.
    pub fn dispose(&self) {
        if !self.disposed.replace(true) {
            self.buffer.release_reference();
        }
    }

    /// Run `f` over the underlying storage bytes.
    ///
    /// The slice spans the whole buffer, not just the rectangle; use
    /// [`byte_offset`](Self::byte_offset) to address window pixels.
    ///
    /// # Panics
    ///
    /// Panics if the window is disposed or the buffer was released.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        assert!(!self.disposed.get(), "pixel window used after dispose");
        self.buffer.with_bytes(f)
    }

    /// Run `f` over the underlying storage bytes, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the window is disposed or the buffer was released.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        assert!(!self.disposed.get(), "pixel window used after dispose");
        self.buffer.with_bytes_mut(f)
    }
}

impl Drop for PixelWindow {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for PixelWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelWindow({}x{} at {},{}, {:?}, stride {})",
            self.rect.width, self.rect.height, self.rect.x, self.rect.y, self.format, self.stride
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(len: usize) -> PixelBuffer {
        PixelBuffer::allocate(len).unwrap()
    }

    #[test]
    fn create_references_and_dispose_releases() {
        let buf = buffer(4 * 4 * 3);
        let window =
            PixelWindow::new(&buf, PixelFormat::Bgr24, 12, Rect::new(0, 0, 4, 4)).unwrap();
        assert_eq!(buf.reference_count(), 2);
        window.dispose();
        assert_eq!(buf.reference_count(), 1);
        // Second dispose is a no-op.
        window.dispose();
        assert_eq!(buf.reference_count(), 1);
        buf.release_reference();
    }

    #[test]
    fn drop_disposes_once() {
        let buf = buffer(12);
        {
            let window =
                PixelWindow::new(&buf, PixelFormat::Bgr24, 12, Rect::new(0, 0, 4, 1)).unwrap();
            assert_eq!(buf.reference_count(), 2);
            window.dispose();
        }
        assert_eq!(buf.reference_count(), 1);
        buf.release_reference();
    }

    #[test]
    fn stride_too_small() {
        let buf = buffer(100);
        let err = PixelWindow::new(&buf, PixelFormat::Bgr24, 8, Rect::new(0, 0, 4, 1));
        assert_eq!(
            err.err(),
            Some(BoundsError::StrideTooSmall {
                stride: 8,
                required: 12
            })
        );
        // Failed creation leaves the count untouched.
        assert_eq!(buf.reference_count(), 1);
        buf.release_reference();
    }

    #[test]
    fn rect_past_buffer_end() {
        let buf = buffer(12 * 2);
        let err = PixelWindow::new(&buf, PixelFormat::Bgr24, 12, Rect::new(0, 0, 4, 3));
        assert_eq!(
            err.err(),
            Some(BoundsError::InsufficientData {
                required: 36,
                available: 24
            })
        );
        buf.release_reference();
    }

    #[test]
    fn interior_rect_offsets() {
        // 8x4 BGRA32 buffer, window over the middle 4x2.
        let buf = buffer(8 * 4 * 4);
        let window =
            PixelWindow::new(&buf, PixelFormat::Bgra32, 32, Rect::new(2, 1, 4, 2)).unwrap();
        assert_eq!(window.byte_offset(2, 1), 32 + 8);
        assert_eq!(window.byte_offset(5, 2), 64 + 20);
        buf.release_reference();
    }

    #[test]
    fn empty_rect_is_allowed() {
        let buf = buffer(0);
        let window =
            PixelWindow::new(&buf, PixelFormat::Bgr24, 0, Rect::new(0, 0, 0, 0)).unwrap();
        assert!(window.rect().is_empty());
        buf.release_reference();
    }

    #[test]
    fn bytes_visible_through_window() {
        let buf = buffer(6);
        let window = PixelWindow::new(&buf, PixelFormat::Bgr24, 6, Rect::new(0, 0, 2, 1)).unwrap();
        window.with_bytes_mut(|bytes| bytes[3] = 7);
        window.with_bytes(|bytes| assert_eq!(bytes[3], 7));
        window.dispose();
        buf.release_reference();
    }

    #[test]
    #[should_panic(expected = "after dispose")]
    fn access_after_dispose_panics() {
        let buf = buffer(6);
        let window = PixelWindow::new(&buf, PixelFormat::Bgr24, 6, Rect::new(0, 0, 2, 1)).unwrap();
        window.dispose();
        window.with_bytes(|_| ());
    }
}
