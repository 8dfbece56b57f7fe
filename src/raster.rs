//! Owned raster images over shared pixel storage.
//!
//! [`Raster`] is the image container the rest of the crate works with:
//! dimensions, a declared [`PixelFormat`], a 4-byte-rounded stride (the
//! packed-bitmap convention), the backing [`PixelBuffer`], and an
//! optional palette for indexed data. Pixel access goes through locked
//! [`PixelWindow`]s; conversions composite transparency over opaque
//! white, which is what every JPEG-bound path needs.

use imgref::{ImgRef, ImgVec};
use rgb::Rgb;
use rgb::alt::BGRA;

use crate::buffer::{AllocationError, PixelBuffer};
use crate::format::PixelFormat;
use crate::window::{BoundsError, PixelWindow, Rect};

/// Row stride for `width` pixels, rounded up to a 4-byte boundary.
fn aligned_stride(width: u32, format: PixelFormat) -> Option<usize> {
    (width as usize)
        .checked_mul(format.bytes_per_pixel())?
        .checked_add(3)
        .map(|n| n & !3)
}

/// Owned image: dimensions, declared format, stride, shared storage.
///
/// The raster holds one reference on its buffer for its whole lifetime;
/// locked windows take their own. Dropping the raster releases its
/// reference, so the storage goes away once the last window is gone.
pub struct Raster {
    buffer: PixelBuffer,
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    palette: Option<Vec<BGRA<u8>>>,
}

impl Raster {
    /// Allocate a zero-filled raster.
    ///
    /// # Errors
    ///
    /// [`AllocationError::DimensionsOverflow`] when `width * height`
    /// does not fit addressable memory, or
    /// [`AllocationError::OutOfMemory`] when the storage cannot be
    /// reserved.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, AllocationError> {
        let stride =
            aligned_stride(width, format).ok_or(AllocationError::DimensionsOverflow)?;
        let len = stride
            .checked_mul(height as usize)
            .ok_or(AllocationError::DimensionsOverflow)?;
        let buffer = PixelBuffer::allocate(len)?;
        Ok(Self {
            buffer,
            format,
            width,
            height,
            stride,
            palette: None,
        })
    }

    /// Attach a palette (meaningful for [`PixelFormat::Indexed8`]).
    ///
    /// Entries are straight-alpha BGRA; indices without an entry
    /// resolve to opaque black.
    pub fn with_palette(mut self, palette: Vec<BGRA<u8>>) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Declared pixel format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Byte distance between row starts.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The palette, if one is attached.
    #[inline]
    pub fn palette(&self) -> Option<&[BGRA<u8>]> {
        self.palette.as_deref()
    }

    /// The shared buffer backing this raster.
    #[inline]
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Lock the full image extent as a [`PixelWindow`].
    pub fn lock(&self) -> Result<PixelWindow, BoundsError> {
        self.lock_rect(Rect::new(0, 0, self.width, self.height))
    }

    /// Lock a sub-rectangle as a [`PixelWindow`].
    ///
    /// # Errors
    ///
    /// [`BoundsError::OutsideImage`] when the rectangle does not lie
    /// within the image extents, or any window-creation error.
    pub fn lock_rect(&self, rect: Rect) -> Result<PixelWindow, BoundsError> {
        let in_x = rect.x.checked_add(rect.width).is_some_and(|r| r <= self.width);
        let in_y = rect.y.checked_add(rect.height).is_some_and(|b| b <= self.height);
        if !in_x || !in_y {
            return Err(BoundsError::OutsideImage {
                width: self.width,
                height: self.height,
            });
        }
        PixelWindow::new(&self.buffer, self.format, self.stride, rect)
    }

    /// Build a BGR24 raster from packed RGB pixels.
    pub fn from_rgb8(img: ImgRef<'_, Rgb<u8>>) -> Result<Self, AllocationError> {
        let raster = Raster::new(img.width() as u32, img.height() as u32, PixelFormat::Bgr24)?;
        raster.buffer.with_bytes_mut(|dst| {
            for (y, row) in img.rows().enumerate() {
                let mut pos = y * raster.stride;
                for px in row {
                    dst[pos] = px.b;
                    dst[pos + 1] = px.g;
                    dst[pos + 2] = px.r;
                    pos += 3;
                }
            }
        });
        Ok(raster)
    }

    /// Render onto a fresh packed-BGR24 raster.
    ///
    /// Formats that may carry transparency are composited over opaque
    /// white; opaque formats are copied. The result always feeds a
    /// compressor that expects fully opaque 3-byte pixels.
    pub fn to_bgr24(&self) -> Result<Raster, AllocationError> {
        let canvas = Raster::new(self.width, self.height, PixelFormat::Bgr24)?;
        let bpp = self.format.bytes_per_pixel();
        self.buffer.with_bytes(|src| {
            canvas.buffer.with_bytes_mut(|dst| {
                for y in 0..self.height as usize {
                    let mut src_pos = y * self.stride;
                    let mut dst_pos = y * canvas.stride;
                    for _ in 0..self.width {
                        let [b, g, r] = composite_over_white(
                            self.format,
                            self.palette.as_deref(),
                            &src[src_pos..src_pos + bpp],
                        );
                        dst[dst_pos] = b;
                        dst[dst_pos + 1] = g;
                        dst[dst_pos + 2] = r;
                        src_pos += bpp;
                        dst_pos += 3;
                    }
                }
            });
        });
        Ok(canvas)
    }

    /// Convert to packed RGB pixels, compositing over opaque white.
    ///
    /// Infallible by design: the generic fallback encoder relies on
    /// this always producing a buffer.
    pub fn to_rgb8(&self) -> ImgVec<Rgb<u8>> {
        let bpp = self.format.bytes_per_pixel();
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize);
        self.buffer.with_bytes(|src| {
            for y in 0..self.height as usize {
                let row = &src[y * self.stride..];
                for px in row[..self.width as usize * bpp].chunks_exact(bpp) {
                    let [b, g, r] =
                        composite_over_white(self.format, self.palette.as_deref(), px);
                    pixels.push(Rgb { r, g, b });
                }
            }
        });
        ImgVec::new(pixels, self.width as usize, self.height as usize)
    }
}

impl Drop for Raster {
    fn drop(&mut self) {
        self.buffer.release_reference();
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Raster({}x{}, {:?}, stride {})",
            self.width, self.height, self.format, self.stride
        )
    }
}

// ---------------------------------------------------------------------------
// Compositing helpers
// ---------------------------------------------------------------------------

/// Resolve one pixel to straight B,G,R composited over opaque white.
fn composite_over_white(
    format: PixelFormat,
    palette: Option<&[BGRA<u8>]>,
    px: &[u8],
) -> [u8; 3] {
    match format {
        PixelFormat::Bgr24 | PixelFormat::Bgrx32 => [px[0], px[1], px[2]],
        PixelFormat::Bgra32 => straight_over_white(px[0], px[1], px[2], px[3]),
        PixelFormat::PremultipliedBgra32 => {
            let white = 255 - px[3] as u32;
            [
                premul_over_white(px[0], white),
                premul_over_white(px[1], white),
                premul_over_white(px[2], white),
            ]
        }
        PixelFormat::Indexed8 => {
            let entry = palette
                .and_then(|p| p.get(px[0] as usize))
                .copied()
                .unwrap_or(BGRA {
                    b: 0,
                    g: 0,
                    r: 0,
                    a: 255,
                });
            straight_over_white(entry.b, entry.g, entry.r, entry.a)
        }
    }
}

fn straight_over_white(b: u8, g: u8, r: u8, a: u8) -> [u8; 3] {
    let a = a as u32;
    let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
    [blend(b), blend(g), blend(r)]
}

/// Premultiplied channel over white: the white term `255 * (255 - a)`
/// divides out exactly.
fn premul_over_white(c: u8, white: u32) -> u8 {
    (c as u32 + white).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_rounds_to_four_bytes() {
        let raster = Raster::new(3, 2, PixelFormat::Bgr24).unwrap();
        assert_eq!(raster.stride(), 12);
        let raster = Raster::new(4, 2, PixelFormat::Bgr24).unwrap();
        assert_eq!(raster.stride(), 12);
        let raster = Raster::new(3, 2, PixelFormat::Bgra32).unwrap();
        assert_eq!(raster.stride(), 12);
    }

    #[test]
    fn lock_takes_and_returns_a_reference() {
        let raster = Raster::new(2, 2, PixelFormat::Bgr24).unwrap();
        assert_eq!(raster.buffer().reference_count(), 1);
        {
            let window = raster.lock().unwrap();
            assert_eq!(raster.buffer().reference_count(), 2);
            assert_eq!(window.width(), 2);
            assert_eq!(window.stride(), raster.stride());
        }
        assert_eq!(raster.buffer().reference_count(), 1);
    }

    #[test]
    fn drop_releases_the_storage() {
        let raster = Raster::new(2, 2, PixelFormat::Bgr24).unwrap();
        let buffer = raster.buffer().clone();
        drop(raster);
        assert!(buffer.is_released());
    }

    #[test]
    fn lock_rect_outside_extents() {
        let raster = Raster::new(4, 4, PixelFormat::Bgr24).unwrap();
        let err = raster.lock_rect(Rect::new(2, 0, 3, 4));
        assert_eq!(
            err.err(),
            Some(BoundsError::OutsideImage {
                width: 4,
                height: 4
            })
        );
    }

    #[test]
    fn from_rgb8_swaps_to_bgr() {
        let img = ImgVec::new(vec![Rgb { r: 1u8, g: 2, b: 3 }, Rgb { r: 4, g: 5, b: 6 }], 2, 1);
        let raster = Raster::from_rgb8(img.as_ref()).unwrap();
        raster.buffer().with_bytes(|bytes| {
            assert_eq!(&bytes[..6], &[3, 2, 1, 6, 5, 4]);
        });
    }

    #[test]
    fn rgb8_round_trip() {
        let pixels = vec![
            Rgb { r: 10u8, g: 20, b: 30 },
            Rgb { r: 40, g: 50, b: 60 },
            Rgb { r: 70, g: 80, b: 90 },
            Rgb {
                r: 100,
                g: 110,
                b: 120,
            },
        ];
        let img = ImgVec::new(pixels.clone(), 2, 2);
        let raster = Raster::from_rgb8(img.as_ref()).unwrap();
        let back = raster.to_rgb8();
        assert_eq!(back.buf(), &pixels);
    }

    #[test]
    fn straight_alpha_composites_over_white() {
        let raster = Raster::new(2, 1, PixelFormat::Bgra32).unwrap();
        let window = raster.lock().unwrap();
        window.with_bytes_mut(|bytes| {
            // Fully transparent, then half-covered black.
            bytes[..8].copy_from_slice(&[9, 9, 9, 0, 0, 0, 0, 128]);
        });
        drop(window);
        let rgb = raster.to_rgb8();
        assert_eq!(rgb.buf()[0], Rgb { r: 255, g: 255, b: 255 });
        // 0 * 128 + 255 * 127, rounded: 127.
        assert_eq!(rgb.buf()[1], Rgb { r: 127, g: 127, b: 127 });
    }

    #[test]
    fn premultiplied_composites_over_white() {
        let raster = Raster::new(1, 1, PixelFormat::PremultipliedBgra32).unwrap();
        let window = raster.lock().unwrap();
        window.with_bytes_mut(|bytes| bytes[..4].copy_from_slice(&[0, 0, 0, 128]));
        drop(window);
        let rgb = raster.to_rgb8();
        assert_eq!(rgb.buf()[0], Rgb { r: 127, g: 127, b: 127 });
    }

    #[test]
    fn indexed_resolves_through_the_palette() {
        let palette = vec![
            BGRA {
                b: 255,
                g: 0,
                r: 0,
                a: 255,
            },
            BGRA {
                b: 0,
                g: 0,
                r: 0,
                a: 0,
            },
        ];
        let raster = Raster::new(3, 1, PixelFormat::Indexed8)
            .unwrap()
            .with_palette(palette);
        let window = raster.lock().unwrap();
        // Indices: blue entry, transparent entry, out-of-range.
        window.with_bytes_mut(|bytes| bytes[..3].copy_from_slice(&[0, 1, 9]));
        drop(window);
        let rgb = raster.to_rgb8();
        assert_eq!(rgb.buf()[0], Rgb { r: 0, g: 0, b: 255 });
        assert_eq!(rgb.buf()[1], Rgb { r: 255, g: 255, b: 255 });
        assert_eq!(rgb.buf()[2], Rgb { r: 0, g: 0, b: 0 });
    }

    #[test]
    fn bgrx_copy_drops_the_padding_byte() {
        let raster = Raster::new(1, 1, PixelFormat::Bgrx32).unwrap();
        let window = raster.lock().unwrap();
        window.with_bytes_mut(|bytes| bytes[..4].copy_from_slice(&[1, 2, 3, 250]));
        drop(window);
        let bgr = raster.to_bgr24().unwrap();
        assert_eq!(bgr.format(), PixelFormat::Bgr24);
        bgr.buffer().with_bytes(|bytes| assert_eq!(&bytes[..3], &[1, 2, 3]));
    }

    #[test]
    fn to_bgr24_keeps_dimensions() {
        let raster = Raster::new(5, 3, PixelFormat::Bgra32).unwrap();
        let bgr = raster.to_bgr24().unwrap();
        assert_eq!((bgr.width(), bgr.height()), (5, 3));
        assert_eq!(bgr.stride(), 16);
    }
}
