//! Pixel format descriptors and filter parameter types.

// ---------------------------------------------------------------------------
// PixelFormat
// ---------------------------------------------------------------------------

/// Byte layout of a packed pixel.
///
/// All multi-channel formats store channels in B,G,R(,A) order — the
/// native order of packed Windows-style bitmaps. `Indexed8` carries
/// 8-bit palette indices; windows and rasters can hold it, but the
/// filter engine rejects it.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel, B,G,R.
    Bgr24,
    /// 4 bytes per pixel, B,G,R plus a padding byte with no meaning.
    Bgrx32,
    /// 4 bytes per pixel, B,G,R,A with straight (unassociated) alpha.
    Bgra32,
    /// 4 bytes per pixel, B,G,R,A with color channels pre-scaled by
    /// `alpha / 255`.
    PremultipliedBgra32,
    /// 1 byte per pixel, palette index.
    Indexed8,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr24 => 3,
            Self::Bgrx32 | Self::Bgra32 | Self::PremultipliedBgra32 => 4,
            Self::Indexed8 => 1,
        }
    }

    /// Whether the fourth channel carries meaningful alpha.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Bgra32 | Self::PremultipliedBgra32)
    }

    /// Whether color channels are stored pre-scaled by alpha.
    #[inline]
    pub const fn is_premultiplied(self) -> bool {
        matches!(self, Self::PremultipliedBgra32)
    }

    /// Whether pixels in this format can be anything but fully opaque.
    ///
    /// Indexed formats count: palette entries may carry alpha. Drives
    /// the white-fill decision when normalizing for JPEG output.
    #[inline]
    pub const fn may_have_transparency(self) -> bool {
        matches!(
            self,
            Self::Bgra32 | Self::PremultipliedBgra32 | Self::Indexed8
        )
    }
}

// ---------------------------------------------------------------------------
// GrayscaleWeighting
// ---------------------------------------------------------------------------

/// Coefficient set for luminance extraction.
///
/// Selects the `(r, g, b)` weight triple applied by the grayscale
/// filter. `Accurate` is the odd one out: it averages the three
/// channels instead of weighting them.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GrayscaleWeighting {
    /// ITU BT.601 (NTSC) luma: 0.299, 0.587, 0.114.
    Ntsc,
    /// Classic "natural" weights: 0.3086, 0.6094, 0.0820.
    #[default]
    Natural,
    /// CSS / BT.709 luma: 0.2126, 0.7152, 0.0722.
    Css,
    /// Equal thirds.
    Simple,
    /// Plain arithmetic mean of the three channels, computed rather
    /// than weighted.
    Accurate,
}

impl GrayscaleWeighting {
    /// The `(r, g, b)` weight triple, or `None` for [`Accurate`](Self::Accurate).
    ///
    /// Every triple sums to 1.0.
    pub const fn weights(self) -> Option<(f32, f32, f32)> {
        match self {
            Self::Ntsc => Some((0.299, 0.587, 0.114)),
            Self::Natural => Some((0.3086, 0.6094, 0.0820)),
            Self::Css => Some((0.2126, 0.7152, 0.0722)),
            Self::Simple => Some((1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)),
            Self::Accurate => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ColorAdjustment
// ---------------------------------------------------------------------------

/// Per-channel additive color deltas.
///
/// Each delta is clamped to `[-255, 255]` on assignment, so a stored
/// adjustment is always applicable without further range checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorAdjustment {
    r: i16,
    g: i16,
    b: i16,
}

impl ColorAdjustment {
    /// Create an adjustment, clamping each delta to `[-255, 255]`.
    pub fn new(r: i16, g: i16, b: i16) -> Self {
        Self {
            r: r.clamp(-255, 255),
            g: g.clamp(-255, 255),
            b: b.clamp(-255, 255),
        }
    }

    /// Red delta.
    #[inline]
    pub fn r(self) -> i16 {
        self.r
    }

    /// Green delta.
    #[inline]
    pub fn g(self) -> i16 {
        self.g
    }

    /// Blue delta.
    #[inline]
    pub fn b(self) -> i16 {
        self.b
    }

    /// Replace the red delta, clamped to `[-255, 255]`.
    pub fn set_r(&mut self, r: i16) {
        self.r = r.clamp(-255, 255);
    }

    /// Replace the green delta, clamped to `[-255, 255]`.
    pub fn set_g(&mut self, g: i16) {
        self.g = g.clamp(-255, 255);
    }

    /// Replace the blue delta, clamped to `[-255, 255]`.
    pub fn set_b(&mut self, b: i16) {
        self.b = b.clamp(-255, 255);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(PixelFormat::Bgr24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Bgrx32.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Bgra32.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::PremultipliedBgra32.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Indexed8.bytes_per_pixel(), 1);
    }

    #[test]
    fn alpha_flags() {
        assert!(!PixelFormat::Bgr24.has_alpha());
        assert!(!PixelFormat::Bgrx32.has_alpha());
        assert!(PixelFormat::Bgra32.has_alpha());
        assert!(PixelFormat::PremultipliedBgra32.has_alpha());
        assert!(PixelFormat::PremultipliedBgra32.is_premultiplied());
        assert!(!PixelFormat::Bgra32.is_premultiplied());
    }

    #[test]
    fn transparency_candidates() {
        assert!(!PixelFormat::Bgr24.may_have_transparency());
        assert!(!PixelFormat::Bgrx32.may_have_transparency());
        assert!(PixelFormat::Bgra32.may_have_transparency());
        assert!(PixelFormat::PremultipliedBgra32.may_have_transparency());
        assert!(PixelFormat::Indexed8.may_have_transparency());
    }

    #[test]
    fn weights_sum_to_one() {
        for mode in [
            GrayscaleWeighting::Ntsc,
            GrayscaleWeighting::Natural,
            GrayscaleWeighting::Css,
            GrayscaleWeighting::Simple,
        ] {
            let (r, g, b) = mode.weights().unwrap();
            assert!(
                (r + g + b - 1.0).abs() < 1e-4,
                "{mode:?} sums to {}",
                r + g + b
            );
        }
        assert!(GrayscaleWeighting::Accurate.weights().is_none());
    }

    #[test]
    fn default_weighting_is_natural() {
        assert_eq!(GrayscaleWeighting::default(), GrayscaleWeighting::Natural);
    }

    #[test]
    fn adjustment_clamps_on_assign() {
        let adj = ColorAdjustment::new(300, -10, 0);
        assert_eq!((adj.r(), adj.g(), adj.b()), (255, -10, 0));

        let mut adj = ColorAdjustment::default();
        adj.set_b(-999);
        adj.set_g(999);
        assert_eq!(adj.b(), -255);
        assert_eq!(adj.g(), 255);
    }
}
