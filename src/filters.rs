//! In-place pixel filters dispatched by pixel format.
//!
//! Every filter is a pure function of a window and its parameters: it
//! mutates the window's bytes directly, respecting rectangle and
//! stride, and reports a single result per invocation. Validation
//! failures (`MissingArgument`, `IncompatiblePixelFormat`) happen at
//! dispatch, before any byte is touched, so a failed call is guaranteed
//! to have made no mutation. Filters never allocate.
//!
//! Numeric policy: alpha is read as `byte / 255` in `[0, 1]`; division
//! by zero alpha is guarded (the contribution is 0, never NaN); final
//! byte writes clamp to `[0, 255]` and narrow by truncation.

use thiserror::Error;

use crate::format::{ColorAdjustment, GrayscaleWeighting, PixelFormat};
use crate::window::PixelWindow;

// ---------------------------------------------------------------------------
// Dispatch surface
// ---------------------------------------------------------------------------

/// Filter selector for [`apply_filter`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Channel inversion, `255 - c`.
    Invert,
    /// Luminance extraction into all three color channels.
    Grayscale,
    /// Additive per-channel color deltas.
    ColorAdjust,
}

/// Optional parameters for [`apply_filter`].
///
/// Filters read what they need and ignore the rest: grayscale falls
/// back to [`GrayscaleWeighting::Natural`] when no weighting is given,
/// while color adjustment with no deltas is a
/// [`FilterError::MissingArgument`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterArgs {
    /// Grayscale coefficient selection.
    pub weighting: Option<GrayscaleWeighting>,
    /// Color adjustment deltas.
    pub adjustment: Option<ColorAdjustment>,
}

impl FilterArgs {
    /// Empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a grayscale weighting.
    pub fn with_weighting(mut self, weighting: GrayscaleWeighting) -> Self {
        self.weighting = Some(weighting);
        self
    }

    /// Supply color adjustment deltas.
    pub fn with_adjustment(mut self, adjustment: ColorAdjustment) -> Self {
        self.adjustment = Some(adjustment);
        self
    }
}

/// Why a filter declined to run. No bytes are mutated in either case.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterError {
    /// A required parameter was not supplied.
    #[error("a required filter parameter is missing")]
    MissingArgument,
    /// The window's pixel format is not in the filter dispatch table.
    #[error("the pixel format is not supported by this filter")]
    IncompatiblePixelFormat,
}

/// Apply `kind` to `window` in place.
///
/// # Errors
///
/// [`FilterError::MissingArgument`] when `kind` needs a parameter that
/// `args` does not carry; [`FilterError::IncompatiblePixelFormat`] when
/// the window's format is outside the dispatch table. The window is
/// untouched on error.
pub fn apply_filter(
    window: &PixelWindow,
    kind: FilterKind,
    args: &FilterArgs,
) -> Result<(), FilterError> {
    match kind {
        FilterKind::Invert => invert(window),
        FilterKind::Grayscale => grayscale(window, args.weighting.unwrap_or_default()),
        FilterKind::ColorAdjust => {
            let adjustment = args.adjustment.ok_or(FilterError::MissingArgument)?;
            adjust_color(window, adjustment)
        }
    }
}

// ---------------------------------------------------------------------------
// Invert
// ---------------------------------------------------------------------------

/// Invert the color channels of every pixel in the window.
///
/// Alpha is never modified. For the premultiplied format the channels
/// are un-premultiplied, inverted, and re-premultiplied, truncating at
/// each narrowing step.
pub fn invert(window: &PixelWindow) -> Result<(), FilterError> {
    match window.format() {
        PixelFormat::Bgr24 => for_each_pixel(window, 3, invert_packed),
        PixelFormat::Bgrx32 | PixelFormat::Bgra32 => for_each_pixel(window, 4, invert_packed),
        PixelFormat::PremultipliedBgra32 => for_each_pixel(window, 4, invert_premultiplied),
        _ => Err(FilterError::IncompatiblePixelFormat),
    }
}

fn invert_packed(px: &mut [u8]) {
    px[0] = 255 - px[0];
    px[1] = 255 - px[1];
    px[2] = 255 - px[2];
}

fn invert_premultiplied(px: &mut [u8]) {
    let scale = alpha_scale(px[3]);
    for c in &mut px[..3] {
        let straight = unpremultiply(*c, scale);
        *c = ((255.0 - straight).clamp(0.0, 255.0) * scale) as u8;
    }
}

// ---------------------------------------------------------------------------
// Grayscale
// ---------------------------------------------------------------------------

/// Replace every pixel's color channels with its luminance.
///
/// `Accurate` averages the three channels; the other modes apply the
/// selected weight triple. The premultiplied variant un-premultiplies
/// each channel before weighting and re-premultiplies the single gray
/// value written to all three channels.
pub fn grayscale(window: &PixelWindow, weighting: GrayscaleWeighting) -> Result<(), FilterError> {
    match window.format() {
        PixelFormat::Bgr24 => gray_packed(window, 3, weighting),
        PixelFormat::Bgrx32 | PixelFormat::Bgra32 => gray_packed(window, 4, weighting),
        PixelFormat::PremultipliedBgra32 => gray_premultiplied(window, weighting),
        _ => Err(FilterError::IncompatiblePixelFormat),
    }
}

fn gray_packed(
    window: &PixelWindow,
    bpp: usize,
    weighting: GrayscaleWeighting,
) -> Result<(), FilterError> {
    match weighting.weights() {
        None => for_each_pixel(window, bpp, |px| {
            let sum = px[0] as u32 + px[1] as u32 + px[2] as u32;
            let gray = (sum as f32 / 3.0) as u8;
            px[0] = gray;
            px[1] = gray;
            px[2] = gray;
        }),
        Some((wr, wg, wb)) => for_each_pixel(window, bpp, |px| {
            let gray = (px[0] as f32 * wb + px[1] as f32 * wg + px[2] as f32 * wr) as u8;
            px[0] = gray;
            px[1] = gray;
            px[2] = gray;
        }),
    }
}

fn gray_premultiplied(
    window: &PixelWindow,
    weighting: GrayscaleWeighting,
) -> Result<(), FilterError> {
    match weighting.weights() {
        None => for_each_pixel(window, 4, |px| {
            let scale = alpha_scale(px[3]);
            let sum = unpremultiply(px[0], scale)
                + unpremultiply(px[1], scale)
                + unpremultiply(px[2], scale);
            let gray = ((sum / 3.0).clamp(0.0, 255.0) * scale) as u8;
            px[0] = gray;
            px[1] = gray;
            px[2] = gray;
        }),
        Some((wr, wg, wb)) => for_each_pixel(window, 4, |px| {
            let scale = alpha_scale(px[3]);
            let weighted = unpremultiply(px[0], scale) * wb
                + unpremultiply(px[1], scale) * wg
                + unpremultiply(px[2], scale) * wr;
            let gray = (weighted.clamp(0.0, 255.0) * scale) as u8;
            px[0] = gray;
            px[1] = gray;
            px[2] = gray;
        }),
    }
}

// ---------------------------------------------------------------------------
// Color adjustment
// ---------------------------------------------------------------------------

/// Add the per-channel deltas to every pixel, clamping to `[0, 255]`.
///
/// Alpha is never modified. The premultiplied variant un-premultiplies,
/// adds, clamps, then re-premultiplies.
pub fn adjust_color(
    window: &PixelWindow,
    adjustment: ColorAdjustment,
) -> Result<(), FilterError> {
    match window.format() {
        PixelFormat::Bgr24 => adjust_packed(window, 3, adjustment),
        PixelFormat::Bgrx32 | PixelFormat::Bgra32 => adjust_packed(window, 4, adjustment),
        PixelFormat::PremultipliedBgra32 => adjust_premultiplied(window, adjustment),
        _ => Err(FilterError::IncompatiblePixelFormat),
    }
}

fn adjust_packed(
    window: &PixelWindow,
    bpp: usize,
    adjustment: ColorAdjustment,
) -> Result<(), FilterError> {
    let (db, dg, dr) = (
        adjustment.b() as i32,
        adjustment.g() as i32,
        adjustment.r() as i32,
    );
    for_each_pixel(window, bpp, |px| {
        px[0] = (px[0] as i32 + db).clamp(0, 255) as u8;
        px[1] = (px[1] as i32 + dg).clamp(0, 255) as u8;
        px[2] = (px[2] as i32 + dr).clamp(0, 255) as u8;
    })
}

fn adjust_premultiplied(
    window: &PixelWindow,
    adjustment: ColorAdjustment,
) -> Result<(), FilterError> {
    let deltas = [
        adjustment.b() as f32,
        adjustment.g() as f32,
        adjustment.r() as f32,
    ];
    for_each_pixel(window, 4, |px| {
        let scale = alpha_scale(px[3]);
        for (c, delta) in px[..3].iter_mut().zip(deltas) {
            let value = (unpremultiply(*c, scale) + delta) as i32;
            *c = (value.clamp(0, 255) as f32 * scale) as u8;
        }
    })
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Run `f` over every pixel of the window rectangle, row by row.
fn for_each_pixel(
    window: &PixelWindow,
    bpp: usize,
    mut f: impl FnMut(&mut [u8]),
) -> Result<(), FilterError> {
    let rect = window.rect();
    let stride = window.stride();
    window.with_bytes_mut(|data| {
        for y in rect.y..rect.y + rect.height {
            let start = stride * y as usize + bpp * rect.x as usize;
            let row = &mut data[start..start + bpp * rect.width as usize];
            for px in row.chunks_exact_mut(bpp) {
                f(px);
            }
        }
    });
    Ok(())
}

/// Stored alpha byte as a `[0, 1]` scale factor.
#[inline]
fn alpha_scale(alpha: u8) -> f32 {
    alpha as f32 / 255.0
}

/// Channel divided back out of premultiplied space. Zero alpha is
/// guarded: the contribution is 0, not NaN.
#[inline]
fn unpremultiply(channel: u8, scale: f32) -> f32 {
    if scale > 0.0 {
        channel as f32 / scale
    } else {
        0.0
    }
}
