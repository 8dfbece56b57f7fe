//! Byte-level raster manipulation: shared pixel storage, windowed
//! views, in-place filters, and a streaming JPEG bridge.
//!
//! This crate provides:
//!
//! - [`PixelBuffer`] — reference-counted, address-stable byte storage
//!   with deterministic release at count zero
//! - [`PixelWindow`] — a format-typed, bounds-validated view over
//!   shared storage; many windows may share one buffer
//! - [`apply_filter`] (and the direct entry points [`invert`],
//!   [`grayscale`], [`adjust_color`]) — in-place filters dispatched by
//!   [`PixelFormat`], premultiplied-alpha aware
//! - [`Raster`] — the owned image container: dimensions, format,
//!   stride, palette, lockable into windows
//! - [`encode_jpeg`] — normalizes to packed BGR, streams scanlines into
//!   a [`ScanlineCompressor`], and falls back to the builtin encoder on
//!   any failure; only an unwritable destination surfaces as an error
//!
//! Everything here is synchronous and single-threaded; reference-count
//! mutation is not atomic, and a multi-threaded host must serialize
//! access to shared buffers.

#![forbid(unsafe_code)]

mod buffer;
mod compressor;
mod filters;
mod format;
mod jpeg;
mod raster;
mod window;

pub use buffer::{AllocationError, PixelBuffer};
pub use compressor::{CompressError, CompressorConfig, JpegBlockCompressor, ScanlineCompressor};
pub use filters::{
    FilterArgs, FilterError, FilterKind, adjust_color, apply_filter, grayscale, invert,
};
pub use format::{ColorAdjustment, GrayscaleWeighting, PixelFormat};
pub use jpeg::{EncodeError, JpegOptions, encode_jpeg, encode_jpeg_with};
pub use raster::Raster;
pub use window::{BoundsError, PixelWindow, Rect};

// Re-exports for callers building pixel data.
pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb;
pub use rgb::Rgb;
pub use rgb::alt::BGRA as Bgra;
