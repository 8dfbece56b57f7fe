//! JPEG encode bridge: normalize, stream scanlines, fall back.
//!
//! The primary path normalizes the source to packed BGR, locks its
//! pixels, and streams one scanline per call into a
//! [`ScanlineCompressor`], swapping each B,G,R triple to the R,G,B
//! order the compressor expects. *Any* failure along that path —
//! normalization, locking, streaming, or the compressor itself — is
//! silenced to a debug log and recovered by re-encoding through the
//! generic builtin encoder at the same mapped quality. The only error
//! a caller ever sees is the fallback failing to write the destination.
//!
//! The destination file is overwritten in place; there is no atomic
//! replace, so an interrupted stream can leave partial output behind
//! until the fallback engages.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use rgb::ComponentBytes;
use thiserror::Error;

use crate::compressor::{CompressorConfig, JpegBlockCompressor, ScanlineCompressor};
use crate::format::PixelFormat;
use crate::raster::Raster;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// JPEG encode configuration.
///
/// Quality and smoothing live on a `[0, 1]` scale and are mapped to the
/// compressor's `[0, 100]` integers by `round(x * 100)`, clamped. The
/// same mapping feeds both the primary and the fallback path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JpegOptions {
    /// Output quality in `[0, 1]`.
    pub quality: f32,
    /// Input smoothing in `[0, 1]`; 0 disables.
    pub smoothing: f32,
    /// Multi-scan (progressive) layout instead of baseline.
    pub progressive: bool,
}

impl JpegOptions {
    /// Options at `quality`, no smoothing, progressive layout.
    pub fn new(quality: f32) -> Self {
        Self {
            quality,
            smoothing: 0.0,
            progressive: true,
        }
    }

    /// Set the smoothing factor.
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Toggle progressive layout.
    pub fn with_progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self::new(0.75)
    }
}

/// Map a `[0, 1]` parameter to the compressor's `[0, 100]` scale.
fn percent(value: f32) -> u8 {
    ((value * 100.0).round() as i32).clamp(0, 100) as u8
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The one error class the bridge surfaces: even the fallback could not
/// write the destination.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The destination was not writable.
    #[error("could not write JPEG to {path}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying encoder or I/O failure.
        #[source]
        source: image::ImageError,
    },
}

// ---------------------------------------------------------------------------
// The bridge
// ---------------------------------------------------------------------------

/// Encode `raster` as a JPEG file at `path`.
///
/// Streams through the production block compressor; on any primary-path
/// failure the same image is re-encoded via the builtin fallback
/// encoder. The destination is overwritten if it exists.
///
/// # Errors
///
/// Only [`EncodeError::Write`], when even the fallback cannot write
/// `path`. Compressor-internal faults never surface.
pub fn encode_jpeg(raster: &Raster, path: &Path, options: &JpegOptions) -> Result<(), EncodeError> {
    match File::create(path) {
        Ok(file) => {
            let mut compressor = JpegBlockCompressor::new(BufWriter::new(file));
            encode_jpeg_with(raster, path, options, &mut compressor)
        }
        Err(err) => {
            log::debug!(
                "jpeg destination {} not creatable ({err}); trying the builtin encoder",
                path.display()
            );
            encode_with_builtin(raster, path, percent(options.quality))
        }
    }
}

/// [`encode_jpeg`] over a caller-supplied compressor.
///
/// The compressor already owns its destination sink; the fallback, when
/// it engages, writes `path` itself.
pub fn encode_jpeg_with<C: ScanlineCompressor>(
    raster: &Raster,
    path: &Path,
    options: &JpegOptions,
    compressor: &mut C,
) -> Result<(), EncodeError> {
    match stream_scanlines(raster, options, compressor) {
        Ok(()) => Ok(()),
        Err(err) => {
            log::debug!("primary jpeg path failed ({err}); using the builtin encoder");
            encode_with_builtin(raster, path, percent(options.quality))
        }
    }
}

/// The primary path: Normalize → LockSource → StreamRows → FinishCompress.
fn stream_scanlines<C: ScanlineCompressor>(
    raster: &Raster,
    options: &JpegOptions,
    compressor: &mut C,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let normalized;
    let source = if raster.format() == PixelFormat::Bgr24 {
        raster
    } else {
        normalized = raster.to_bgr24()?;
        &normalized
    };

    let window = source.lock()?;
    compressor.begin(CompressorConfig {
        width: source.width(),
        height: source.height(),
        components: 3,
        quality: percent(options.quality),
        smoothing: percent(options.smoothing),
        progressive: options.progressive,
    })?;

    let line = source.width() as usize * 3;
    let mut scanline = vec![0u8; line];
    let stride = window.stride();
    window.with_bytes(|data| -> Result<(), C::Error> {
        for y in 0..source.height() as usize {
            scanline.copy_from_slice(&data[y * stride..y * stride + line]);
            // Source rows are B,G,R; the compressor wants R,G,B.
            for px in scanline.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            compressor.push_scanline(&scanline)?;
        }
        Ok(())
    })?;
    compressor.finish()?;
    Ok(())
}

/// The fallback: the generic builtin encoder at the same mapped quality.
///
/// Always produces a valid file unless the destination itself is
/// unwritable, which is the only error that propagates.
fn encode_with_builtin(raster: &Raster, path: &Path, quality: u8) -> Result<(), EncodeError> {
    let rgb = raster.to_rgb8();
    let (buf, width, height) = rgb.as_ref().to_contiguous_buf();
    let write_err = |source: image::ImageError| EncodeError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|e| write_err(image::ImageError::IoError(e)))?;
    // The builtin codec's quality floor is 1.
    JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100))
        .write_image(
            buf.as_bytes(),
            width as u32,
            height as u32,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(write_err)
}
