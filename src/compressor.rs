//! The external block-compressor boundary.
//!
//! [`ScanlineCompressor`] is the seam the encode bridge streams through:
//! configure once, push packed rows top-to-bottom, finish. The
//! production implementation, [`JpegBlockCompressor`], drives the
//! `jpeg-encoder` crate; like any block codec it buffers the frame
//! internally before compressing, so a push call can only fail on row
//! discipline, never on codec state.

use std::io::Write;

use jpeg_encoder::{ColorType, Encoder};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// One encode's worth of compressor configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressorConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Samples per pixel: 3 for packed RGB, 1 for grayscale.
    pub components: u8,
    /// Quality on the compressor's `[0, 100]` scale.
    pub quality: u8,
    /// Input smoothing factor on the `[0, 100]` scale; 0 disables.
    pub smoothing: u8,
    /// Request a multi-scan (progressive) layout instead of baseline.
    pub progressive: bool,
}

// ---------------------------------------------------------------------------
// The boundary trait
// ---------------------------------------------------------------------------

/// Push-based scanline compressor.
///
/// Call [`begin`](Self::begin) once, push exactly `height` rows of
/// `width * components` bytes in top-to-bottom order, then
/// [`finish`](Self::finish). Implementations own their destination
/// sink; internal warnings stay internal — only hard failures surface
/// through `Error`.
pub trait ScanlineCompressor {
    /// The compressor-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Configure the compressor for one frame.
    fn begin(&mut self, config: CompressorConfig) -> Result<(), Self::Error>;

    /// Push the next scanline (packed, `width * components` bytes).
    fn push_scanline(&mut self, row: &[u8]) -> Result<(), Self::Error>;

    /// Compress the frame and write it to the sink.
    fn finish(&mut self) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// Production implementation
// ---------------------------------------------------------------------------

/// Errors from [`JpegBlockCompressor`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompressError {
    /// A row arrived before [`ScanlineCompressor::begin`].
    #[error("scanline pushed before the compressor was configured")]
    NotStarted,
    /// Width or height is zero.
    #[error("frame dimensions must be nonzero")]
    InvalidDimensions,
    /// JPEG frames cap both dimensions at 65 535.
    #[error("frame {width}x{height} exceeds the JPEG dimension limit")]
    DimensionsTooLarge {
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
    },
    /// Only packed RGB (3) and grayscale (1) are supported.
    #[error("unsupported component count {0}")]
    UnsupportedComponents(u8),
    /// A pushed row had the wrong byte length.
    #[error("scanline holds {actual} bytes, expected {expected}")]
    RowLength {
        /// Expected `width * components`.
        expected: usize,
        /// Bytes actually pushed.
        actual: usize,
    },
    /// More rows pushed than the configured height.
    #[error("more than {height} scanlines pushed")]
    TooManyRows {
        /// Configured frame height.
        height: u32,
    },
    /// `finish` called before every row arrived.
    #[error("finish after {received} of {expected} scanlines")]
    MissingRows {
        /// Configured frame height.
        expected: u32,
        /// Rows received so far.
        received: u32,
    },
    /// The frame buffer could not be reserved.
    #[error("could not reserve the frame buffer")]
    OutOfMemory,
    /// The underlying codec failed.
    #[error("jpeg codec error")]
    Codec(#[from] jpeg_encoder::EncodingError),
    /// The destination sink failed.
    #[error("destination write failed")]
    Io(#[from] std::io::Error),
}

/// Block JPEG compressor over any [`Write`] sink.
///
/// Buffers the pushed rows, optionally applies libjpeg-style input
/// smoothing, then compresses the whole frame on
/// [`finish`](ScanlineCompressor::finish).
pub struct JpegBlockCompressor<W: Write> {
    sink: W,
    config: Option<CompressorConfig>,
    rows: Vec<u8>,
    rows_received: u32,
}

impl<W: Write> JpegBlockCompressor<W> {
    /// Create a compressor writing to `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            config: None,
            rows: Vec::new(),
            rows_received: 0,
        }
    }

    /// Unwrap the destination sink.
    pub fn into_sink(self) -> W {
        self.sink
    }
}

impl<W: Write> ScanlineCompressor for JpegBlockCompressor<W> {
    type Error = CompressError;

    fn begin(&mut self, config: CompressorConfig) -> Result<(), CompressError> {
        if config.width == 0 || config.height == 0 {
            return Err(CompressError::InvalidDimensions);
        }
        if config.width > u16::MAX as u32 || config.height > u16::MAX as u32 {
            return Err(CompressError::DimensionsTooLarge {
                width: config.width,
                height: config.height,
            });
        }
        if config.components != 1 && config.components != 3 {
            return Err(CompressError::UnsupportedComponents(config.components));
        }
        let frame = config.width as usize * config.height as usize * config.components as usize;
        self.rows.clear();
        self.rows
            .try_reserve_exact(frame)
            .map_err(|_| CompressError::OutOfMemory)?;
        self.rows_received = 0;
        self.config = Some(config);
        Ok(())
    }

    fn push_scanline(&mut self, row: &[u8]) -> Result<(), CompressError> {
        let config = self.config.as_ref().ok_or(CompressError::NotStarted)?;
        let expected = config.width as usize * config.components as usize;
        if row.len() != expected {
            return Err(CompressError::RowLength {
                expected,
                actual: row.len(),
            });
        }
        if self.rows_received >= config.height {
            return Err(CompressError::TooManyRows {
                height: config.height,
            });
        }
        self.rows.extend_from_slice(row);
        self.rows_received += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CompressError> {
        let config = self.config.take().ok_or(CompressError::NotStarted)?;
        if self.rows_received != config.height {
            return Err(CompressError::MissingRows {
                expected: config.height,
                received: self.rows_received,
            });
        }
        if config.smoothing > 0 {
            self.rows = smooth_rows(
                &self.rows,
                config.width as usize,
                config.height as usize,
                config.components as usize,
                config.smoothing,
            );
        }
        let color = match config.components {
            1 => ColorType::Luma,
            _ => ColorType::Rgb,
        };
        // The codec's quality floor is 1.
        if config.quality == 0 {
            log::debug!("quality 0 raised to the codec floor of 1");
        }
        let mut encoded = Vec::new();
        let mut encoder = Encoder::new(&mut encoded, config.quality.clamp(1, 100));
        encoder.set_progressive(config.progressive);
        encoder.encode(
            &self.rows,
            config.width as u16,
            config.height as u16,
            color,
        )?;
        self.sink.write_all(&encoded)?;
        self.sink.flush()?;
        self.rows = Vec::new();
        Ok(())
    }
}

/// Libjpeg-style input smoothing: blend each sample toward its 3x3
/// neighborhood mean by `factor / 100`. Edge samples clamp their
/// neighborhood to the frame.
fn smooth_rows(
    rows: &[u8],
    width: usize,
    height: usize,
    components: usize,
    factor: u8,
) -> Vec<u8> {
    let factor = factor.min(100) as u32;
    let row_len = width * components;
    let mut out = vec![0u8; rows.len()];
    for y in 0..height {
        for x in 0..width {
            for c in 0..components {
                let mut sum = 0u32;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let ny = (y as i64 + dy).clamp(0, height as i64 - 1) as usize;
                        let nx = (x as i64 + dx).clamp(0, width as i64 - 1) as usize;
                        sum += rows[ny * row_len + nx * components + c] as u32;
                    }
                }
                let mean = (sum + 4) / 9;
                let pos = y * row_len + x * components + c;
                let sample = rows[pos] as u32;
                out[pos] = ((sample * (100 - factor) + mean * factor + 50) / 100) as u8;
            }
        }
    }
    out
}
