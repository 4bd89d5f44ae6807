//! Random-access video reading
//!
//! A [`VideoReader`] binds one file to its FFmpeg contexts, frame-index
//! table, and GOP cache. Every 1-based frame index maps to exactly one
//! decoded image, bit-for-bit repeatable across reads and sessions.
//!
//! Reads are synchronous and must be issued in sequence by the owning
//! caller; distinct readers over distinct files are independent.

use ffmpeg_next as ffmpeg;

use std::path::{Path, PathBuf};

use ffmpeg::format::Pixel;
use tracing::{debug, info, warn};

pub mod cache;
pub mod decode;
pub mod index;
pub mod nal;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameFormat};
use self::cache::GopCache;
use self::decode::Converter;
use self::index::{FrameIndex, IndexedInput};

/// Open-time options for a read session
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    /// Force grayscale (`Some(true)`) or RGB (`Some(false)`) output.
    /// When unset, the container's `is_grayscale` tag decides, then
    /// the source pixel format.
    pub output_gray: Option<bool>,
}

impl ReaderOptions {
    /// Explicitly select grayscale or RGB output
    pub fn gray(mut self, gray: bool) -> Self {
        self.output_gray = Some(gray);
        self
    }
}

/// Attributes fixed at open time, readable for the life of the handle
#[derive(Debug, Clone, Copy)]
struct ReaderMeta {
    frame_count: u64,
    width: u32,
    height: u32,
    frame_rate: (i32, i32),
    pts_increment: i64,
    output_gray: bool,
}

struct ReaderInner {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    table: FrameIndex,
    conv: Converter,
    cache: GopCache,
}

/// Read session over one video file
///
/// Dropping the reader releases every FFmpeg context; [`close`] does
/// the same eagerly and is idempotent.
///
/// [`close`]: VideoReader::close
pub struct VideoReader {
    path: PathBuf,
    meta: ReaderMeta,
    inner: Option<ReaderInner>,
}

impl VideoReader {
    /// Open `path` for random-access reading with default options.
    ///
    /// Fails if the file violates the random-access contract: open-GOP
    /// HEVC, misaligned or duplicated PTS, non-integer PTS increment,
    /// hardware-only decoder, or an empty stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    /// Open with explicit options
    pub fn open_with<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let IndexedInput {
            ictx,
            decoder,
            stream_index,
            table,
        } = index::open_indexed(&path)?;

        // Output format is fixed once per session: explicit setting
        // wins, then the container tag, then the source pixel format.
        let output_gray = options
            .output_gray
            .or(table.gray_hint)
            .unwrap_or_else(|| {
                matches!(
                    decoder.format(),
                    Pixel::GRAY8 | Pixel::GRAY16BE | Pixel::GRAY16LE
                )
            });

        let meta = ReaderMeta {
            frame_count: table.frame_count,
            width: table.width,
            height: table.height,
            frame_rate: table.frame_rate,
            pts_increment: table.pts_increment,
            output_gray,
        };
        let conv = Converter::new(table.width, table.height, output_gray);

        info!(
            "Opened {} for reading: {} frames, output {}",
            path.display(),
            meta.frame_count,
            if output_gray { "Gray8" } else { "Rgb24" }
        );

        Ok(Self {
            path,
            meta,
            inner: Some(ReaderInner {
                ictx,
                decoder,
                stream_index,
                table,
                conv,
                cache: GopCache::new(),
            }),
        })
    }

    /// Source file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total frame count
    pub fn num_frames(&self) -> u64 {
        self.meta.frame_count
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// Stream frame rate as `(numerator, denominator)`
    pub fn frame_rate(&self) -> (i32, i32) {
        self.meta.frame_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        let (num, den) = self.meta.frame_rate;
        self.meta.frame_count as f64 * den as f64 / num as f64
    }

    /// Whether reads return grayscale frames
    pub fn is_gray(&self) -> bool {
        self.meta.output_gray
    }

    /// Exact time-base units per frame
    pub fn pts_increment(&self) -> i64 {
        self.meta.pts_increment
    }

    /// 0-based `[start, end)` window of the currently cached GOP.
    /// Diagnostic only; `None` when the cache is empty or the session
    /// is closed.
    pub fn cache_span(&self) -> Option<(u64, u64)> {
        self.inner.as_ref().and_then(|inner| inner.cache.span())
    }

    /// Read the frame at 1-based `index`.
    ///
    /// A cache hit copies straight out of the cached GOP; a miss
    /// decodes the whole GOP containing `index` into the cache first.
    /// The returned frame is always an owned copy.
    pub fn read(&mut self, index: u64) -> Result<Frame> {
        let meta = self.meta;
        let inner = self.inner.as_mut().ok_or_else(|| Error::AlreadyClosed {
            path: self.path.display().to_string(),
        })?;
        if index < 1 || index > meta.frame_count {
            return Err(Error::InvalidIndex {
                index,
                num_frames: meta.frame_count,
            });
        }
        let target = index - 1;

        let ReaderInner {
            ref mut ictx,
            ref mut decoder,
            stream_index,
            ref table,
            ref mut conv,
            ref mut cache,
        } = *inner;

        if cache.lookup(target).is_none() {
            debug!(index, "cache miss, decoding GOP");
            cache.populate(
                ictx,
                decoder,
                stream_index,
                &table.dts,
                table.pts_increment,
                target,
                conv,
            )?;
        }

        let bytes = cache.lookup(target).ok_or_else(|| Error::DecodeError {
            message: format!("frame {index} missing from cache after GOP decode"),
        })?;
        frame_from_bytes(&meta, bytes)
    }

    /// Read the 1-based inclusive range `[start, end]` in order.
    ///
    /// One seek, one sustained decode pass into one block; the GOP
    /// cache is deliberately bypassed (a range read already touches
    /// every frame it needs).
    pub fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<Frame>> {
        let meta = self.meta;
        let inner = self.inner.as_mut().ok_or_else(|| Error::AlreadyClosed {
            path: self.path.display().to_string(),
        })?;
        if start < 1 || start > end || end > meta.frame_count {
            return Err(Error::InvalidRange {
                start,
                end,
                num_frames: meta.frame_count,
            });
        }

        let ReaderInner {
            ref mut ictx,
            ref mut decoder,
            stream_index,
            ref table,
            ref mut conv,
            ..
        } = *inner;

        let count = (end - start + 1) as usize;
        let frame_size = conv.frame_size();
        let mut block = vec![0u8; count * frame_size];
        decode::decode_range(
            ictx,
            decoder,
            stream_index,
            &table.dts,
            table.pts_increment,
            conv,
            start - 1,
            end - 1,
            &mut block,
        )?;

        let mut frames = Vec::with_capacity(count);
        for chunk in block.chunks_exact(frame_size) {
            frames.push(frame_from_bytes(&meta, chunk)?);
        }
        Ok(frames)
    }

    /// Release the session's FFmpeg contexts and cache.
    ///
    /// Idempotent: a second close warns and no-ops.
    pub fn close(&mut self) {
        match self.inner.take() {
            Some(_) => debug!("closed reader for {}", self.path.display()),
            None => warn!("reader for {} is already closed", self.path.display()),
        }
    }
}

fn frame_from_bytes(meta: &ReaderMeta, bytes: &[u8]) -> Result<Frame> {
    let format = if meta.output_gray {
        FrameFormat::Gray8
    } else {
        FrameFormat::Rgb24
    };
    Frame::from_raw(meta.width, meta.height, format, bytes.to_vec())
}
