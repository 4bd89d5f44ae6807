//! framedex: deterministic frame-indexed H.265 video I/O
//!
//! Machine-vision pipelines need the same frame index to produce the
//! same pixels, every time, in any access order. framedex builds that
//! guarantee on top of FFmpeg: a validated mapping from 1-based frame
//! indices to stream timestamps, a seek-then-decode protocol that
//! tolerates B-frame reordering, a single-GOP decoded-frame cache for
//! cheap nearby accesses, and a writer that emits exactly the closed-GOP
//! files the reader demands.
//!
//! # Reading
//!
//! ```no_run
//! use framedex::VideoReader;
//!
//! # fn main() -> framedex::Result<()> {
//! let mut video = VideoReader::open("flies.mp4")?;
//! let frame = video.read(1)?;
//! let batch = video.read_range(10, 20)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Writing
//!
//! ```no_run
//! use framedex::{Frame, VideoWriter, WriterConfig};
//!
//! # fn main() -> framedex::Result<()> {
//! let config = WriterConfig::new(256, 256, 30);
//! let mut writer = VideoWriter::create("out.mp4", config)?;
//! writer.write(&Frame::gray8(256, 256))?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

use ffmpeg_next as ffmpeg;

use once_cell::sync::OnceCell;

pub mod cli;
pub mod convert;
pub mod error;
pub mod frame;
pub mod reader;
pub mod writer;

mod ffmpeg_util;

pub use convert::{import, ImportOptions, ImportReport};
pub use error::{Error, ErrorKind, Result};
pub use frame::{Frame, FrameFormat};
pub use reader::{ReaderOptions, VideoReader};
pub use writer::{VideoWriter, WriterConfig};

static FFMPEG_INIT: OnceCell<()> = OnceCell::new();

/// One-time FFmpeg initialization.
///
/// Called implicitly by [`VideoReader::open`] and
/// [`VideoWriter::create`]; also sets FFmpeg's process-wide log level
/// to warning so codec chatter stays out of application logs.
pub fn init() -> Result<()> {
    FFMPEG_INIT
        .get_or_try_init(|| {
            ffmpeg::init().map_err(|e| Error::Init {
                message: e.to_string(),
            })?;
            unsafe { ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_WARNING as i32) };
            Ok(())
        })
        .map(|_| ())
}
