//! Sequential H.265 writing
//!
//! A [`VideoWriter`] produces a closed-GOP HEVC MP4 that the reader
//! treats as a fully random-accessible source: PTS runs 0, 1, 2, … in
//! a time base equal to the frame interval, the GOP structure is
//! encoder-enforced closed, and the `is_grayscale` container tag
//! records whether the content is visually grayscale.

use ffmpeg_next as ffmpeg;

use std::path::{Path, PathBuf};

use ffmpeg::codec;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::{Dictionary, Rational};
use tracing::{info, trace, warn};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameFormat};

/// Write-session configuration
///
/// Defaults: grayscale input, GOP size 50, CRF 18.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    width: u32,
    height: u32,
    frame_rate: (i32, i32),
    is_color: bool,
    gop_size: u32,
    crf: u8,
}

impl WriterConfig {
    /// New configuration for `width` x `height` frames at an integer
    /// frame rate
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_rate: (fps as i32, 1),
            is_color: false,
            gop_size: 50,
            crf: 18,
        }
    }

    /// Set a rational frame rate, e.g. `(14997, 100)`
    pub fn with_frame_rate(mut self, num: i32, den: i32) -> Self {
        self.frame_rate = (num, den);
        self
    }

    /// Accept RGB frames instead of grayscale
    pub fn with_color(mut self, is_color: bool) -> Self {
        self.is_color = is_color;
        self
    }

    /// Keyframe interval in frames
    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    /// Constant rate factor, 0 (best) to 51
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate(&self) -> (i32, i32) {
        self.frame_rate
    }

    pub fn is_color(&self) -> bool {
        self.is_color
    }

    pub fn gop_size(&self) -> u32 {
        self.gop_size
    }

    pub fn crf(&self) -> u8 {
        self.crf
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::EncodeError {
                message: format!(
                    "width and height must be positive (got {}x{})",
                    self.width, self.height
                ),
            });
        }
        if self.frame_rate.0 <= 0 || self.frame_rate.1 <= 0 {
            return Err(Error::EncodeError {
                message: format!(
                    "frame rate must be positive (got {}/{})",
                    self.frame_rate.0, self.frame_rate.1
                ),
            });
        }
        if self.gop_size < 1 {
            return Err(Error::EncodeError {
                message: "gop_size must be at least 1".into(),
            });
        }
        if self.crf > 51 {
            return Err(Error::EncodeError {
                message: format!("CRF value {} is invalid (must be 0-51)", self.crf),
            });
        }
        Ok(())
    }
}

/// Forward-only writer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Writing,
    Flushed,
    Closed,
}

struct WriterInner {
    octx: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: scaling::Context,
    src_frame: ffmpeg::frame::Video,
    yuv_frame: ffmpeg::frame::Video,
    next_pts: i64,
    codec_time_base: Rational,
    stream_index: usize,
}

/// Write session producing one closed-GOP HEVC MP4
///
/// Frames are encoded in call order; frame `k` (0-based) gets PTS `k`.
/// [`close`] flushes the encoder and writes the trailer; dropping an
/// unclosed writer does the same with a warning.
///
/// [`close`]: VideoWriter::close
pub struct VideoWriter {
    path: PathBuf,
    config: WriterConfig,
    stage: Stage,
    frames_written: u64,
    inner: Option<WriterInner>,
}

impl VideoWriter {
    /// Create `path` and open an encoder session for it
    pub fn create<P: AsRef<Path>>(path: P, config: WriterConfig) -> Result<Self> {
        crate::init()?;
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();

        let mut octx =
            ffmpeg::format::output_as(&path, "mp4").map_err(|e| Error::EncodeError {
                message: format!("could not open output '{path_str}': {e}"),
            })?;

        let hevc = ffmpeg::encoder::find(codec::Id::HEVC).ok_or_else(|| Error::EncodeError {
            message: "H.265 encoder not found. Is libx265 available?".into(),
        })?;

        let (fr_num, fr_den) = config.frame_rate;
        // Time base = frame interval, so each frame advances PTS by
        // exactly 1. The reader's indexing invariants depend on this.
        let codec_time_base = Rational::new(fr_den, fr_num);

        let stream_index = {
            let mut ost = octx.add_stream(hevc).map_err(|e| Error::EncodeError {
                message: format!("could not add video stream: {e}"),
            })?;
            ost.set_time_base(codec_time_base);
            ost.index()
        };

        let mut enc = codec::context::Context::new_with_codec(hevc)
            .encoder()
            .video()
            .map_err(|e| Error::EncodeError {
                message: format!("could not create video encoder: {e}"),
            })?;
        enc.set_width(config.width);
        enc.set_height(config.height);
        enc.set_format(Pixel::YUV420P);
        enc.set_time_base(codec_time_base);
        enc.set_frame_rate(Some(Rational::new(fr_num, fr_den)));
        enc.set_gop(config.gop_size);
        if octx
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
        {
            enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        // Closed GOP is the contract, not a preference: the reader
        // rejects CRA/BLA/RASL NAL units at open.
        let mut opts = Dictionary::new();
        opts.set(
            "x265-params",
            &format!(
                "no-open-gop=1:keyint={}:crf={}",
                config.gop_size, config.crf
            ),
        );

        let encoder = enc.open_with(opts).map_err(|e| Error::EncodeError {
            message: format!("could not open H.265 encoder: {e}"),
        })?;

        {
            let mut ost = octx
                .stream_mut(stream_index)
                .ok_or_else(|| Error::NullHandle {
                    message: format!("output stream {stream_index} vanished during setup"),
                })?;
            ost.set_parameters(&encoder);
            ost.set_rate(Rational::new(fr_num, fr_den));
        }

        let mut metadata = Dictionary::new();
        metadata.set("is_grayscale", if config.is_color { "0" } else { "1" });
        octx.set_metadata(metadata);

        // MP4 only muxes custom keys when told to.
        let mut mux_opts = Dictionary::new();
        mux_opts.set("movflags", "use_metadata_tags");
        octx.write_header_with(mux_opts)
            .map_err(|e| Error::EncodeError {
                message: format!("could not write container header: {e}"),
            })?;

        let src_format = if config.is_color {
            Pixel::RGB24
        } else {
            Pixel::GRAY8
        };
        let src_frame = ffmpeg::frame::Video::new(src_format, config.width, config.height);
        let yuv_frame = ffmpeg::frame::Video::new(Pixel::YUV420P, config.width, config.height);
        let scaler = scaling::Context::get(
            src_format,
            config.width,
            config.height,
            Pixel::YUV420P,
            config.width,
            config.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| Error::EncodeError {
            message: format!("could not create YUV420P converter: {e}"),
        })?;

        info!(
            "Opened {path_str} for writing: {}x{} at {fr_num}/{fr_den} fps, \
             gop {}, crf {}, {}",
            config.width,
            config.height,
            config.gop_size,
            config.crf,
            if config.is_color { "RGB" } else { "grayscale" }
        );

        Ok(Self {
            path,
            config,
            stage: Stage::Writing,
            frames_written: 0,
            inner: Some(WriterInner {
                octx,
                encoder,
                scaler,
                src_frame,
                yuv_frame,
                next_pts: 0,
                codec_time_base,
                stream_index,
            }),
        })
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session configuration
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Frames encoded so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Duration in seconds of the material written so far
    pub fn duration(&self) -> f64 {
        let (num, den) = self.config.frame_rate;
        self.frames_written as f64 * den as f64 / num as f64
    }

    /// Encode one frame.
    ///
    /// Dimensions and sample layout are checked against the session
    /// settings; a failed call leaves the session usable for further
    /// writes and for close.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.stage != Stage::Writing {
            return Err(Error::AlreadyClosed {
                path: self.path.display().to_string(),
            });
        }
        let config = self.config;
        let frames_written = self.frames_written;
        let inner = self.inner.as_mut().ok_or_else(|| Error::NullHandle {
            message: "writer session lost its encoder contexts".into(),
        })?;

        if frame.width() != config.width || frame.height() != config.height {
            return Err(Error::BadDimensions {
                got_width: frame.width(),
                got_height: frame.height(),
                want_width: config.width,
                want_height: config.height,
            });
        }
        let expected = if config.is_color {
            FrameFormat::Rgb24
        } else {
            FrameFormat::Gray8
        };
        if frame.format() != expected {
            return Err(Error::BadDtype {
                expected: expected.name(),
                got: frame.format().name(),
            });
        }

        let WriterInner {
            ref mut octx,
            ref mut encoder,
            ref mut scaler,
            ref mut src_frame,
            ref mut yuv_frame,
            ref mut next_pts,
            codec_time_base,
            stream_index,
        } = *inner;

        // Fill the reusable source frame row by row; the AVFrame's
        // lines carry padding the caller's dense buffer does not.
        {
            let channels = expected.channels();
            let row_bytes = config.width as usize * channels;
            let stride = src_frame.stride(0);
            let data = src_frame.data_mut(0);
            for row in 0..config.height as usize {
                data[row * stride..row * stride + row_bytes].copy_from_slice(frame.row(row as u32));
            }
        }

        // The encoder may still hold a reference to the YUV frame from
        // the previous send.
        let ret = unsafe { ffmpeg::ffi::av_frame_make_writable(yuv_frame.as_mut_ptr()) };
        if ret < 0 {
            return Err(Error::EncodeError {
                message: format!("could not make encoder frame writable (code {ret})"),
            });
        }

        scaler
            .run(src_frame, yuv_frame)
            .map_err(|e| Error::EncodeError {
                message: format!("YUV420P conversion failed: {e}"),
            })?;

        yuv_frame.set_pts(Some(*next_pts));
        *next_pts += 1;

        encoder
            .send_frame(yuv_frame)
            .map_err(|e| Error::EncodeError {
                message: format!(
                    "error sending frame {} to encoder: {e}",
                    frames_written + 1
                ),
            })?;

        drain_packets(octx, encoder, codec_time_base, stream_index, frames_written)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Encode a batch of frames in order, as if [`write`] were called
    /// for each.
    ///
    /// [`write`]: VideoWriter::write
    pub fn write_batch(&mut self, frames: &[Frame]) -> Result<()> {
        for frame in frames {
            self.write(frame)?;
        }
        Ok(())
    }

    /// Flush the encoder, write the trailer, and release everything.
    ///
    /// Idempotent: a second close warns and no-ops. Errors during the
    /// flush still advance the session to `Closed` and release the
    /// contexts.
    pub fn close(&mut self) -> Result<()> {
        if self.stage == Stage::Closed {
            warn!("writer for {} is already closed", self.path.display());
            return Ok(());
        }
        let mut inner = match self.inner.take() {
            Some(inner) => inner,
            None => {
                self.stage = Stage::Closed;
                return Err(Error::NullHandle {
                    message: "writer session lost its encoder contexts before close".into(),
                });
            }
        };
        let mut first_err: Option<Error> = None;

        match inner.encoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => {}
            Err(e) => {
                first_err = Some(Error::EncodeError {
                    message: format!("error flushing encoder: {e}"),
                });
            }
        }
        if let Err(e) = drain_packets(
            &mut inner.octx,
            &mut inner.encoder,
            inner.codec_time_base,
            inner.stream_index,
            self.frames_written,
        ) {
            first_err.get_or_insert(e);
        }
        self.stage = Stage::Flushed;

        if let Err(e) = inner.octx.write_trailer() {
            first_err.get_or_insert(Error::TrailerError {
                message: e.to_string(),
            });
        }
        self.stage = Stage::Closed;

        match first_err {
            None => {
                info!(
                    "Closed {}: {} frames, {:.3}s",
                    self.path.display(),
                    self.frames_written,
                    self.duration()
                );
                Ok(())
            }
            Some(err) => Err(err),
        }
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if self.inner.is_some() {
            warn!(
                "writer for {} dropped without close, flushing now",
                self.path.display()
            );
            if let Err(e) = self.close() {
                warn!("flush on drop failed: {e}");
            }
        }
    }
}

/// Pull every ready packet out of the encoder and mux it.
fn drain_packets(
    octx: &mut ffmpeg::format::context::Output,
    encoder: &mut ffmpeg::encoder::Video,
    codec_time_base: Rational,
    stream_index: usize,
    frames_written: u64,
) -> Result<()> {
    let stream_time_base = octx
        .stream(stream_index)
        .map(|s| s.time_base())
        .ok_or_else(|| Error::NullHandle {
            message: format!("output stream {stream_index} vanished while writing"),
        })?;

    let mut packet = ffmpeg::Packet::empty();
    loop {
        match encoder.receive_packet(&mut packet) {
            Ok(()) => {
                packet.set_stream(stream_index);
                packet.rescale_ts(codec_time_base, stream_time_base);
                trace!(
                    pts = packet.pts().unwrap_or(-1),
                    dts = packet.dts().unwrap_or(-1),
                    "muxing packet"
                );
                packet
                    .write_interleaved(octx)
                    .map_err(|e| Error::WriteError {
                        frame: frames_written + 1,
                        message: e.to_string(),
                    })?;
            }
            Err(ref e) if crate::ffmpeg_util::is_pending(e) => return Ok(()),
            Err(e) => {
                return Err(Error::EncodeError {
                    message: format!(
                        "error receiving packet from encoder at frame {}: {e}",
                        frames_written + 1
                    ),
                })
            }
        }
    }
}
