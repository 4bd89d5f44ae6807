//! Conversion of arbitrary video into the compliant frame store format
//!
//! Files rejected by [`VideoReader::open`] (open GOP, misaligned PTS,
//! incompatible time base) can be rebuilt into an accepted closed-GOP
//! HEVC MP4 by decoding them sequentially and re-encoding through the
//! writer pipeline. Sequential decode needs none of the random-access
//! invariants, so any demuxable input works.
//!
//! [`VideoReader::open`]: crate::reader::VideoReader::open

use ffmpeg_next as ffmpeg;

use std::path::Path;

use ffmpeg::codec;
use ffmpeg::format::Pixel;
use ffmpeg::media;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ffmpeg_util::receive_decoded;
use crate::frame::{Frame, FrameFormat};
use crate::reader::decode::Converter;
use crate::writer::{VideoWriter, WriterConfig};

/// Options for [`import`]
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Keyframe interval of the output
    pub gop_size: u32,
    /// Output quality, 0 (best) to 51
    pub crf: u8,
    /// Force grayscale (`Some(true)`) or RGB (`Some(false)`) output.
    /// Unset picks grayscale for GRAY* sources.
    pub force_gray: Option<bool>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            gop_size: 50,
            crf: 18,
            force_gray: None,
        }
    }
}

/// What an [`import`] produced
#[derive(Debug, Clone, Copy)]
pub struct ImportReport {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: (i32, i32),
    pub gray: bool,
}

/// Re-encode `input` into a compliant closed-GOP HEVC MP4 at `output`.
///
/// Frames are taken in decode order and assigned fresh PTS 0, 1, 2, …
/// so the output always satisfies the reader's indexing contract,
/// whatever the input's timestamps looked like.
pub fn import<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: ImportOptions,
) -> Result<ImportReport> {
    crate::init()?;
    let input_str = input.as_ref().display().to_string();

    let mut ictx = ffmpeg::format::input(&input).map_err(|e| Error::OpenFailed {
        path: input_str.clone(),
        message: e.to_string(),
    })?;

    let (stream_index, params, frame_rate) = {
        let stream = ictx
            .streams()
            .best(media::Type::Video)
            .ok_or(Error::NoVideoStream {
                path: input_str.clone(),
            })?;
        let avg = stream.avg_frame_rate();
        let rate = if avg.numerator() > 0 && avg.denominator() > 0 {
            avg
        } else {
            stream.rate()
        };
        if rate.numerator() <= 0 || rate.denominator() <= 0 {
            return Err(Error::StreamInfoFailed {
                path: input_str,
                message: "could not determine frame rate".into(),
            });
        }
        (
            stream.index(),
            stream.parameters(),
            (rate.numerator(), rate.denominator()),
        )
    };

    let mut decoder = codec::context::Context::from_parameters(params)
        .map_err(|e| Error::NoDecoder {
            codec: e.to_string(),
        })?
        .decoder()
        .video()
        .map_err(|e| Error::NoDecoder {
            codec: e.to_string(),
        })?;

    let width = decoder.width();
    let height = decoder.height();
    let gray = options.force_gray.unwrap_or_else(|| {
        matches!(
            decoder.format(),
            Pixel::GRAY8 | Pixel::GRAY16BE | Pixel::GRAY16LE
        )
    });
    let format = if gray {
        FrameFormat::Gray8
    } else {
        FrameFormat::Rgb24
    };

    let config = WriterConfig::new(width, height, 1)
        .with_frame_rate(frame_rate.0, frame_rate.1)
        .with_color(!gray)
        .with_gop_size(options.gop_size)
        .with_crf(options.crf);
    let mut writer = VideoWriter::create(&output, config)?;

    let mut conv = Converter::new(width, height, gray);
    let mut buffer = vec![0u8; conv.frame_size()];
    let mut decoded = ffmpeg::frame::Video::empty();
    let mut frames: u64 = 0;

    info!(
        "Importing {input_str}: {width}x{height}, {}/{} fps, {}",
        frame_rate.0,
        frame_rate.1,
        if gray { "grayscale" } else { "RGB" }
    );

    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            debug!(frames, "decoder rejected packet during import, skipping");
            continue;
        }
        while receive_decoded(&mut decoder, &mut decoded)? {
            conv.convert_into(&decoded, &mut buffer)?;
            writer.write(&Frame::from_raw(width, height, format, buffer.clone())?)?;
            frames += 1;
        }
    }

    // Null packet, then drain the decoder's tail.
    let _ = decoder.send_eof();
    while receive_decoded(&mut decoder, &mut decoded)? {
        conv.convert_into(&decoded, &mut buffer)?;
        writer.write(&Frame::from_raw(width, height, format, buffer.clone())?)?;
        frames += 1;
    }
    decoder.flush();

    writer.close()?;
    if frames == 0 {
        return Err(Error::NoFrames { path: input_str });
    }

    info!("Imported {frames} frames to {}", output.as_ref().display());
    Ok(ImportReport {
        frames,
        width,
        height,
        frame_rate,
        gray,
    })
}
