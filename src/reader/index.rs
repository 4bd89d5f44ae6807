//! Frame-index table builder
//!
//! Two-pass scan of the input: pass 1 counts packets and rejects
//! open-GOP HEVC at the NAL level, pass 2 derives each packet's frame
//! index from its PTS and records the DTS to seek to for that frame.
//! The result is the immutable per-session table every random access
//! relies on: frame index -> DTS, plus the exact PTS step per frame.

use ffmpeg_next as ffmpeg;

use std::path::Path;

use ffmpeg::codec;
use ffmpeg::media;
use tracing::{debug, info};

use super::nal;
use crate::error::{Error, Result};
use crate::ffmpeg_util::seek_to_start;

/// Immutable description of an indexed video stream
#[derive(Debug, Clone)]
pub struct FrameIndex {
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    /// Guessed stream frame rate, always positive
    pub frame_rate: (i32, i32),
    /// Stream time base
    pub time_base: (i32, i32),
    /// Time-base units per frame; PTS of frame i is exactly
    /// `i * pts_increment`
    pub pts_increment: i64,
    /// Seek key per frame index
    pub dts: Vec<i64>,
    /// Container `is_grayscale` tag, when present
    pub gray_hint: Option<bool>,
    pub codec_id: codec::Id,
}

/// An opened input with its software decoder and index table
pub(crate) struct IndexedInput {
    pub ictx: ffmpeg::format::context::Input,
    pub decoder: ffmpeg::decoder::Video,
    pub stream_index: usize,
    pub table: FrameIndex,
}

/// Time-base units per frame, or the rejection telling the caller why
/// integer frame indexing is impossible for this stream.
pub(crate) fn pts_increment(time_base: (i32, i32), frame_rate: (i32, i32)) -> Result<i64> {
    let numerator = time_base.1 as i64 * frame_rate.1 as i64;
    let denominator = time_base.0 as i64 * frame_rate.0 as i64;
    if denominator <= 0 || numerator <= 0 || numerator % denominator != 0 {
        return Err(Error::BadFrameRate {
            frame_rate_num: frame_rate.0,
            frame_rate_den: frame_rate.1,
            time_base_num: time_base.0,
            time_base_den: time_base.1,
            numerator,
            denominator,
        });
    }
    Ok(numerator / denominator)
}

/// Open `path`, validate it against the random-access contract, and
/// build its frame-index table. All failures are fatal; no partial
/// session ever escapes.
pub(crate) fn open_indexed(path: &Path) -> Result<IndexedInput> {
    crate::init()?;
    let path_str = path.display().to_string();

    let mut ictx = ffmpeg::format::input(&path).map_err(|e| Error::OpenFailed {
        path: path_str.clone(),
        message: e.to_string(),
    })?;

    let (stream_index, params, time_base, frame_rate) = {
        let stream = ictx
            .streams()
            .best(media::Type::Video)
            .ok_or(Error::NoVideoStream {
                path: path_str.clone(),
            })?;
        let time_base = stream.time_base();
        let avg = stream.avg_frame_rate();
        let rate = if avg.numerator() > 0 && avg.denominator() > 0 {
            avg
        } else {
            stream.rate()
        };
        if rate.numerator() <= 0 || rate.denominator() <= 0 {
            return Err(Error::StreamInfoFailed {
                path: path_str,
                message: "could not determine frame rate".into(),
            });
        }
        (
            stream.index(),
            stream.parameters(),
            (time_base.numerator(), time_base.denominator()),
            (rate.numerator(), rate.denominator()),
        )
    };

    let pts_increment = pts_increment(time_base, frame_rate)?;
    let codec_id = params.id();

    // Deterministic bytes require the software decoder; at least one
    // deployed hardware path returns different pixels across runs of
    // the same file.
    let codec = ffmpeg::decoder::find(codec_id).ok_or(Error::NoDecoder {
        codec: format!("{codec_id:?}"),
    })?;
    if codec
        .capabilities()
        .contains(codec::Capabilities::HARDWARE)
    {
        return Err(Error::HardwareDecoder {
            name: codec.name().to_string(),
        });
    }

    let mut decoder = codec::context::Context::from_parameters(params.clone())
        .map_err(|e| Error::NoDecoder {
            codec: format!("{codec_id:?}: {e}"),
        })?
        .decoder()
        .video()
        .map_err(|e| Error::NoDecoder {
            codec: format!("{codec_id:?}: {e}"),
        })?;

    let extradata = unsafe {
        let par = params.as_ptr();
        if (*par).extradata.is_null() || (*par).extradata_size <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts((*par).extradata, (*par).extradata_size as usize).to_vec()
        }
    };

    // Pass 1: count frames; for HEVC, walk every packet's NAL units
    // and reject the open-GOP types outright.
    let is_hevc = codec_id == codec::Id::HEVC;
    let length_size = nal::nal_length_size(&extradata);
    let mut frame_count: u64 = 0;
    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        if is_hevc {
            if let Some(data) = packet.data() {
                if let Some(nal_type) = nal::find_open_gop_nal(data, length_size) {
                    return Err(Error::OpenGop {
                        nal_type,
                        nal_name: nal::nal_type_name(nal_type),
                    });
                }
            }
        }
        frame_count += 1;
    }
    if frame_count == 0 {
        return Err(Error::NoFrames { path: path_str });
    }

    // Pass 2: map PTS -> frame index and record each frame's DTS.
    seek_to_start(&mut ictx, stream_index)?;
    let mut dts = vec![0i64; frame_count as usize];
    let mut occurrences = vec![0u32; frame_count as usize];
    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        let pts = packet.pts().ok_or_else(|| Error::MisalignedPts {
            message: "video packet has no PTS".into(),
        })?;
        if pts % pts_increment != 0 {
            return Err(Error::MisalignedPts {
                message: format!(
                    "PTS {pts} is not a multiple of pts_increment {pts_increment}; \
                     frame timing is inconsistent"
                ),
            });
        }
        let frame_num = pts / pts_increment;
        if frame_num < 0 || frame_num >= frame_count as i64 {
            return Err(Error::MisalignedPts {
                message: format!(
                    "PTS {pts} maps to frame index {frame_num}, outside 0..{frame_count}"
                ),
            });
        }
        dts[frame_num as usize] = packet.dts().unwrap_or(pts);
        occurrences[frame_num as usize] += 1;
    }

    let missing = occurrences.iter().filter(|&&n| n == 0).count() as u64;
    if missing > 0 {
        return Err(Error::MissingPts {
            missing,
            total: frame_count,
        });
    }
    let duplicates = occurrences.iter().filter(|&&n| n > 1).count() as u64;
    if duplicates > 0 {
        return Err(Error::DuplicatePts {
            duplicates,
            total: frame_count,
        });
    }

    // Leave the demuxer and decoder positioned for the first read.
    seek_to_start(&mut ictx, stream_index)?;
    decoder.flush();

    let gray_hint = ictx.metadata().get("is_grayscale").map(|v| v == "1");

    let width = decoder.width();
    let height = decoder.height();
    debug!(
        frame_count,
        width, height, pts_increment, "built frame-index table"
    );
    info!(
        "Indexed {path_str}: {frame_count} frames, {width}x{height}, \
         {}/{} fps",
        frame_rate.0, frame_rate.1
    );

    Ok(IndexedInput {
        ictx,
        decoder,
        stream_index,
        table: FrameIndex {
            frame_count,
            width,
            height,
            frame_rate,
            time_base,
            pts_increment,
            dts,
            gray_hint,
            codec_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn exact_division_yields_the_increment() {
        // 30 fps in a 1/15360 time base: 512 units per frame
        assert_eq!(pts_increment((1, 15360), (30, 1)).unwrap(), 512);
        // writer layout: time base is the frame interval
        assert_eq!(pts_increment((1, 30), (30, 1)).unwrap(), 1);
        // fractional rate with a matching time base
        assert_eq!(pts_increment((100, 14997), (14997, 100)).unwrap(), 1);
    }

    #[test]
    fn inexact_division_is_rejected() {
        let err = pts_increment((1, 1000), (30, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFrameRate);
        let msg = err.to_string();
        assert!(msg.contains("30/1"));
        assert!(msg.contains("1/1000"));
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert_eq!(
            pts_increment((1, 600), (0, 1)).unwrap_err().kind(),
            ErrorKind::BadFrameRate
        );
    }
}
