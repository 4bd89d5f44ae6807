//! Decode-and-convert core
//!
//! Seek to a DTS target, pump packets through the decoder, and deliver
//! each requested frame index exactly once as a dense row-major
//! GRAY8/RGB24 block. The decoder reorders B-frames internally; the
//! capture bitmap makes delivery independent of arrival order.

use ffmpeg_next as ffmpeg;

use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ffmpeg_util::{receive_decoded, seek_backward};

/// Converts decoded frames to the session's output format and copies
/// them out as dense rows.
///
/// The scaler is keyed on the decoded frame's (format, width, height)
/// and only rebuilt when that key changes, so steady-state reads pay
/// no scaler construction cost.
pub(crate) struct Converter {
    gray: bool,
    width: u32,
    height: u32,
    frame_size: usize,
    scaler: Option<ScalerSlot>,
    out_frame: ffmpeg::frame::Video,
}

struct ScalerSlot {
    ctx: scaling::Context,
    src_format: Pixel,
    src_width: u32,
    src_height: u32,
}

impl Converter {
    pub fn new(width: u32, height: u32, gray: bool) -> Self {
        let channels = if gray { 1 } else { 3 };
        Self {
            gray,
            width,
            height,
            frame_size: width as usize * height as usize * channels,
            scaler: None,
            out_frame: ffmpeg::frame::Video::empty(),
        }
    }

    /// Bytes per converted frame
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn output_format(&self) -> Pixel {
        if self.gray {
            Pixel::GRAY8
        } else {
            Pixel::RGB24
        }
    }

    /// Color-convert `decoded` and copy it into `dest` as dense
    /// row-major samples, stripping the decoder's line padding.
    pub fn convert_into(&mut self, decoded: &ffmpeg::frame::Video, dest: &mut [u8]) -> Result<()> {
        let key = (decoded.format(), decoded.width(), decoded.height());
        let stale = match &self.scaler {
            Some(slot) => (slot.src_format, slot.src_width, slot.src_height) != key,
            None => true,
        };
        if stale {
            let ctx = scaling::Context::get(
                key.0,
                key.1,
                key.2,
                self.output_format(),
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| Error::DecodeError {
                message: format!("could not create color converter: {e}"),
            })?;
            self.scaler = Some(ScalerSlot {
                ctx,
                src_format: key.0,
                src_width: key.1,
                src_height: key.2,
            });
        }

        let slot = match self.scaler.as_mut() {
            Some(slot) => slot,
            None => {
                return Err(Error::NullHandle {
                    message: "color converter missing after initialization".into(),
                })
            }
        };
        slot.ctx
            .run(decoded, &mut self.out_frame)
            .map_err(|e| Error::DecodeError {
                message: format!("color conversion failed: {e}"),
            })?;

        let channels = if self.gray { 1 } else { 3 };
        let row_bytes = self.width as usize * channels;
        let stride = self.out_frame.stride(0);
        let data = self.out_frame.data(0);
        for row in 0..self.height as usize {
            let src = row * stride;
            dest[row * row_bytes..(row + 1) * row_bytes]
                .copy_from_slice(&data[src..src + row_bytes]);
        }
        Ok(())
    }
}

/// Decode every frame index in `[first, last]` (0-based, inclusive)
/// into `block`, one seek and one sustained decode pass.
///
/// The decoder is flushed after the seek and again before returning,
/// on success and on error, so the session stays usable.
pub(crate) fn decode_range(
    ictx: &mut ffmpeg::format::context::Input,
    decoder: &mut ffmpeg::decoder::Video,
    stream_index: usize,
    dts_table: &[i64],
    pts_increment: i64,
    conv: &mut Converter,
    first: u64,
    last: u64,
    block: &mut [u8],
) -> Result<()> {
    let res = decode_range_inner(
        ictx,
        decoder,
        stream_index,
        dts_table,
        pts_increment,
        conv,
        first,
        last,
        block,
    );
    decoder.flush();
    res
}

#[allow(clippy::too_many_arguments)]
fn decode_range_inner(
    ictx: &mut ffmpeg::format::context::Input,
    decoder: &mut ffmpeg::decoder::Video,
    stream_index: usize,
    dts_table: &[i64],
    pts_increment: i64,
    conv: &mut Converter,
    first: u64,
    last: u64,
    block: &mut [u8],
) -> Result<()> {
    let num = (last - first + 1) as usize;
    let frame_size = conv.frame_size();

    seek_backward(ictx, stream_index, dts_table[first as usize])?;
    decoder.flush();

    let mut captured = vec![false; num];
    let mut remaining = num;
    let mut packets_read: u64 = 0;
    let mut dts_seen = DtsRange::new();
    let mut decoded = ffmpeg::frame::Video::empty();

    'demux: for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        packets_read += 1;
        dts_seen.observe(packet.dts());

        if decoder.send_packet(&packet).is_err() {
            // Damaged packet: skip it; the capture bitmap reports any
            // hole at the end.
            trace!(packets_read, "decoder rejected packet, skipping");
            continue;
        }
        while receive_decoded(decoder, &mut decoded)? {
            capture(
                &decoded,
                pts_increment,
                first,
                last,
                conv,
                block,
                frame_size,
                &mut captured,
                &mut remaining,
            )?;
            if remaining == 0 {
                break 'demux;
            }
        }
    }

    if remaining > 0 {
        // Null packet: drain the reordering queue at end of stream.
        let _ = decoder.send_eof();
        while remaining > 0 && receive_decoded(decoder, &mut decoded)? {
            capture(
                &decoded,
                pts_increment,
                first,
                last,
                conv,
                block,
                frame_size,
                &mut captured,
                &mut remaining,
            )?;
        }
    }

    if remaining > 0 {
        let missing = captured
            .iter()
            .position(|&c| !c)
            .map(|local| first + local as u64)
            .unwrap_or(first);
        debug!(
            missing,
            packets_read, "range decode exhausted the stream before capturing every target"
        );
        return Err(Error::NotFound {
            index: missing + 1,
            target_pts: missing as i64 * pts_increment,
            packets_read,
            dts_min: dts_seen.min(),
            dts_max: dts_seen.max(),
        });
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn capture(
    decoded: &ffmpeg::frame::Video,
    pts_increment: i64,
    first: u64,
    last: u64,
    conv: &mut Converter,
    block: &mut [u8],
    frame_size: usize,
    captured: &mut [bool],
    remaining: &mut usize,
) -> Result<()> {
    let pts = match decoded.pts() {
        Some(pts) => pts,
        None => {
            return Err(Error::DecodeError {
                message: "decoded frame has no PTS".into(),
            })
        }
    };
    let index = pts / pts_increment;
    if index < first as i64 || index > last as i64 {
        return Ok(());
    }
    let local = (index - first as i64) as usize;
    if captured[local] {
        return Ok(());
    }
    conv.convert_into(decoded, &mut block[local * frame_size..(local + 1) * frame_size])?;
    captured[local] = true;
    *remaining -= 1;
    Ok(())
}

/// Running min/max over observed packet DTS values, for `NotFound`
/// diagnostics.
pub(crate) struct DtsRange {
    min: i64,
    max: i64,
    any: bool,
}

impl DtsRange {
    pub fn new() -> Self {
        Self {
            min: i64::MAX,
            max: i64::MIN,
            any: false,
        }
    }

    pub fn observe(&mut self, dts: Option<i64>) {
        if let Some(dts) = dts {
            self.min = self.min.min(dts);
            self.max = self.max.max(dts);
            self.any = true;
        }
    }

    pub fn min(&self) -> i64 {
        if self.any {
            self.min
        } else {
            0
        }
    }

    pub fn max(&self) -> i64 {
        if self.any {
            self.max
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dts_range_tracks_extremes_and_ignores_missing() {
        let mut r = DtsRange::new();
        assert_eq!((r.min(), r.max()), (0, 0));
        r.observe(Some(10));
        r.observe(None);
        r.observe(Some(-3));
        r.observe(Some(7));
        assert_eq!((r.min(), r.max()), (-3, 10));
    }
}
