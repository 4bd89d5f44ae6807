//! GOP frame cache
//!
//! A single-slot store holding the decoded frames of the GOP that
//! contains the most recently missed frame. Lookups are an O(1) window
//! check; a miss replaces the whole slot. One GOP is exactly the span a
//! walk or batch touches between keyframes, so a more general cache
//! buys nothing here.

use ffmpeg_next as ffmpeg;

use tracing::{debug, trace};

use super::decode::{Converter, DtsRange};
use crate::error::{Error, Result};
use crate::ffmpeg_util::{receive_decoded, seek_backward};

pub(crate) struct GopCache {
    data: Vec<u8>,
    start_frame: Option<u64>,
    num_frames: usize,
    frame_size: usize,
}

impl GopCache {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            start_frame: None,
            num_frames: 0,
            frame_size: 0,
        }
    }

    /// Consecutive window of cached frame indices, when non-empty
    pub fn span(&self) -> Option<(u64, u64)> {
        let start = self.start_frame?;
        Some((start, start + self.num_frames as u64))
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.start_frame = None;
        self.num_frames = 0;
    }

    /// O(1) lookup: the cached frames are consecutive from
    /// `start_frame`, so a window check locates the slot.
    pub fn lookup(&self, frame_index: u64) -> Option<&[u8]> {
        let start = self.start_frame?;
        if frame_index < start || frame_index >= start + self.num_frames as u64 {
            return None;
        }
        let offset = (frame_index - start) as usize * self.frame_size;
        Some(&self.data[offset..offset + self.frame_size])
    }

    /// Decode the GOP containing `target` (0-based) and replace the
    /// cache contents with it.
    ///
    /// On error the cache is left empty and the decoder flushed, so
    /// the session stays usable for the next call.
    #[allow(clippy::too_many_arguments)]
    pub fn populate(
        &mut self,
        ictx: &mut ffmpeg::format::context::Input,
        decoder: &mut ffmpeg::decoder::Video,
        stream_index: usize,
        dts_table: &[i64],
        pts_increment: i64,
        target: u64,
        conv: &mut Converter,
    ) -> Result<()> {
        self.clear();
        self.frame_size = conv.frame_size();

        let res = self.fill(
            ictx,
            decoder,
            stream_index,
            dts_table,
            pts_increment,
            target,
            conv,
        );
        decoder.flush();
        if res.is_err() {
            self.clear();
        }
        res
    }

    #[allow(clippy::too_many_arguments)]
    fn fill(
        &mut self,
        ictx: &mut ffmpeg::format::context::Input,
        decoder: &mut ffmpeg::decoder::Video,
        stream_index: usize,
        dts_table: &[i64],
        pts_increment: i64,
        target: u64,
        conv: &mut Converter,
    ) -> Result<()> {
        seek_backward(ictx, stream_index, dts_table[target as usize])?;
        decoder.flush();

        let mut gop = GopBlock::new(self.frame_size);
        let mut found_target = false;
        let mut first_keyframe_seen = false;
        let mut hit_next_gop = false;
        let mut packets_read: u64 = 0;
        let mut dts_seen = DtsRange::new();
        let mut decoded = ffmpeg::frame::Video::empty();

        'demux: for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            packets_read += 1;
            dts_seen.observe(packet.dts());

            if packet.is_key() {
                if first_keyframe_seen {
                    if found_target {
                        // Target captured and the next GOP begins: the
                        // block is complete.
                        hit_next_gop = true;
                        break 'demux;
                    }
                    // The backward seek undershot: the GOP we were
                    // filling doesn't contain the target. Drop stale
                    // reordered frames and restart at this keyframe.
                    trace!(packets_read, "keyframe before target, restarting GOP capture");
                    decoder.flush();
                    gop.reset();
                }
                first_keyframe_seen = true;
            }

            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            while receive_decoded(decoder, &mut decoded)? {
                if gop.push(&decoded, pts_increment, conv)? == target {
                    found_target = true;
                }
            }
        }

        if !hit_next_gop {
            // Stream ended inside the GOP: null packet, then drain the
            // decoder's reordering queue.
            let _ = decoder.send_eof();
            while receive_decoded(decoder, &mut decoded)? {
                if gop.push(&decoded, pts_increment, conv)? == target {
                    found_target = true;
                }
            }
        }

        if !found_target || gop.count == 0 {
            debug!(
                target,
                packets_read, "GOP populate exhausted input without the target frame"
            );
            return Err(Error::NotFound {
                index: target + 1,
                target_pts: target as i64 * pts_increment,
                packets_read,
                dts_min: dts_seen.min(),
                dts_max: dts_seen.max(),
            });
        }

        let start = match gop.start_frame {
            Some(start) if start >= 0 => start as u64,
            _ => {
                return Err(Error::DecodeError {
                    message: format!("GOP for frame {target} has no valid start index"),
                })
            }
        };

        self.data = gop.block;
        self.num_frames = gop.count;
        self.start_frame = Some(start);
        debug!(
            start,
            count = self.num_frames,
            "GOP cache replaced"
        );
        Ok(())
    }
}

/// Growing row-major block of decoded frames in presentation order
struct GopBlock {
    block: Vec<u8>,
    count: usize,
    frame_size: usize,
    start_frame: Option<i64>,
}

impl GopBlock {
    fn new(frame_size: usize) -> Self {
        Self {
            block: Vec::with_capacity(64 * frame_size),
            count: 0,
            frame_size,
            start_frame: None,
        }
    }

    fn reset(&mut self) {
        self.block.clear();
        self.count = 0;
        self.start_frame = None;
    }

    /// Convert and append one decoded frame; returns its frame index.
    fn push(
        &mut self,
        decoded: &ffmpeg::frame::Video,
        pts_increment: i64,
        conv: &mut Converter,
    ) -> Result<u64> {
        let pts = decoded.pts().ok_or_else(|| Error::DecodeError {
            message: "decoded frame has no PTS".into(),
        })?;
        let index = pts / pts_increment;
        if self.start_frame.is_none() {
            self.start_frame = Some(index);
        }
        let offset = self.count * self.frame_size;
        self.block.resize(offset + self.frame_size, 0);
        conv.convert_into(decoded, &mut self.block[offset..offset + self.frame_size])?;
        self.count += 1;
        Ok(index.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_window(start: u64, count: usize, frame_size: usize) -> GopCache {
        let mut data = Vec::new();
        for i in 0..count {
            data.extend(std::iter::repeat(i as u8).take(frame_size));
        }
        GopCache {
            data,
            start_frame: Some(start),
            num_frames: count,
            frame_size,
        }
    }

    #[test]
    fn empty_cache_misses_everything() {
        let cache = GopCache::new();
        assert!(cache.lookup(0).is_none());
        assert!(cache.span().is_none());
    }

    #[test]
    fn lookup_hits_only_inside_the_window() {
        let cache = cache_with_window(50, 25, 16);
        assert!(cache.lookup(49).is_none());
        assert_eq!(cache.lookup(50).unwrap()[0], 0);
        assert_eq!(cache.lookup(74).unwrap()[0], 24);
        assert!(cache.lookup(75).is_none());
        assert_eq!(cache.span(), Some((50, 75)));
    }

    #[test]
    fn clear_empties_the_window() {
        let mut cache = cache_with_window(0, 4, 8);
        assert!(cache.lookup(2).is_some());
        cache.clear();
        assert!(cache.lookup(2).is_none());
        assert!(cache.span().is_none());
    }

    #[test]
    fn gop_block_grows_and_tracks_start() {
        let mut gop = GopBlock::new(4);
        assert_eq!(gop.count, 0);
        gop.reset();
        assert!(gop.start_frame.is_none());
    }
}
