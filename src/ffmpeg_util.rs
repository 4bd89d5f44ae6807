//! Small shared helpers over the ffmpeg-next surface
//!
//! The safe bindings have no per-stream seek, so the two seek helpers
//! drop to the FFI layer with the stream index and the same flags the
//! demuxer-level C API takes.

use ffmpeg_next as ffmpeg;

use crate::error::{Error, Result};

/// True when a `receive_frame`/`receive_packet` error only means
/// "feed more input" (EAGAIN) or "fully drained" (EOF). Everything
/// else is a hard codec error.
pub(crate) fn is_pending(err: &ffmpeg::Error) -> bool {
    matches!(
        err,
        ffmpeg::Error::Eof
            | ffmpeg::Error::Other {
                errno: ffmpeg::ffi::EAGAIN
            }
    )
}

/// Seek the demuxer back to the first packet of `stream_index`.
pub(crate) fn seek_to_start(
    ictx: &mut ffmpeg::format::context::Input,
    stream_index: usize,
) -> Result<()> {
    let ret = unsafe {
        ffmpeg::ffi::avformat_seek_file(ictx.as_mut_ptr(), stream_index as i32, i64::MIN, 0, 0, 0)
    };
    if ret < 0 {
        return Err(Error::DecodeError {
            message: format!("seek to start of stream {stream_index} failed (code {ret})"),
        });
    }
    Ok(())
}

/// Backward seek to `dts` on `stream_index`, falling back to a
/// seek-to-start when the demuxer refuses the target.
pub(crate) fn seek_backward(
    ictx: &mut ffmpeg::format::context::Input,
    stream_index: usize,
    dts: i64,
) -> Result<()> {
    let ret = unsafe {
        ffmpeg::ffi::av_seek_frame(
            ictx.as_mut_ptr(),
            stream_index as i32,
            dts,
            ffmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
        )
    };
    if ret < 0 {
        tracing::debug!(dts, ret, "backward seek refused, falling back to stream start");
        return seek_to_start(ictx, stream_index);
    }
    Ok(())
}

/// Pull one frame out of the decoder.
///
/// `Ok(true)` delivered a frame into `frame`; `Ok(false)` means the
/// decoder wants more input or is drained; `Err` is a fatal decode
/// error.
pub(crate) fn receive_decoded(
    decoder: &mut ffmpeg::decoder::Video,
    frame: &mut ffmpeg::frame::Video,
) -> Result<bool> {
    match decoder.receive_frame(frame) {
        Ok(()) => Ok(true),
        Err(ref e) if is_pending(e) => Ok(false),
        Err(e) => Err(Error::DecodeError {
            message: format!("error receiving frame from decoder: {e}"),
        }),
    }
}
