//! Error handling module for framedex

use thiserror::Error;

/// Main error type for framedex operations
///
/// Every failure carries the numeric context needed to diagnose it
/// offline: frame indices, PTS values, NAL unit types, observed DTS
/// ranges. Use [`Error::kind`] for stable programmatic matching.
#[derive(Error, Debug)]
pub enum Error {
    /// FFmpeg library initialization failed
    #[error("Failed to initialize FFmpeg: {message}")]
    Init { message: String },

    /// Container could not be opened
    #[error("Could not open input file {path}: {message}")]
    OpenFailed { path: String, message: String },

    /// Stream discovery produced unusable information
    #[error("Could not read stream info for {path}: {message}")]
    StreamInfoFailed { path: String, message: String },

    /// No video stream present in the container
    #[error("No video stream found in {path}")]
    NoVideoStream { path: String },

    /// No decoder registered for the stream's codec
    #[error("Could not find a decoder for codec {codec}")]
    NoDecoder { codec: String },

    /// The only available decoder is a hardware decoder
    #[error(
        "Got hardware decoder '{name}', but software decoding is required \
         for deterministic output"
    )]
    HardwareDecoder { name: String },

    /// Frame rate and time base do not yield an integer PTS increment
    #[error(
        "Frame rate ({frame_rate_num}/{frame_rate_den}) and time base \
         ({time_base_num}/{time_base_den}) are incompatible: PTS increment \
         would be non-integer {numerator}/{denominator}. Re-encode with a \
         compatible frame rate."
    )]
    BadFrameRate {
        frame_rate_num: i32,
        frame_rate_den: i32,
        time_base_num: i32,
        time_base_den: i32,
        numerator: i64,
        denominator: i64,
    },

    /// HEVC input contains an open-GOP NAL unit
    #[error(
        "Video uses open GOP encoding (found NAL unit type {nal_type}: {nal_name}). \
         Open GOP videos have frames that cannot be decoded after seeking. \
         Re-encode with closed GOP (e.g. -x265-params no-open-gop=1)."
    )]
    OpenGop { nal_type: u8, nal_name: &'static str },

    /// A packet PTS is not a multiple of the PTS increment, or maps
    /// outside the valid frame range
    #[error("Misaligned PTS: {message}")]
    MisalignedPts { message: String },

    /// One or more frame indices have no PTS mapping
    #[error("{missing} of {total} frames have no PTS mapping")]
    MissingPts { missing: u64, total: u64 },

    /// One or more frame indices have multiple PTS mappings
    #[error("{duplicates} of {total} frames have duplicate PTS mappings")]
    DuplicatePts { duplicates: u64, total: u64 },

    /// The video stream contains no packets
    #[error("No frames found in {path}")]
    NoFrames { path: String },

    /// Frame index outside `1..=num_frames`
    #[error("Frame index {index} out of range: must be between 1 and {num_frames}")]
    InvalidIndex { index: u64, num_frames: u64 },

    /// Range endpoints violate `1 <= start <= end <= num_frames`
    #[error(
        "Invalid frame range {start}..={end}: must satisfy \
         1 <= start <= end <= {num_frames}"
    )]
    InvalidRange { start: u64, end: u64, num_frames: u64 },

    /// Decoder returned a hard error
    #[error("Decode error: {message}")]
    DecodeError { message: String },

    /// The requested frame never emerged from the decoder
    #[error(
        "Frame {index} (PTS {target_pts}) not found after reading {packets_read} \
         packets; observed DTS range [{dts_min}, {dts_max}]"
    )]
    NotFound {
        index: u64,
        target_pts: i64,
        packets_read: u64,
        dts_min: i64,
        dts_max: i64,
    },

    /// Encoder setup or per-frame encode failed
    #[error("Encode error: {message}")]
    EncodeError { message: String },

    /// Muxing a packet to the output failed
    #[error("Error writing packet to file at frame {frame}: {message}")]
    WriteError { frame: u64, message: String },

    /// Writing the container trailer failed
    #[error("Error writing file trailer: {message}")]
    TrailerError { message: String },

    /// Input frame dimensions do not match the session settings
    #[error(
        "Frame dimensions {got_width}x{got_height} don't match writer \
         settings {want_width}x{want_height}"
    )]
    BadDimensions {
        got_width: u32,
        got_height: u32,
        want_width: u32,
        want_height: u32,
    },

    /// Input frame sample layout does not match the session settings
    #[error("Frame layout mismatch: writer expects {expected}, got {got}")]
    BadDtype { expected: &'static str, got: &'static str },

    /// Internal session state lost a context it should still own
    #[error("Invalid session handle: {message}")]
    NullHandle { message: String },

    /// Operation attempted on a closed session
    #[error("Session for {path} is already closed")]
    AlreadyClosed { path: String },
}

/// Stable identifiers for the error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Init,
    OpenFailed,
    StreamInfoFailed,
    NoVideoStream,
    NoDecoder,
    HardwareDecoder,
    BadFrameRate,
    OpenGop,
    MisalignedPts,
    MissingPts,
    DuplicatePts,
    NoFrames,
    InvalidIndex,
    InvalidRange,
    DecodeError,
    NotFound,
    EncodeError,
    WriteError,
    TrailerError,
    BadDimensions,
    BadDtype,
    NullHandle,
    AlreadyClosed,
}

impl Error {
    /// Stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Init { .. } => ErrorKind::Init,
            Error::OpenFailed { .. } => ErrorKind::OpenFailed,
            Error::StreamInfoFailed { .. } => ErrorKind::StreamInfoFailed,
            Error::NoVideoStream { .. } => ErrorKind::NoVideoStream,
            Error::NoDecoder { .. } => ErrorKind::NoDecoder,
            Error::HardwareDecoder { .. } => ErrorKind::HardwareDecoder,
            Error::BadFrameRate { .. } => ErrorKind::BadFrameRate,
            Error::OpenGop { .. } => ErrorKind::OpenGop,
            Error::MisalignedPts { .. } => ErrorKind::MisalignedPts,
            Error::MissingPts { .. } => ErrorKind::MissingPts,
            Error::DuplicatePts { .. } => ErrorKind::DuplicatePts,
            Error::NoFrames { .. } => ErrorKind::NoFrames,
            Error::InvalidIndex { .. } => ErrorKind::InvalidIndex,
            Error::InvalidRange { .. } => ErrorKind::InvalidRange,
            Error::DecodeError { .. } => ErrorKind::DecodeError,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::EncodeError { .. } => ErrorKind::EncodeError,
            Error::WriteError { .. } => ErrorKind::WriteError,
            Error::TrailerError { .. } => ErrorKind::TrailerError,
            Error::BadDimensions { .. } => ErrorKind::BadDimensions,
            Error::BadDtype { .. } => ErrorKind::BadDtype,
            Error::NullHandle { .. } => ErrorKind::NullHandle,
            Error::AlreadyClosed { .. } => ErrorKind::AlreadyClosed,
        }
    }
}

/// Result type alias for framedex operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_gop_message_names_the_nal_type() {
        let err = Error::OpenGop {
            nal_type: 21,
            nal_name: "CRA (Clean Random Access)",
        };
        let msg = err.to_string();
        assert!(msg.contains("21"));
        assert!(msg.contains("CRA (Clean Random Access)"));
        assert_eq!(err.kind(), ErrorKind::OpenGop);
    }

    #[test]
    fn bad_frame_rate_reports_the_offending_fraction() {
        let err = Error::BadFrameRate {
            frame_rate_num: 25,
            frame_rate_den: 1,
            time_base_num: 1,
            time_base_den: 600,
            numerator: 600,
            denominator: 25,
        };
        let msg = err.to_string();
        assert!(msg.contains("25/1"));
        assert!(msg.contains("1/600"));
        assert!(msg.contains("600/25"));
    }

    #[test]
    fn not_found_carries_dts_diagnostics() {
        let err = Error::NotFound {
            index: 7,
            target_pts: 6,
            packets_read: 120,
            dts_min: -2,
            dts_max: 117,
        };
        let msg = err.to_string();
        assert!(msg.contains("120 packets"));
        assert!(msg.contains("[-2, 117]"));
    }
}
