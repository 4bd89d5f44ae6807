//! HEVC NAL unit inspection for open-GOP rejection
//!
//! MP4-contained HEVC packets are in HVCC form: each NAL unit is
//! preceded by a big-endian length field whose size is recorded in the
//! codec extradata. Random access over an open-GOP stream is unsound
//! (RASL frames reference pictures before the seek point), so any
//! packet carrying one of the open-GOP NAL types rejects the file.

/// Broken Link Access, with leading pictures
pub const NAL_BLA_W_LP: u8 = 16;
/// Broken Link Access, with RADL leading pictures
pub const NAL_BLA_W_RADL: u8 = 17;
/// Broken Link Access, no leading pictures
pub const NAL_BLA_N_LP: u8 = 18;
/// Clean Random Access
pub const NAL_CRA_NUT: u8 = 21;
/// Random Access Skipped Leading, non-reference
pub const NAL_RASL_N: u8 = 8;
/// Random Access Skipped Leading, reference
pub const NAL_RASL_R: u8 = 9;

/// NAL length-prefix size in bytes for HVCC packets.
///
/// Byte 21 of the HEVCDecoderConfigurationRecord holds
/// `lengthSizeMinusOne` in its low two bits. Short or absent extradata
/// falls back to the common 4-byte prefix.
pub fn nal_length_size(extradata: &[u8]) -> usize {
    if extradata.len() >= 22 {
        (extradata[21] & 0x03) as usize + 1
    } else {
        4
    }
}

/// Walk the length-prefixed NAL units of one packet and return the
/// first open-GOP NAL type found, if any.
pub fn find_open_gop_nal(data: &[u8], length_size: usize) -> Option<u8> {
    let mut pos = 0usize;

    while pos + length_size < data.len() {
        let mut nal_size = 0usize;
        for &byte in &data[pos..pos + length_size] {
            nal_size = (nal_size << 8) | byte as usize;
        }
        pos += length_size;

        if nal_size == 0 || pos + nal_size > data.len() {
            break;
        }

        // NAL unit type lives in bits 1-6 of the first header byte
        let nal_unit_type = (data[pos] >> 1) & 0x3F;
        if is_open_gop_type(nal_unit_type) {
            return Some(nal_unit_type);
        }

        pos += nal_size;
    }

    None
}

fn is_open_gop_type(nal_unit_type: u8) -> bool {
    matches!(
        nal_unit_type,
        NAL_CRA_NUT | NAL_BLA_W_LP | NAL_BLA_W_RADL | NAL_BLA_N_LP | NAL_RASL_N | NAL_RASL_R
    )
}

/// Human-readable name for an open-GOP NAL type
pub fn nal_type_name(nal_unit_type: u8) -> &'static str {
    match nal_unit_type {
        NAL_CRA_NUT => "CRA (Clean Random Access)",
        NAL_BLA_W_LP => "BLA_W_LP (Broken Link Access)",
        NAL_BLA_W_RADL => "BLA_W_RADL (Broken Link Access)",
        NAL_BLA_N_LP => "BLA_N_LP (Broken Link Access)",
        NAL_RASL_N => "RASL_N (Random Access Skipped Leading)",
        NAL_RASL_R => "RASL_R (Random Access Skipped Leading)",
        _ => "unknown",
    }
}
