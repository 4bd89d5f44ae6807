//! Shared helpers for the integration suites
#![allow(dead_code)]

use framedex::{Frame, FrameFormat, VideoWriter, WriterConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Deterministic uniform-noise grayscale frames; frame `i` depends only
/// on `(seed, i)`.
pub fn noise_gray_frames(count: usize, width: u32, height: u32, seed: u64) -> Vec<Frame> {
    (0..count)
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut frame = Frame::gray8(width, height);
            rng.fill(frame.data_mut());
            frame
        })
        .collect()
}

/// Smooth low-pass grayscale content: a slow gradient plus a phase that
/// drifts with the frame index.
pub fn smooth_gray_frames(count: usize, width: u32, height: u32) -> Vec<Frame> {
    (0..count)
        .map(|i| {
            let mut frame = Frame::gray8(width, height);
            let phase = i as f64 * 0.05;
            for y in 0..height {
                for x in 0..width {
                    let v = 128.0
                        + 60.0 * ((x as f64 / width as f64 * std::f64::consts::TAU) + phase).sin()
                        + 40.0 * (y as f64 / height as f64 * std::f64::consts::PI).cos();
                    frame.data_mut()[(y * width + x) as usize] = v.clamp(0.0, 255.0) as u8;
                }
            }
            frame
        })
        .collect()
}

/// Smooth RGB content with per-channel gradients
pub fn smooth_rgb_frames(count: usize, width: u32, height: u32) -> Vec<Frame> {
    (0..count)
        .map(|i| {
            let mut frame = Frame::rgb24(width, height);
            let phase = i as f64 * 0.04;
            for y in 0..height {
                for x in 0..width {
                    let fx = x as f64 / width as f64;
                    let fy = y as f64 / height as f64;
                    let base = (y as usize * width as usize + x as usize) * 3;
                    let r = 128.0 + 80.0 * (fx * std::f64::consts::TAU + phase).sin();
                    let g = 128.0 + 80.0 * (fy * std::f64::consts::TAU + phase).cos();
                    let b = 128.0 + 60.0 * ((fx + fy) * std::f64::consts::PI + phase).sin();
                    frame.data_mut()[base] = r.clamp(0.0, 255.0) as u8;
                    frame.data_mut()[base + 1] = g.clamp(0.0, 255.0) as u8;
                    frame.data_mut()[base + 2] = b.clamp(0.0, 255.0) as u8;
                }
            }
            frame
        })
        .collect()
}

/// Write `frames` to `path` and close the writer.
pub fn write_video(
    path: &Path,
    frames: &[Frame],
    fps: u32,
    gop_size: u32,
    crf: u8,
    color: bool,
) -> framedex::Result<()> {
    let first = frames.first().expect("at least one frame");
    let config = WriterConfig::new(first.width(), first.height(), fps)
        .with_color(color)
        .with_gop_size(gop_size)
        .with_crf(crf);
    let mut writer = VideoWriter::create(path, config)?;
    writer.write_batch(frames)?;
    writer.close()
}

/// Global SSIM between two frames of identical dimensions.
///
/// RGB input is reduced to luma first; the score is the mean SSIM over
/// non-overlapping 8x8 windows with the standard stabilizing constants.
pub fn ssim(a: &Frame, b: &Frame) -> f64 {
    assert_eq!(a.width(), b.width());
    assert_eq!(a.height(), b.height());
    let la = luma(a);
    let lb = luma(b);
    let (w, h) = (a.width() as usize, a.height() as usize);

    const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
    const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);
    const WIN: usize = 8;

    let mut total = 0.0;
    let mut windows = 0usize;
    for wy in (0..h.saturating_sub(WIN - 1)).step_by(WIN) {
        for wx in (0..w.saturating_sub(WIN - 1)).step_by(WIN) {
            let mut sum_a = 0.0;
            let mut sum_b = 0.0;
            let mut sum_aa = 0.0;
            let mut sum_bb = 0.0;
            let mut sum_ab = 0.0;
            for y in wy..wy + WIN {
                for x in wx..wx + WIN {
                    let va = la[y * w + x];
                    let vb = lb[y * w + x];
                    sum_a += va;
                    sum_b += vb;
                    sum_aa += va * va;
                    sum_bb += vb * vb;
                    sum_ab += va * vb;
                }
            }
            let n = (WIN * WIN) as f64;
            let mu_a = sum_a / n;
            let mu_b = sum_b / n;
            let var_a = sum_aa / n - mu_a * mu_a;
            let var_b = sum_bb / n - mu_b * mu_b;
            let cov = sum_ab / n - mu_a * mu_b;
            let score = ((2.0 * mu_a * mu_b + C1) * (2.0 * cov + C2))
                / ((mu_a * mu_a + mu_b * mu_b + C1) * (var_a + var_b + C2));
            total += score;
            windows += 1;
        }
    }
    if windows == 0 {
        1.0
    } else {
        total / windows as f64
    }
}

fn luma(frame: &Frame) -> Vec<f64> {
    match frame.format() {
        FrameFormat::Gray8 => frame.data().iter().map(|&v| v as f64).collect(),
        FrameFormat::Rgb24 => frame
            .data()
            .chunks_exact(3)
            .map(|px| 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64)
            .collect(),
    }
}
