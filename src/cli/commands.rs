//! Command implementations for the framedex CLI

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::{GrabArgs, ImportArgs, InfoArgs, VerifyArgs};
use crate::convert::ImportOptions;
use crate::frame::FrameFormat;
use crate::reader::VideoReader;

/// Attributes reported by `framedex info`
#[derive(Debug, Serialize)]
pub struct VideoSummary {
    pub path: String,
    pub num_frames: u64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: (i32, i32),
    pub duration_seconds: f64,
    pub pts_increment: i64,
    pub is_gray: bool,
}

impl VideoSummary {
    fn from_reader(reader: &VideoReader) -> Self {
        Self {
            path: reader.path().display().to_string(),
            num_frames: reader.num_frames(),
            width: reader.width(),
            height: reader.height(),
            frame_rate: reader.frame_rate(),
            duration_seconds: reader.duration(),
            pts_increment: reader.pts_increment(),
            is_gray: reader.is_gray(),
        }
    }
}

/// Print a file's frame-index attributes
pub fn info(args: InfoArgs) -> Result<()> {
    let mut reader = VideoReader::open(&args.input)
        .with_context(|| format!("opening {}", args.input))?;
    let summary = VideoSummary::from_reader(&reader);
    reader.close();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("File:       {}", summary.path);
        println!("Frames:     {}", summary.num_frames);
        println!("Size:       {}x{}", summary.width, summary.height);
        println!(
            "Frame rate: {}/{}",
            summary.frame_rate.0, summary.frame_rate.1
        );
        println!("Duration:   {:.3}s", summary.duration_seconds);
        println!("PTS step:   {}", summary.pts_increment);
        println!(
            "Output:     {}",
            if summary.is_gray { "grayscale" } else { "RGB" }
        );
    }
    Ok(())
}

/// Validate a file against the random-access contract
pub fn verify(args: VerifyArgs) -> Result<()> {
    match VideoReader::open(&args.input) {
        Ok(mut reader) => {
            println!(
                "OK: {} ({} frames, {}x{})",
                args.input,
                reader.num_frames(),
                reader.width(),
                reader.height()
            );
            reader.close();
            Ok(())
        }
        Err(e) => {
            println!("REJECTED [{:?}]: {e}", e.kind());
            std::process::exit(1);
        }
    }
}

/// Read one frame and save it as a PNG
pub fn grab(args: GrabArgs) -> Result<()> {
    let mut reader = VideoReader::open(&args.input)
        .with_context(|| format!("opening {}", args.input))?;
    let frame = reader
        .read(args.index)
        .with_context(|| format!("reading frame {}", args.index))?;
    reader.close();

    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width(), frame.height());
    encoder.set_color(match frame.format() {
        FrameFormat::Gray8 => png::ColorType::Grayscale,
        FrameFormat::Rgb24 => png::ColorType::Rgb,
    });
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(frame.data())?;

    info!("Saved frame {} of {} to {}", args.index, args.input, args.output);
    println!("{}", args.output);
    Ok(())
}

/// Re-encode any video into the compliant closed-GOP format
pub fn import(args: ImportArgs) -> Result<()> {
    let force_gray = match args.format.as_str() {
        "auto" => None,
        "gray" => Some(true),
        "rgb" => Some(false),
        other => anyhow::bail!("unknown format '{other}': expected auto, gray, or rgb"),
    };
    let options = ImportOptions {
        gop_size: args.gop_size,
        crf: args.crf,
        force_gray,
    };
    let report = crate::convert::import(&args.input, &args.output, options)
        .with_context(|| format!("importing {}", args.input))?;
    println!(
        "{}: {} frames, {}x{}, {}/{} fps, {}",
        args.output,
        report.frames,
        report.width,
        report.height,
        report.frame_rate.0,
        report.frame_rate.1,
        if report.gray { "grayscale" } else { "RGB" }
    );
    Ok(())
}
