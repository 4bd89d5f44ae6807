//! Argument, rejection, and lifecycle behavior

mod common;

use common::{smooth_gray_frames, write_video};
use framedex::{ErrorKind, Frame, VideoReader, VideoWriter, WriterConfig};
use tempfile::TempDir;

fn small_test_video(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("input.mp4");
    write_video(&path, &smooth_gray_frames(30, 96, 96), 30, 10, 18, false).unwrap();
    path
}

#[test]
fn missing_file_is_rejected_at_open() {
    let err = VideoReader::open("/nonexistent/deeply/missing.mp4").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailed);
}

#[test]
fn garbage_file_is_rejected_at_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.mp4");
    std::fs::write(&path, b"this is not a video").unwrap();
    let err = VideoReader::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailed);
}

#[test]
fn out_of_range_index_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut reader = VideoReader::open(small_test_video(&dir)).unwrap();

    let err = reader.read(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIndex);
    let err = reader.read(31).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIndex);
    assert!(err.to_string().contains("between 1 and 30"));

    // The failed calls leave the session usable
    assert_eq!(reader.read(30).unwrap().width(), 96);
    reader.close();
}

#[test]
fn bad_ranges_are_rejected() {
    let dir = TempDir::new().unwrap();
    let mut reader = VideoReader::open(small_test_video(&dir)).unwrap();

    assert_eq!(
        reader.read_range(0, 5).unwrap_err().kind(),
        ErrorKind::InvalidRange
    );
    assert_eq!(
        reader.read_range(10, 5).unwrap_err().kind(),
        ErrorKind::InvalidRange
    );
    assert_eq!(
        reader.read_range(5, 31).unwrap_err().kind(),
        ErrorKind::InvalidRange
    );

    assert_eq!(reader.read_range(29, 30).unwrap().len(), 2);
    reader.close();
}

#[test]
fn reader_close_is_idempotent_and_guards_reads() {
    let dir = TempDir::new().unwrap();
    let mut reader = VideoReader::open(small_test_video(&dir)).unwrap();
    reader.close();
    reader.close(); // warns, no-ops

    let err = reader.read(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyClosed);
    let err = reader.read_range(1, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyClosed);
}

#[test]
fn attributes_remain_readable_after_close() {
    let dir = TempDir::new().unwrap();
    let mut reader = VideoReader::open(small_test_video(&dir)).unwrap();
    reader.close();

    assert_eq!(reader.num_frames(), 30);
    assert_eq!(reader.width(), 96);
    assert_eq!(reader.height(), 96);
    assert!(reader.is_gray());
    assert_eq!(reader.cache_span(), None);
}

#[test]
fn writer_rejects_mismatched_input() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strict.mp4");
    let config = WriterConfig::new(96, 96, 30);
    let mut writer = VideoWriter::create(&path, config).unwrap();

    let err = writer.write(&Frame::gray8(64, 96)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDimensions);

    let err = writer.write(&Frame::rgb24(96, 96)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDtype);

    // Failed writes leave the session usable
    writer.write(&Frame::gray8(96, 96)).unwrap();
    writer.close().unwrap();
}

#[test]
fn writer_close_is_idempotent_and_guards_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("closed.mp4");
    let mut writer = VideoWriter::create(&path, WriterConfig::new(96, 96, 30)).unwrap();
    writer.write(&Frame::gray8(96, 96)).unwrap();
    writer.close().unwrap();
    writer.close().unwrap(); // warns, no-ops

    let err = writer.write(&Frame::gray8(96, 96)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyClosed);
}

#[test]
fn dropped_writer_still_produces_a_readable_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dropped.mp4");
    {
        let mut writer = VideoWriter::create(&path, WriterConfig::new(96, 96, 30)).unwrap();
        for frame in smooth_gray_frames(12, 96, 96) {
            writer.write(&frame).unwrap();
        }
        // No close: Drop must flush and write the trailer.
    }

    let mut reader = VideoReader::open(&path).unwrap();
    assert_eq!(reader.num_frames(), 12);
    assert_eq!(reader.read(12).unwrap().byte_len(), 96 * 96);
    reader.close();
}
