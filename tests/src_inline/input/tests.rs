use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgb, RgbImage};

use super::{RasterSlideSource, SlideError, SlideSource};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_tissuemap_input_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]))
}

#[test]
fn test_raster_slide_from_file() {
    let dir = make_temp_dir();
    let path = dir.join("slide.png");
    gradient(64, 32).save(&path).unwrap();

    let source = RasterSlideSource::new(&path);
    let reader = source.open().unwrap();
    let dims = reader.dimensions();
    assert_eq!(dims.width, 64);
    assert_eq!(dims.height, 32);
    assert_eq!(source.path(), path.as_path());
}

#[test]
fn test_read_region_is_windowed() {
    let source = RasterSlideSource::from_image("mem.png", gradient(64, 32));
    let reader = source.open().unwrap();
    let region = reader.read_region(10, 4, 0, 8).unwrap();
    assert_eq!(region.dimensions(), (8, 8));
    assert_eq!(region.get_pixel(0, 0), &Rgb([10, 4, 7]));
    assert_eq!(region.get_pixel(7, 7), &Rgb([17, 11, 7]));
}

#[test]
fn test_read_region_rejects_out_of_bounds() {
    let source = RasterSlideSource::from_image("mem.png", gradient(64, 32));
    let reader = source.open().unwrap();
    let err = reader.read_region(60, 0, 0, 8).unwrap_err();
    assert!(matches!(err, SlideError::OutOfBounds { .. }));
    let err = reader.read_region(0, 0, 1, 8).unwrap_err();
    assert!(matches!(err, SlideError::UnsupportedLevel(1)));
}

#[test]
fn test_handles_are_independent() {
    let source = RasterSlideSource::from_image("mem.png", gradient(16, 16));
    let a = source.open().unwrap();
    let b = source.open().unwrap();
    drop(a);
    assert_eq!(b.dimensions().width, 16);
}

#[test]
fn test_thumbnail_size() {
    let source = RasterSlideSource::from_image("mem.png", gradient(64, 32));
    let reader = source.open().unwrap();
    let thumb = reader.thumbnail(16, 8).unwrap();
    assert_eq!(thumb.dimensions(), (16, 8));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = make_temp_dir();
    let source = RasterSlideSource::new(dir.join("absent.tiff"));
    let err = source.open().err().unwrap();
    assert!(matches!(err, SlideError::Io(_)));
}
