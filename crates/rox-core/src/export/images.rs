//! # Image Export
//!
//! Encodes captured buffers and writes them under the output tree.
//!
//! ## Responsibilities
//! - **Encoding**: PNG / JPEG for color buffers, 16-bit grayscale PNG for depth.
//! - **Worker**: Waits for capture tickets off the replay thread so the state
//!   machine never blocks on the renderer or the disk.
//!
//! ## Key Functions
//! - `encode_rgba`: Color buffer to PNG or JPEG bytes, alpha forced opaque.
//! - `depth_to_mm`: Centimetre depth to clamped millimetre `u16`.

use crate::config::RgbFormat;
use crate::errors::RoxError;
use crate::scene::{CaptureTicket, PixelBuffer};
use crate::view_mode::ViewMode;
use crossbeam_channel::{bounded, Sender};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, RgbaImage};
use std::fmt::Write as _;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, instrument};

/// Captures in flight before `submit` blocks the caller.
pub const MAX_IN_FLIGHT_CAPTURES: usize = 8;

/// Encoding options shared by every export job.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportSettings {
    pub rgb_format: RgbFormat,
    /// Depth outside `[min, max]` cm is written as 0.
    pub depth_range_cm: (f32, f32),
    /// Also write depth as text, one cm value per line.
    pub depth_txt: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            rgb_format: RgbFormat::default(),
            depth_range_cm: (0.3, 6553.4),
            depth_txt: false,
        }
    }
}

/// Converts centimetres to millimetres, zeroing values outside `range`.
pub fn depth_to_mm(depth_cm: &[f32], range: (f32, f32)) -> Vec<u16> {
    depth_cm
        .iter()
        .map(|&cm| {
            if !(range.0..=range.1).contains(&cm) {
                0
            } else {
                (cm * 10.0).round().clamp(0.0, u16::MAX as f32) as u16
            }
        })
        .collect()
}

/// One value per line, the text depth dump format. Whole values keep their `.0`.
pub fn depth_text(depth_cm: &[f32]) -> String {
    let mut out = String::with_capacity(depth_cm.len() * 8);
    for v in depth_cm {
        let _ = writeln!(out, "{:?}", v);
    }
    out
}

fn size_mismatch(width: u32, height: u32, len: usize) -> RoxError {
    RoxError::ImageEncode(format!(
        "Buffer of {} values does not match {}x{}",
        len, width, height
    ))
}

/// Encodes an RGBA buffer. `jpeg_quality` selects JPEG, otherwise PNG.
pub fn encode_rgba(
    width: u32,
    height: u32,
    data: &[u8],
    jpeg_quality: Option<u8>,
) -> Result<Vec<u8>, RoxError> {
    let mut pixels = data.to_vec();
    for px in pixels.chunks_exact_mut(4) {
        px[3] = 255;
    }
    let img = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| size_mismatch(width, height, data.len()))?;

    let mut bytes = Vec::new();
    match jpeg_quality {
        Some(quality) => {
            let rgb = DynamicImage::ImageRgba8(img).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
            encoder.encode_image(&rgb)?;
        }
        None => {
            DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        }
    }
    Ok(bytes)
}

/// Encodes millimetre depth as a single channel 16-bit PNG.
pub fn encode_depth_png(width: u32, height: u32, depth_mm: Vec<u16>) -> Result<Vec<u8>, RoxError> {
    let len = depth_mm.len();
    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width, height, depth_mm)
        .ok_or_else(|| size_mismatch(width, height, len))?;
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma16(img).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encodes `buffer` captured in `view_mode` and writes it to `base` plus the
/// matching extension. Returns the written paths.
#[instrument(level = "debug", skip(buffer, settings))]
pub fn write_capture(
    buffer: &PixelBuffer,
    view_mode: ViewMode,
    base: &Path,
    settings: &ExportSettings,
) -> Result<Vec<PathBuf>, RoxError> {
    if let Some(parent) = base.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut written = Vec::new();
    match buffer {
        PixelBuffer::Rgba8 {
            width,
            height,
            data,
        } => {
            let quality = match view_mode {
                ViewMode::Lit => settings.rgb_format.jpeg_quality(),
                _ => None,
            };
            let ext = if quality.is_some() { "jpg" } else { "png" };
            let bytes = encode_rgba(*width, *height, data, quality)?;
            let path = base.with_extension(ext);
            std::fs::write(&path, bytes)?;
            written.push(path);
        }
        PixelBuffer::DepthCm {
            width,
            height,
            data,
        } => {
            let mm = depth_to_mm(data, settings.depth_range_cm);
            let bytes = encode_depth_png(*width, *height, mm)?;
            let path = base.with_extension("png");
            std::fs::write(&path, bytes)?;
            written.push(path);

            if settings.depth_txt {
                let path = base.with_extension("txt");
                std::fs::write(&path, depth_text(data))?;
                written.push(path);
            }
        }
    }
    Ok(written)
}

/// A capture waiting to be written.
#[derive(Debug)]
pub struct ExportJob {
    pub ticket: CaptureTicket,
    pub view_mode: ViewMode,
    /// Output path without extension.
    pub base: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub images: usize,
    pub failed: usize,
}

/// Background worker that resolves capture tickets in submission order.
///
/// The job channel is bounded, which caps the number of captures in flight.
pub struct ImageExporter {
    tx: Option<Sender<ExportJob>>,
    handle: Option<JoinHandle<ExportStats>>,
}

impl ImageExporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self::with_capacity(settings, MAX_IN_FLIGHT_CAPTURES)
    }

    pub fn with_capacity(settings: ExportSettings, capacity: usize) -> Self {
        let (tx, rx) = bounded::<ExportJob>(capacity);

        let handle = thread::spawn(move || {
            let mut stats = ExportStats::default();
            for job in rx {
                let label = job.ticket.label().to_string();
                let result = job
                    .ticket
                    .wait()
                    .and_then(|buffer| write_capture(&buffer, job.view_mode, &job.base, &settings));
                match result {
                    Ok(paths) => {
                        stats.images += paths.len();
                        debug!("Exported {} ({} files)", label, paths.len());
                    }
                    Err(e) => {
                        stats.failed += 1;
                        error!("Export of {} failed: {}", label, e);
                    }
                }
            }
            stats
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queues a capture. Blocks only when the in-flight limit is reached.
    pub fn submit(&self, job: ExportJob) {
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                error!("Image export worker has stopped");
            }
        }
    }

    /// Waits for every queued capture and stops the worker.
    pub fn finish(mut self) -> ExportStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ExportStats {
        drop(self.tx.take());
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for ImageExporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_outside_range_is_zero() {
        let mm = depth_to_mm(&[0.1, 0.3, 12.34, 6553.4, 7000.0, -5.0], (0.3, 6553.4));
        assert_eq!(mm, vec![0, 3, 123, 65534, 0, 0]);
    }

    #[test]
    fn depth_text_is_one_value_per_line() {
        assert_eq!(depth_text(&[1.5, 200.0, 0.0]), "1.5\n200.0\n0.0\n");
    }

    #[test]
    fn png_forces_opaque_alpha() {
        let bytes = encode_rgba(1, 2, &[10, 20, 30, 0, 40, 50, 60, 128], None).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [40, 50, 60, 255]);
    }

    #[test]
    fn jpeg_is_written_for_quality() {
        let data = vec![200u8; 8 * 8 * 4];
        let bytes = encode_rgba(8, 8, &data, Some(95)).unwrap();
        assert_eq!((bytes[0], bytes[1]), (0xFF, 0xD8));
    }

    #[test]
    fn size_mismatch_is_an_error() {
        assert!(matches!(
            encode_rgba(4, 4, &[0; 4], None),
            Err(RoxError::ImageEncode(_))
        ));
    }

    #[test]
    fn depth_png_is_sixteen_bit() {
        let bytes = encode_depth_png(2, 1, vec![1000, 65534]).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.color(), image::ColorType::L16);
        assert_eq!(img.to_luma16().get_pixel(1, 0).0, [65534]);
    }

    #[test]
    fn lit_honours_format_and_mask_stays_png() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings {
            rgb_format: RgbFormat::Jpeg80,
            ..Default::default()
        };
        let buffer = PixelBuffer::Rgba8 {
            width: 2,
            height: 2,
            data: vec![255; 16],
        };

        let lit = write_capture(&buffer, ViewMode::Lit, &dir.path().join("rgb/000000"), &settings)
            .unwrap();
        assert_eq!(lit, vec![dir.path().join("rgb/000000.jpg")]);

        let mask = write_capture(
            &buffer,
            ViewMode::ObjectMask,
            &dir.path().join("mask/000000"),
            &settings,
        )
        .unwrap();
        assert_eq!(mask, vec![dir.path().join("mask/000000.png")]);
    }

    #[test]
    fn exporter_writes_depth_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ImageExporter::new(ExportSettings {
            depth_txt: true,
            ..Default::default()
        });
        exporter.submit(ExportJob {
            ticket: CaptureTicket::ready(
                "Cam0/depth",
                PixelBuffer::DepthCm {
                    width: 1,
                    height: 1,
                    data: vec![250.0],
                },
            ),
            view_mode: ViewMode::Depth,
            base: dir.path().join("depth/Cam0/000007"),
        });
        let (tx, pending) = CaptureTicket::pending("Cam0/rgb");
        drop(tx);
        exporter.submit(ExportJob {
            ticket: pending,
            view_mode: ViewMode::Lit,
            base: dir.path().join("rgb/Cam0/000007"),
        });

        let stats = exporter.finish();
        assert_eq!(stats, ExportStats { images: 2, failed: 1 });
        assert!(dir.path().join("depth/Cam0/000007.png").exists());
        let txt = std::fs::read_to_string(dir.path().join("depth/Cam0/000007.txt")).unwrap();
        assert_eq!(txt, "250.0\n");
    }
}
