//! Board compositor
//! Bakes a climb's marks into a copy of the board photo and encodes it as PNG.
//! Canvas size is the photo's native pixel size, never a display size.
//! Output is a pure function of the photo pixels and the ordered point lists.

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma, Pixel, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use std::io::Cursor;
use std::ops::Range;
use std::path::Path;
use std::time::Instant;

use crate::climb::{ClimbRecord, MarkType};

pub const MARKER_RADIUS: f32 = 13.0;
const RING_WIDTH: f32 = 3.0;
const HALO_WIDTH: f32 = RING_WIDTH + 1.0;
const HALO_COLOR: Rgba<u8> = Rgba([255, 255, 255, 230]); // 90% white
const SHADOW_OPACITY: f32 = 0.35;
const SHADOW_BLUR: f32 = 8.0; // canvas-style blur radius; sigma is half of it

/// Fixed stroke color per mark type.
pub fn mark_color(kind: MarkType) -> Rgba<u8> {
    match kind {
        MarkType::Start => Rgba([0x22, 0xc5, 0x5e, 0xff]),
        MarkType::Mid => Rgba([0x3b, 0x82, 0xf6, 0xff]),
        MarkType::Finish => Rgba([0xef, 0x44, 0x44, 0xff]),
        MarkType::Foot => Rgba([0xec, 0x48, 0x99, 0xff]),
    }
}

/// Loads the board photo the marks are drawn onto.
pub fn load_reference(path: &Path) -> Result<DynamicImage> {
    let reference = image::open(path)
        .with_context(|| format!("Failed to load board image {}", path.display()))?;
    let (width, height) = reference.dimensions();
    if width == 0 || height == 0 {
        bail!("Board image {} has no pixels", path.display());
    }
    Ok(reference)
}

/// Composites `climb` onto `reference` and returns PNG bytes.
pub fn render(reference: &DynamicImage, climb: &ClimbRecord) -> Result<Vec<u8>> {
    let started = Instant::now();
    let canvas = compose(reference, climb)?;

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("Failed to encode composited board as PNG")?;

    log::debug!(
        "Composited {} marks for {} in {:?}",
        climb.count_marks(),
        climb.id,
        started.elapsed()
    );
    Ok(bytes)
}

/// Draws every point in start, mid, finish, foot order, each list in insertion order.
pub fn compose(reference: &DynamicImage, climb: &ClimbRecord) -> Result<RgbaImage> {
    let (width, height) = reference.dimensions();
    if width == 0 || height == 0 {
        bail!("Cannot composite onto an empty {}x{} board image", width, height);
    }

    let mut canvas = reference.to_rgba8();
    for kind in MarkType::ALL {
        let color = mark_color(kind);
        for point in climb.marks(kind).iter().filter_map(|entry| entry.as_point()) {
            let cx = (point.x * f64::from(width)) as f32;
            let cy = (point.y * f64::from(height)) as f32;
            draw_marker(&mut canvas, cx, cy, color);
        }
    }
    Ok(canvas)
}

/// `data:image/png;base64,...` for embedding a rendered board in HTML.
pub fn to_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png))
}

fn draw_marker(canvas: &mut RgbaImage, cx: f32, cy: f32, color: Rgba<u8>) {
    draw_shadow(canvas, cx, cy);
    stroke_ring(canvas, cx, cy, HALO_WIDTH, HALO_COLOR);
    stroke_ring(canvas, cx, cy, RING_WIDTH, color);
}

// Anti-aliased coverage of a circle stroke `width` wide, `distance` from the centre.
fn ring_coverage(distance: f32, width: f32) -> f32 {
    (width / 2.0 + 0.5 - (distance - MARKER_RADIUS).abs()).clamp(0.0, 1.0)
}

fn pixel_span(center: f32, reach: f32, limit: u32) -> Range<u32> {
    let lo = (center - reach).floor().clamp(0.0, limit as f32) as u32;
    let hi = (center + reach).ceil().clamp(0.0, limit as f32) as u32;
    lo..hi
}

fn distance(x: f32, y: f32, cx: f32, cy: f32) -> f32 {
    (x + 0.5 - cx).hypot(y + 0.5 - cy)
}

fn stroke_ring(canvas: &mut RgbaImage, cx: f32, cy: f32, width: f32, color: Rgba<u8>) {
    let reach = MARKER_RADIUS + width / 2.0 + 1.0;
    for y in pixel_span(cy, reach, canvas.height()) {
        for x in pixel_span(cx, reach, canvas.width()) {
            let coverage = ring_coverage(distance(x as f32, y as f32, cx, cy), width);
            if coverage <= 0.0 {
                continue;
            }
            let alpha = (f32::from(color[3]) * coverage).round() as u8;
            canvas
                .get_pixel_mut(x, y)
                .blend(&Rgba([color[0], color[1], color[2], alpha]));
        }
    }
}

// Blurred copy of the halo ring, rendered into a patch around the marker and
// laid down in black before the strokes.
fn draw_shadow(canvas: &mut RgbaImage, cx: f32, cy: f32) {
    let sigma = SHADOW_BLUR / 2.0;
    let reach = MARKER_RADIUS + HALO_WIDTH / 2.0 + 1.0 + (3.0 * sigma).ceil();
    let origin_x = (cx - reach).floor();
    let origin_y = (cy - reach).floor();
    let size = (2.0 * reach).ceil() as u32 + 1;

    let mask = GrayImage::from_fn(size, size, |x, y| {
        let coverage = ring_coverage(
            distance(origin_x + x as f32, origin_y + y as f32, cx, cy),
            HALO_WIDTH,
        );
        Luma([(coverage * 255.0).round() as u8])
    });
    let blurred = gaussian_blur_f32(&mask, sigma);

    for (x, y, shade) in blurred.enumerate_pixels() {
        let gx = origin_x + x as f32;
        let gy = origin_y + y as f32;
        if gx < 0.0 || gy < 0.0 || gx >= canvas.width() as f32 || gy >= canvas.height() as f32 {
            continue;
        }
        let alpha = (f32::from(shade[0]) * SHADOW_OPACITY).round() as u8;
        if alpha > 0 {
            canvas.get_pixel_mut(gx as u32, gy as u32).blend(&Rgba([0, 0, 0, alpha]));
        }
    }
}
