use std::io::Cursor;

use base64::{Engine, engine::general_purpose};
use image::{
    AnimationDecoder, ImageFormat, Rgba, RgbaImage,
    codecs::{gif::GifDecoder, png::PngDecoder},
};

use crate::error::Result;

/// Default resolution reported when the encoded image carries none.
pub const DEFAULT_DPI: f32 = 96.0;
const INCHES_PER_METER: f32 = 0.0254;

const PLACEHOLDER_SIZE: u32 = 32;

/// Encodes an image as PNG and returns it base64 encoded.
pub fn image_to_base64(image: &RgbaImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(general_purpose::STANDARD.encode(buffer.into_inner()))
}

/// Converts RGBA pixel data to the BGRA order used by device independent bitmaps.
pub fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .flat_map(|px| [px[2], px[1], px[0], px[3]])
        .collect()
}

/// Counts the frames of an animated container. Still images report one frame.
pub fn frame_count(data: &[u8], format: ImageFormat) -> u32 {
    let frames = match format {
        ImageFormat::Gif => GifDecoder::new(Cursor::new(data))
            .ok()
            .map(|decoder| decoder.into_frames().count()),
        ImageFormat::Png => PngDecoder::new(Cursor::new(data)).ok().and_then(|decoder| {
            if decoder.is_apng().ok()? {
                Some(decoder.apng().ok()?.into_frames().count())
            } else {
                None
            }
        }),
        _ => None,
    };
    frames.map_or(1, |count| count.max(1) as u32)
}

/// Reads the horizontal and vertical resolution, in dots per inch, stored in the encoded image.
pub fn resolution(data: &[u8], format: ImageFormat) -> (f32, f32) {
    let found = match format {
        ImageFormat::Png => png_resolution(data),
        ImageFormat::Bmp => bmp_resolution(data),
        ImageFormat::Jpeg => jpeg_resolution(data),
        _ => None,
    };
    found.unwrap_or((DEFAULT_DPI, DEFAULT_DPI))
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn png_resolution(data: &[u8]) -> Option<(f32, f32)> {
    let mut offset = 8;
    while offset + 8 <= data.len() {
        let len = be_u32(&data[offset..]) as usize;
        let kind = &data[offset + 4..offset + 8];
        if kind == b"pHYs" {
            let body = data.get(offset + 8..offset + 17)?;
            // Unit 1 is pixels per meter; unit 0 only gives an aspect ratio.
            if body[8] != 1 {
                return None;
            }
            return Some((
                be_u32(&body[0..]) as f32 * INCHES_PER_METER,
                be_u32(&body[4..]) as f32 * INCHES_PER_METER,
            ));
        }
        if kind == b"IDAT" {
            return None;
        }
        offset = offset.checked_add(len + 12)?;
    }
    None
}

fn bmp_resolution(data: &[u8]) -> Option<(f32, f32)> {
    let header = data.get(38..46)?;
    let x = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let y = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (x > 0 && y > 0).then(|| (x as f32 * INCHES_PER_METER, y as f32 * INCHES_PER_METER))
}

fn jpeg_resolution(data: &[u8]) -> Option<(f32, f32)> {
    // JFIF APP0 directly follows SOI in conforming files.
    let app0 = data.get(2..20)?;
    if app0[0..2] != [0xFF, 0xE0] || &app0[4..9] != b"JFIF\0" {
        return None;
    }
    let x = f32::from(u16::from_be_bytes([app0[12], app0[13]]));
    let y = f32::from(u16::from_be_bytes([app0[14], app0[15]]));
    match app0[11] {
        1 if x > 0.0 && y > 0.0 => Some((x, y)),
        2 if x > 0.0 && y > 0.0 => Some((x * 2.54, y * 2.54)),
        _ => None,
    }
}

/// The fixed graphic shown for RIFF audio resources: a waveform on a light tile.
pub fn wave_placeholder() -> RgbaImage {
    let size = PLACEHOLDER_SIZE;
    let mut image = RgbaImage::from_pixel(size, size, Rgba([240, 240, 240, 255]));
    let center = (size / 2) as f32;
    for x in 2..size - 2 {
        let phase = (x - 2) as f32 / (size - 4) as f32 * std::f32::consts::TAU * 2.0;
        let envelope = 1.0 - ((x as f32 - center) / center).abs();
        let y = center - phase.sin() * envelope * (center - 3.0);
        for dy in [-1.0f32, 0.0, 1.0] {
            let py = (y + dy).round().clamp(0.0, (size - 1) as f32) as u32;
            image.put_pixel(x, py, Rgba([30, 90, 200, 255]));
        }
    }
    for x in 0..size {
        image.put_pixel(x, 0, Rgba([120, 120, 120, 255]));
        image.put_pixel(x, size - 1, Rgba([120, 120, 120, 255]));
    }
    image
}
