//! Decoder for serialized image lists (`ImageListStreamer` payloads).
//!
//! The payload is an optionally RLE-compressed common-controls image list: a
//! fixed header followed by a color bitmap holding every image in a grid and,
//! when the list is masked, a monochrome mask bitmap of the same grid.

use std::{
    borrow::Cow,
    io::{Cursor, Seek, SeekFrom},
};

use byteorder::{LittleEndian, ReadBytesExt};
use image::{ImageFormat, RgbaImage, imageops};

use crate::{
    error::{Result, malformed},
    utils::image_utils::rgba_to_bgra,
};

const RLE_SIGNATURE: &[u8] = b"MSFt";
const IMAGE_LIST_MAGIC: u16 = 0x4C49;
const HEADER_SIZE: usize = 28;
const BITMAP_FILE_HEADER_SIZE: usize = 14;
const BITMAP_INFO_HEADER_SIZE: u32 = 40;
const BI_RGB: u32 = 0;
const ILC_MASK: u16 = 0x0001;
const ILC_COLOR_MASK: u16 = 0x00FE;
const ILC_COLOR32: u16 = 0x0020;

/// The `ILHEAD` structure written in front of the bitmaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageListHeader {
    pub version: u16,
    pub count: u16,
    pub width: u32,
    pub height: u32,
    pub flags: u16,
}

impl ImageListHeader {
    fn color_depth(&self) -> u16 {
        self.flags & ILC_COLOR_MASK
    }

    fn has_mask(&self) -> bool {
        self.flags & ILC_MASK != 0
    }
}

/// Expands `MSFt` run-length encoded data; `(count, value)` byte pairs follow the signature.
///
/// Data without the signature is returned unchanged.
pub fn decompress(data: &[u8]) -> Cow<'_, [u8]> {
    let Some(pairs) = data.strip_prefix(RLE_SIGNATURE) else {
        return Cow::Borrowed(data);
    };
    let total = pairs.chunks_exact(2).map(|pair| usize::from(pair[0])).sum();
    let mut output = Vec::with_capacity(total);
    for pair in pairs.chunks_exact(2) {
        output.extend(std::iter::repeat_n(pair[1], usize::from(pair[0])));
    }
    Cow::Owned(output)
}

fn read_header(data: &[u8]) -> Result<ImageListHeader> {
    if data.len() < HEADER_SIZE {
        malformed!("image list header truncated at {} bytes", data.len());
    }
    let mut reader = Cursor::new(data);
    let magic = reader.read_u16::<LittleEndian>()?;
    if magic != IMAGE_LIST_MAGIC {
        malformed!("bad image list magic {magic:#x}");
    }
    let version = reader.read_u16::<LittleEndian>()?;
    let count = reader.read_i16::<LittleEndian>()?;
    let _max = reader.read_i16::<LittleEndian>()?;
    let _grow = reader.read_i16::<LittleEndian>()?;
    let width = reader.read_i16::<LittleEndian>()?;
    let height = reader.read_i16::<LittleEndian>()?;
    let _background = reader.read_u32::<LittleEndian>()?;
    let flags = reader.read_u16::<LittleEndian>()?;
    if count < 0 || width <= 0 || height <= 0 {
        malformed!("invalid image list geometry {count} x {width}x{height}");
    }
    Ok(ImageListHeader {
        version,
        count: count as u16,
        width: width as u32,
        height: height as u32,
        flags,
    })
}

/// Decodes one BMP file at the start of `data`, returning it with its encoded length.
fn read_bitmap(data: &[u8]) -> Result<(RgbaImage, usize)> {
    if data.len() < BITMAP_FILE_HEADER_SIZE || !data.starts_with(b"BM") {
        malformed!("image list bitmap missing");
    }
    let size = u32::from_le_bytes([data[2], data[3], data[4], data[5]]) as usize;
    if size < BITMAP_FILE_HEADER_SIZE || size > data.len() {
        malformed!("image list bitmap size {size} out of range");
    }
    let bitmap = &data[..size];
    let image = match read_bgra_bitmap(bitmap)? {
        Some(image) => image,
        None => image::load_from_memory_with_format(bitmap, ImageFormat::Bmp)?.to_rgba8(),
    };
    Ok((image, size))
}

/// Reads an uncompressed 32-bit bitmap with its fourth byte kept as alpha.
///
/// Returns `None` for every other layout.
fn read_bgra_bitmap(bitmap: &[u8]) -> Result<Option<RgbaImage>> {
    let mut reader = Cursor::new(bitmap);
    reader.seek(SeekFrom::Start(10))?;
    let pixel_offset = reader.read_u32::<LittleEndian>()? as usize;
    if reader.read_u32::<LittleEndian>()? < BITMAP_INFO_HEADER_SIZE {
        return Ok(None);
    }
    let width = reader.read_i32::<LittleEndian>()?;
    let height = reader.read_i32::<LittleEndian>()?;
    let _planes = reader.read_u16::<LittleEndian>()?;
    let bit_count = reader.read_u16::<LittleEndian>()?;
    let compression = reader.read_u32::<LittleEndian>()?;
    if bit_count != 32 || compression != BI_RGB {
        return Ok(None);
    }
    if width <= 0 || height == 0 {
        malformed!("invalid 32-bit bitmap size {width}x{height}");
    }

    let (width, rows) = (width as u32, height.unsigned_abs());
    let stride = width as usize * 4;
    let Some(pixels) = stride
        .checked_mul(rows as usize)
        .and_then(|len| bitmap.get(pixel_offset..pixel_offset.checked_add(len)?))
    else {
        malformed!("32-bit bitmap pixels truncated");
    };
    // Positive heights store the bottom row first.
    let top_down: Vec<u8> = if height > 0 {
        pixels.chunks_exact(stride).rev().flatten().copied().collect()
    } else {
        pixels.to_vec()
    };
    match RgbaImage::from_raw(width, rows, rgba_to_bgra(&top_down)) {
        Some(image) => Ok(Some(image)),
        None => malformed!("32-bit bitmap pixels truncated"),
    }
}

/// Splits an image list payload into its individual images, in list order.
pub fn decode_image_list(data: &[u8]) -> Result<Vec<RgbaImage>> {
    let data = decompress(data);
    let header = read_header(&data)?;
    log::debug!(
        "image list v{:#x}: {} images of {}x{}, flags {:#x}",
        header.version,
        header.count,
        header.width,
        header.height,
        header.flags
    );
    if header.count == 0 {
        return Ok(Vec::new());
    }

    let (mut grid, used) = read_bitmap(&data[HEADER_SIZE..])?;
    // A color bitmap whose alpha bytes are all zero carries no alpha at all.
    let without_alpha = grid.pixels().all(|pixel| pixel.0[3] == 0);
    if without_alpha {
        grid.pixels_mut().for_each(|pixel| pixel.0[3] = u8::MAX);
    }
    if header.has_mask() && (header.color_depth() != ILC_COLOR32 || without_alpha) {
        let rest = &data[HEADER_SIZE + used..];
        let (mask, _) = read_bitmap(rest)?;
        apply_mask(&mut grid, &mask);
    }

    let columns = (grid.width() / header.width).max(1);
    (0..u32::from(header.count))
        .map(|index| -> Result<RgbaImage> {
            let x = (index % columns) * header.width;
            let y = (index / columns) * header.height;
            if x + header.width > grid.width() || y + header.height > grid.height() {
                malformed!("image {index} lies outside the {}x{} grid", grid.width(), grid.height());
            }
            Ok(imageops::crop_imm(&grid, x, y, header.width, header.height).to_image())
        })
        .collect()
}

/// Clears alpha wherever the monochrome mask is set.
fn apply_mask(grid: &mut RgbaImage, mask: &RgbaImage) {
    for (x, y, pixel) in grid.enumerate_pixels_mut() {
        if mask.get_pixel_checked(x, y).is_some_and(|m| m.0[0] > 127) {
            pixel.0[3] = 0;
        }
    }
}
