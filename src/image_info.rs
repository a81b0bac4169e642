use std::{cell::OnceCell, fmt, io::Cursor};

use ico::{IconDir, IconImage, ResourceType};
use image::{DynamicImage, ImageFormat, RgbaImage, imageops};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    utils::image_utils::{DEFAULT_DPI, frame_count, resolution},
};

/// Tag carried by the placeholder graphic of RIFF audio resources.
pub const WAV_TAG: &str = ".wav";

/// How a resource was classified when it was decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ImageType {
    Cursor,
    Icon,
    Image,
}

/// Picks the directory entry closest to `preferred` pixels, deepest color first on ties.
fn choose_entry(dir: &IconDir, preferred: u32) -> Option<usize> {
    dir.entries()
        .iter()
        .enumerate()
        .min_by_key(|(_, entry)| {
            (
                entry.width().abs_diff(preferred) + entry.height().abs_diff(preferred),
                u16::MAX - entry.bits_per_pixel(),
            )
        })
        .map(|(index, _)| index)
}

fn read_directory(data: &[u8], kind: ResourceType, preferred: u32) -> Result<(IconDir, IconImage)> {
    let dir = IconDir::read(Cursor::new(data))?;
    if dir.resource_type() != kind {
        return Err(Error::Decode(format!(
            "expected {kind:?} directory, found {:?}",
            dir.resource_type()
        )));
    }
    let index = choose_entry(&dir, preferred)
        .ok_or_else(|| Error::Decode("icon directory has no entries".to_owned()))?;
    let image = dir.entries()[index].decode()?;
    Ok((dir, image))
}

/// An icon: the whole directory plus the entry shown by default.
pub struct IconSource {
    dir: IconDir,
    image: IconImage,
}

impl IconSource {
    pub fn decode(data: &[u8], preferred_size: u32) -> Result<Self> {
        let (dir, image) = read_directory(data, ResourceType::Icon, preferred_size)?;
        Ok(IconSource { dir, image })
    }

    pub fn directory(&self) -> &IconDir {
        &self.dir
    }

    fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_raw(
            self.image.width(),
            self.image.height(),
            self.image.rgba_data().to_vec(),
        )
        .unwrap_or_default()
    }
}

/// A cursor: the directory, the entry shown by default and its hotspot.
pub struct CursorSource {
    dir: IconDir,
    image: IconImage,
}

impl CursorSource {
    pub fn decode(data: &[u8], preferred_size: u32) -> Result<Self> {
        let (dir, image) = read_directory(data, ResourceType::Cursor, preferred_size)?;
        Ok(CursorSource { dir, image })
    }

    pub fn directory(&self) -> &IconDir {
        &self.dir
    }

    pub fn hotspot(&self) -> (u16, u16) {
        self.image.cursor_hotspot().unwrap_or((0, 0))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Draws the cursor onto a blank canvas of the cursor's bounds.
    fn rasterize(&self) -> RgbaImage {
        let (width, height) = self.size();
        let mut canvas = RgbaImage::new(width, height);
        if let Some(cursor) = RgbaImage::from_raw(width, height, self.image.rgba_data().to_vec()) {
            imageops::overlay(&mut canvas, &cursor, 0, 0);
        }
        canvas
    }
}

/// A raster image decoded by the generic image decoders.
pub struct RasterSource {
    image: DynamicImage,
    format: Option<ImageFormat>,
    frames: u32,
    resolution: (f32, f32),
    tag: Option<&'static str>,
}

impl RasterSource {
    /// Decodes encoded image bytes, recording the container format and frame count.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let format = image::guess_format(data)?;
        let image = image::load_from_memory_with_format(data, format)?;
        Ok(RasterSource {
            image,
            format: Some(format),
            frames: frame_count(data, format),
            resolution: resolution(data, format),
            tag: None,
        })
    }

    /// Wraps pixels that have no encoded form of their own, such as image list members.
    pub fn from_pixels(image: RgbaImage) -> Self {
        RasterSource {
            image: DynamicImage::ImageRgba8(image),
            format: None,
            frames: 1,
            resolution: (DEFAULT_DPI, DEFAULT_DPI),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }
}

/// The object produced by whichever decoder accepted a resource.
pub enum SourceImage {
    Icon(IconSource),
    Cursor(CursorSource),
    Image(RasterSource),
}

impl SourceImage {
    fn image_type(&self) -> ImageType {
        match self {
            SourceImage::Icon(_) => ImageType::Icon,
            SourceImage::Cursor(_) => ImageType::Cursor,
            SourceImage::Image(_) => ImageType::Image,
        }
    }
}

/// Descriptive metadata of a decoded resource.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceDetails {
    /// The type of file the image was stored as in the assembly.
    pub image_type: ImageType,
    /// The name of the resource in the assembly.
    pub resource_name: String,
    pub width: u32,
    pub height: u32,
    /// The width and height of the image, as floating point values.
    pub physical_width: f32,
    pub physical_height: f32,
    /// Pixels per inch.
    pub horizontal_resolution: f32,
    pub vertical_resolution: f32,
    pub pixel_format: String,
    /// The encoded format the image was read from.
    pub raw_format: String,
    pub frame_count: u32,
}

/// One decoded resource: its source object, its name and a lazily rendered display bitmap.
pub struct ImageInfo {
    source: SourceImage,
    resource_name: String,
    image_type: ImageType,
    display: OnceCell<RgbaImage>,
}

impl ImageInfo {
    pub fn new<S: Into<String>>(source: SourceImage, resource_name: S) -> Self {
        let image_type = source.image_type();
        ImageInfo {
            source,
            resource_name: resource_name.into(),
            image_type,
            display: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    /// The tag of tagged placeholders, `.wav` for audio.
    pub fn tag(&self) -> Option<&'static str> {
        match &self.source {
            SourceImage::Image(raster) => raster.tag(),
            _ => None,
        }
    }

    /// The encoded format of raster sources.
    pub fn format(&self) -> Option<ImageFormat> {
        match &self.source {
            SourceImage::Image(raster) => raster.format(),
            _ => None,
        }
    }

    /// The normalized bitmap, computed on first use.
    pub fn display(&self) -> &RgbaImage {
        self.display.get_or_init(|| match &self.source {
            SourceImage::Icon(icon) => icon.to_rgba(),
            SourceImage::Cursor(cursor) => cursor.rasterize(),
            SourceImage::Image(raster) => raster.image().to_rgba8(),
        })
    }

    pub fn details(&self) -> ResourceDetails {
        let (width, height) = self.display().dimensions();
        let (horizontal_resolution, vertical_resolution, pixel_format, raw_format, frame_count) =
            match &self.source {
                SourceImage::Icon(_) => (DEFAULT_DPI, DEFAULT_DPI, "Rgba8".to_owned(), "Icon".to_owned(), 1),
                SourceImage::Cursor(_) => {
                    (DEFAULT_DPI, DEFAULT_DPI, "Rgba8".to_owned(), "MemoryBmp".to_owned(), 1)
                }
                SourceImage::Image(raster) => (
                    raster.resolution.0,
                    raster.resolution.1,
                    format!("{:?}", raster.image.color()),
                    raster
                        .format
                        .map_or_else(|| "MemoryBmp".to_owned(), |f| format!("{f:?}")),
                    raster.frames,
                ),
            };
        ResourceDetails {
            image_type: self.image_type,
            resource_name: self.resource_name.clone(),
            width,
            height,
            physical_width: width as f32,
            physical_height: height as f32,
            horizontal_resolution,
            vertical_resolution,
            pixel_format,
            raw_format,
            frame_count,
        }
    }
}

impl fmt::Debug for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInfo")
            .field("resource_name", &self.resource_name)
            .field("image_type", &self.image_type)
            .field("tag", &self.tag())
            .finish()
    }
}
