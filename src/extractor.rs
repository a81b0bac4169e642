//! Classifies the embedded resources of a module and decodes the ones that hold images.
//!
//! Every resource is offered to a fixed, ordered list of decoders. The first
//! decoder that accepts the bytes decides what the resource becomes; a resource
//! no decoder accepts is skipped.

use std::fmt;

use crate::{
    image_info::{CursorSource, IconSource, ImageInfo, RasterSource, SourceImage, WAV_TAG},
    image_list::decode_image_list,
    module::ResourceModule,
    resources::{ResourceTable, ResourceValue},
    utils::image_utils::wave_placeholder,
};

/// Icon size used by the platform when none is requested.
pub const DEFAULT_ICON_SIZE: u32 = 32;

const RIFF_SIGNATURE: &[u8] = b"RIFF";
const BITMAP_CLASS: &str = "System.Drawing.Bitmap";
const ICON_CLASS: &str = "System.Drawing.Icon";
const IMAGE_LIST_CLASS: &str = "System.Windows.Forms.ImageListStreamer";

/// Options that influence how resources are decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractOptions {
    icon_size: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            icon_size: DEFAULT_ICON_SIZE,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        ExtractOptions::default()
    }

    /// Sets the size, in pixels, of the icon or cursor entry shown by default.
    pub fn with_icon_size(mut self, icon_size: u32) -> Self {
        self.icon_size = icon_size;
        self
    }

    pub fn icon_size(&self) -> u32 {
        self.icon_size
    }
}

/// A decoded resource together with whether it holds more than one frame.
#[derive(Debug)]
pub struct ExtractedImage {
    pub info: ImageInfo,
    pub animated: bool,
}

impl ExtractedImage {
    fn still(source: SourceImage, name: &str) -> Self {
        ExtractedImage {
            info: ImageInfo::new(source, name),
            animated: false,
        }
    }
}

/// Why a decoder declined a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declined(String);

impl fmt::Display for Declined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<E: std::error::Error> From<E> for Declined {
    fn from(error: E) -> Self {
        Declined(error.to_string())
    }
}

type Decoder = fn(&str, &[u8], &ExtractOptions) -> Result<Vec<ExtractedImage>, Declined>;

/// Decoders in the order they are tried.
const DECODERS: &[(&str, Decoder)] = &[
    ("icon", try_icon),
    ("cursor", try_cursor),
    ("image", try_image),
    ("resource table", try_resource_table),
    ("riff", try_riff),
];

fn try_icon(name: &str, data: &[u8], options: &ExtractOptions) -> Result<Vec<ExtractedImage>, Declined> {
    let icon = IconSource::decode(data, options.icon_size())?;
    Ok(vec![ExtractedImage::still(SourceImage::Icon(icon), name)])
}

fn try_cursor(name: &str, data: &[u8], options: &ExtractOptions) -> Result<Vec<ExtractedImage>, Declined> {
    let cursor = CursorSource::decode(data, options.icon_size())?;
    Ok(vec![ExtractedImage::still(SourceImage::Cursor(cursor), name)])
}

fn try_image(name: &str, data: &[u8], _: &ExtractOptions) -> Result<Vec<ExtractedImage>, Declined> {
    let raster = RasterSource::decode(data)?;
    let animated = raster.frames() > 1;
    Ok(vec![ExtractedImage {
        info: ImageInfo::new(SourceImage::Image(raster), name),
        animated,
    }])
}

fn try_resource_table(
    _: &str,
    data: &[u8],
    options: &ExtractOptions,
) -> Result<Vec<ExtractedImage>, Declined> {
    let table = ResourceTable::parse(data)?;
    let mut images = Vec::new();
    for entry in table.entries() {
        match entry {
            Ok((key, value)) => images.extend(images_from_value(&key, &value, options)),
            Err(e) => log::debug!("skipping unreadable resource entry: {e}"),
        }
    }
    Ok(images)
}

/// Turns one resource table value into zero or more images.
fn images_from_value(key: &str, value: &ResourceValue, options: &ExtractOptions) -> Vec<ExtractedImage> {
    let ResourceValue::Object { document, .. } = value else {
        return Vec::new();
    };
    let Some(root) = document.root() else {
        return Vec::new();
    };
    let decoded = match root.name() {
        BITMAP_CLASS => document
            .bytes(root, "Data")
            .ok_or_else(|| "bitmap has no data".to_owned())
            .and_then(|bytes| RasterSource::decode(bytes).map_err(|e| e.to_string()))
            .map(|raster| vec![ExtractedImage::still(SourceImage::Image(raster), key)]),
        ICON_CLASS => document
            .bytes(root, "IconData")
            .ok_or_else(|| "icon has no data".to_owned())
            .and_then(|bytes| {
                IconSource::decode(bytes, options.icon_size()).map_err(|e| e.to_string())
            })
            .map(|icon| vec![ExtractedImage::still(SourceImage::Icon(icon), key)]),
        IMAGE_LIST_CLASS => document
            .bytes(root, "Data")
            .ok_or_else(|| "image list has no data".to_owned())
            .and_then(|bytes| decode_image_list(bytes).map_err(|e| e.to_string()))
            .map(|members| {
                let stem = list_stem(key);
                members
                    .into_iter()
                    .enumerate()
                    .map(|(index, image)| {
                        let name = format!("{stem}_{index:02}");
                        ExtractedImage::still(SourceImage::Image(RasterSource::from_pixels(image)), &name)
                    })
                    .collect()
            }),
        _ => return Vec::new(),
    };
    decoded.unwrap_or_else(|reason| {
        log::debug!("skipping resource entry {key}: {reason}");
        Vec::new()
    })
}

/// The entry key without its last dot-delimited segment.
fn list_stem(key: &str) -> &str {
    key.rsplit_once('.').map_or(key, |(stem, _)| stem)
}

fn try_riff(name: &str, data: &[u8], _: &ExtractOptions) -> Result<Vec<ExtractedImage>, Declined> {
    if !data.starts_with(RIFF_SIGNATURE) {
        return Err(Declined("no RIFF signature".to_owned()));
    }
    let raster = RasterSource::from_pixels(wave_placeholder()).with_tag(WAV_TAG);
    Ok(vec![ExtractedImage::still(SourceImage::Image(raster), name)])
}

/// Runs the decoder chain over one resource.
pub fn extract_resource(name: &str, data: &[u8], options: &ExtractOptions) -> Vec<ExtractedImage> {
    for (decoder_name, decoder) in DECODERS {
        match decoder(name, data, options) {
            Ok(images) => {
                log::debug!("{name}: {decoder_name} decoder produced {} image(s)", images.len());
                return images;
            }
            Err(miss) => log::trace!("{name}: {decoder_name} decoder declined: {miss}"),
        }
    }
    log::debug!("{name}: not an image resource");
    Vec::new()
}

/// Decodes every image held by the module's resources, in resource order.
pub fn extract_images<M: ResourceModule>(module: &M, options: &ExtractOptions) -> Vec<ExtractedImage> {
    let mut images = Vec::new();
    for name in module.resource_names() {
        let Some(data) = module.open_resource(&name) else {
            log::debug!("{name}: resource could not be opened");
            continue;
        };
        images.extend(extract_resource(&name, data, options));
    }
    images
}
