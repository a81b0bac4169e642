use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageFormat};

use crate::{
    error::{Error, Result},
    image_info::{ImageInfo, ImageType, SourceImage, WAV_TAG},
    module::ResourceModule,
};

const RESOURCES_SUFFIX: &str = ".resources";

/// The file extension, with its leading dot, an image is saved under by default.
pub fn extension_for(info: &ImageInfo) -> &'static str {
    match info.image_type() {
        ImageType::Icon => ".ico",
        ImageType::Cursor => ".cur",
        ImageType::Image if info.tag() == Some(WAV_TAG) => ".wav",
        ImageType::Image => match info.format() {
            Some(ImageFormat::Jpeg) => ".jpg",
            Some(ImageFormat::Gif) => ".gif",
            Some(ImageFormat::Png) => ".png",
            _ => ".bmp",
        },
    }
}

/// Human readable name of the file type behind `ext`.
pub fn friendly_name(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        ".cur" => "Cursor",
        ".ico" => "Icon",
        ".png" => "Portable Network Graphic",
        ".jpg" | ".jpeg" => "Joint Photographic Experts Group",
        ".bmp" => "Bitmap",
        ".wav" => "Waveform Audio File Format",
        ".gif" => "Graphics Interchange Format",
        _ => "Unknown",
    }
}

/// A save dialog filter such as `Icon (*.ico)|*.ico`.
pub fn filter_for(ext: &str) -> String {
    format!("{} (*{ext})|*{ext}", friendly_name(ext))
}

fn copy_resource<M: ResourceModule>(info: &ImageInfo, path: &Path, module: &M) -> Result<()> {
    let data = module
        .open_resource(info.resource_name())
        .ok_or_else(|| Error::ResourceNotFound(info.resource_name().to_owned()))?;
    fs::write(path, data)?;
    Ok(())
}

fn encode_display(info: &ImageInfo, path: &Path, ext: &str) -> Result<()> {
    let format = ImageFormat::from_extension(ext.trim_start_matches('.')).unwrap_or(ImageFormat::Png);
    let display = info.display();
    if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgba8(display.clone())
            .to_rgb8()
            .save_with_format(path, format)?;
    } else {
        display.save_with_format(path, format)?;
    }
    Ok(())
}

/// Saves one image to `path`, choosing how from the path's extension.
///
/// Icons saved as `.ico` keep every entry of their directory. Cursors saved
/// as `.cur`, GIFs and audio are copied byte for byte from the module, so
/// their resource name must still resolve there. Anything else is written
/// from the display bitmap.
pub fn save_image<M: ResourceModule>(info: &ImageInfo, path: &Path, module: &M) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    log::debug!("saving {} to {}", info.resource_name(), path.display());
    match (ext.as_str(), info.source()) {
        (".ico", SourceImage::Icon(icon)) => {
            let mut file = fs::File::create(path)?;
            icon.directory().write(&mut file)?;
            Ok(())
        }
        (".cur", SourceImage::Cursor(_)) | (".gif" | ".wav", _) => copy_resource(info, path, module),
        _ => encode_display(info, path, &ext),
    }
}

/// An image batch export could not write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveFailure {
    /// File name the image would have been written as.
    pub name: String,
    /// Directory it would have been written to.
    pub target: PathBuf,
    pub reason: String,
}

/// The file name an image is exported under, before numbering.
fn export_stem(resource_name: &str) -> &str {
    let name = resource_name
        .split_once('.')
        .map_or(resource_name, |(_, rest)| rest);
    match name.rfind(RESOURCES_SUFFIX) {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}

/// Saves every image below `folder`, one subfolder per file type.
///
/// Files are named `{stem}-{NN}{ext}` with the counter restarting whenever
/// the stem changes. Nothing stops the batch; the failures are returned.
pub fn save_all<'a, I, M>(images: I, folder: &Path, module: &M) -> Vec<SaveFailure>
where
    I: IntoIterator<Item = &'a ImageInfo>,
    M: ResourceModule,
{
    let mut failures = Vec::new();
    let mut last = String::new();
    let mut count = 0;
    for info in images {
        let ext = extension_for(info);
        let friendly = friendly_name(ext);
        let dir = folder.join(friendly.split(' ').next().unwrap_or(friendly));

        let stem = export_stem(info.resource_name());
        if stem != last {
            count = 0;
            last = stem.to_owned();
        }
        count += 1;
        let name = format!("{stem}-{count:02}{ext}");

        if let Err(e) = fs::create_dir_all(&dir) {
            log::warn!("cannot create {}: {e}", dir.display());
            failures.push(SaveFailure {
                name,
                target: dir,
                reason: e.to_string(),
            });
            continue;
        }
        if let Err(e) = save_image(info, &dir.join(&name), module) {
            log::warn!("cannot save {}: {e}", info.resource_name());
            failures.push(SaveFailure {
                name,
                target: dir,
                reason: e.to_string(),
            });
        }
    }
    log::info!("batch save finished with {} failure(s)", failures.len());
    failures
}

/// Renders failures as numbered `NN - dir/file` lines.
pub fn format_failures(failures: &[SaveFailure]) -> String {
    let mut out = String::new();
    for (index, failure) in failures.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:02} - {}",
            index + 1,
            failure.target.join(&failure.name).display()
        );
    }
    out
}
