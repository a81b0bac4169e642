mod utils {
    pub mod binary_utils;
    pub mod clipboard_utils;
    pub mod image_utils;
}
pub mod assembly;
pub mod catalog;
pub mod error;
pub mod export;
pub mod extractor;
pub mod image_info;
pub mod image_list;
pub mod module;
pub mod nrbf;
pub mod resources;

pub use assembly::{Assembly, AssemblyInfo, AssemblyName, find_assemblies};
pub use catalog::ImageCatalog;
pub use error::{Error, Result};
pub use export::{
    SaveFailure, extension_for, filter_for, format_failures, friendly_name, save_all, save_image,
};
pub use extractor::{ExtractOptions, ExtractedImage, extract_images, extract_resource};
pub use image_info::{ImageInfo, ImageType, ResourceDetails, SourceImage};
pub use module::{MemoryModule, ResourceModule};
pub use utils::clipboard_utils::image_to_dib;
pub use utils::image_utils::image_to_base64;

use std::path::Path;

use image::RgbaImage;

pub fn get_images_by_path<P: AsRef<Path>>(path: P) -> Result<Vec<ExtractedImage>> {
    let assembly = Assembly::from_path(path)?;
    Ok(extract_images(&assembly, &ExtractOptions::default()))
}

pub fn get_images_by_module<M: ResourceModule>(module: &M) -> Vec<ExtractedImage> {
    extract_images(module, &ExtractOptions::default())
}

/// Returns the display bitmap of the first image decoded from the named resource.
pub fn get_image_by_resource<P: AsRef<Path>>(path: P, resource_name: &str) -> Result<RgbaImage> {
    let assembly = Assembly::from_path(path)?;
    let data = assembly
        .open_resource(resource_name)
        .ok_or_else(|| Error::ResourceNotFound(resource_name.to_owned()))?;
    extract_resource(resource_name, data, &ExtractOptions::default())
        .into_iter()
        .next()
        .map(|image| image.info.display().clone())
        .ok_or_else(|| Error::Decode(format!("{resource_name} does not hold an image")))
}

pub fn get_image_base64_by_resource<P: AsRef<Path>>(path: P, resource_name: &str) -> Result<String> {
    let image = get_image_by_resource(path, resource_name)?;
    image_to_base64(&image)
}
