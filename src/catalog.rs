
use std::path::Path;

use crate::{
    assembly::{Assembly, AssemblyInfo},
    error::{Error, Result},
    export::{SaveFailure, save_all, save_image},
    extractor::{ExtractOptions, ExtractedImage, extract_images},
    image_info::{ImageInfo, ResourceDetails},
    utils::{clipboard_utils::copy_image, image_utils::image_to_base64},
};

struct Loaded {
    assembly: Assembly,
    images: Vec<ExtractedImage>,
}

/// Holds at most one open assembly and the images extracted from it.
///
/// Opening another assembly, or calling [`ImageCatalog::close`], drops every
/// image of the previous one.
#[derive(Default)]
pub struct ImageCatalog {
    options: ExtractOptions,
    loaded: Option<Loaded>,
}

impl ImageCatalog {
    pub fn new() -> Self {
        ImageCatalog::default()
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        ImageCatalog {
            options,
            loaded: None,
        }
    }

    /// Loads the assembly at `path` and extracts its images, returning how many were found.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        self.close();
        let assembly = Assembly::from_path(path.as_ref()).map_err(|e| match e {
            Error::NotAnAssembly(_) => e,
            other => Error::NotAnAssembly(format!("{}: {other}", path.as_ref().display())),
        })?;
        self.open_assembly(assembly)
    }

    /// Extracts the images of an already loaded assembly.
    pub fn open_assembly(&mut self, assembly: Assembly) -> Result<usize> {
        self.close();
        let images = extract_images(&assembly, &self.options);
        if images.is_empty() {
            let location = assembly.location().map(Path::to_path_buf).unwrap_or_default();
            return Err(Error::NoEmbeddedImages(location));
        }
        log::info!("{} image(s) found in {}", images.len(), assembly.full_name());
        let count = images.len();
        self.loaded = Some(Loaded { assembly, images });
        Ok(count)
    }

    pub fn is_open(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn images(&self) -> &[ExtractedImage] {
        self.loaded
            .as_ref()
            .map(|loaded| loaded.images.as_slice())
            .unwrap_or_default()
    }

    pub fn get(&self, index: usize) -> Result<&ImageInfo> {
        let images = self.images();
        images
            .get(index)
            .map(|image| &image.info)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: images.len(),
            })
    }

    pub fn full_name(&self) -> Option<String> {
        self.loaded.as_ref().map(|loaded| loaded.assembly.full_name())
    }

    /// Title, company and the other descriptive attributes of the open assembly.
    pub fn info(&self) -> Option<&AssemblyInfo> {
        self.loaded.as_ref().map(|loaded| loaded.assembly.info())
    }

    pub fn location(&self) -> Option<&Path> {
        self.loaded.as_ref().and_then(|loaded| loaded.assembly.location())
    }

    fn assembly(&self) -> Result<&Assembly> {
        self.loaded
            .as_ref()
            .map(|loaded| &loaded.assembly)
            .ok_or_else(|| Error::Unsupported("no assembly is open".to_owned()))
    }

    pub fn save<P: AsRef<Path>>(&self, index: usize, path: P) -> Result<()> {
        save_image(self.get(index)?, path.as_ref(), self.assembly()?)
    }

    /// Saves every image below `folder` and returns what could not be saved.
    pub fn save_all<P: AsRef<Path>>(&self, folder: P) -> Result<Vec<SaveFailure>> {
        let assembly = self.assembly()?;
        Ok(save_all(
            self.images().iter().map(|image| &image.info),
            folder.as_ref(),
            assembly,
        ))
    }

    /// Places the display bitmap of image `index` on the system clipboard.
    pub fn copy(&self, index: usize) -> Result<()> {
        copy_image(self.get(index)?.display())
    }

    pub fn properties(&self, index: usize) -> Result<ResourceDetails> {
        Ok(self.get(index)?.details())
    }

    pub fn base64(&self, index: usize) -> Result<String> {
        image_to_base64(self.get(index)?.display())
    }

    pub fn close(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            log::debug!(
                "closing {} ({} images)",
                loaded.assembly.full_name(),
                loaded.images.len()
            );
        }
    }
}
