use std::{io, path::PathBuf};

/// Errors produced while loading assemblies, decoding resources and saving images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("the specified file is not a .NET assembly: {0}")]
    NotAnAssembly(String),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("the assembly does not have any embedded image resources: {0:?}")]
    NoEmbeddedImages(PathBuf),

    #[error("resource not found in assembly: '{0}'")]
    ResourceNotFound(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("image encode failed: {0}")]
    Encode(String),

    #[error("no image at index {index} (catalog holds {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<image::ImageError> for Error {
    fn from(error: image::ImageError) -> Self {
        match error {
            image::ImageError::IoError(e) => Error::Io(e),
            image::ImageError::Encoding(e) => Error::Encode(e.to_string()),
            other => Error::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! malformed {
    ($($arg:tt)+) => {
        return Err($crate::error::Error::Malformed(format!($($arg)+)))
    };
}

pub(crate) use malformed;
