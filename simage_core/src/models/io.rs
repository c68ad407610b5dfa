use std::path::Path;

use custom_error::custom_error;

use crate::params::ParamBag;

use super::image::Image;

custom_error! {pub ImageIOError
    FailedToOpen {description: String} = "Failed to open image: {description}",
    FailedToRead {description: String} = "Failed to read image: {description}",
    OutOfMemory {description: String} = "Out of memory: {description}",
    Unsupported {description: String} = "Not supported: {description}",
    FailedToWrite {description: String} = "Failed to write image: {description}",
    InvalidOptions {description: String} = "Invalid options are set for this io operation: {description}",
}

impl ImageIOError {

    /// Stable numeric code for the error kind, reported alongside the message.
    pub fn code(&self) -> i32 {
        match self {
            ImageIOError::FailedToOpen { .. } => 1,
            ImageIOError::FailedToRead { .. } => 2,
            ImageIOError::OutOfMemory { .. } => 3,
            ImageIOError::Unsupported { .. } => 4,
            ImageIOError::FailedToWrite { .. } => 5,
            ImageIOError::InvalidOptions { .. } => 6,
        }
    }

    pub fn unsupported(operation: &str) -> Self {
        ImageIOError::Unsupported {
            description: operation.to_string(),
        }
    }
}

/// Reads one image format.
pub trait ImageLoader {

    fn name(&self) -> &str;

    /// Decides from the first bytes of the file whether this loader can read it.
    /// `header` may be shorter than the dispatcher's header length for small files.
    fn identify(&self, filename: &Path, header: &[u8]) -> bool;

    fn load(&self, filename: &Path) -> Result<Image<'static>, ImageIOError>;

    /// Opens the file for line-by-line reading. Loaders that can only decode whole
    /// images keep the default.
    fn open_scanlines(&self, _filename: &Path) -> Result<Box<dyn ScanlineReader>, ImageIOError> {
        Err(ImageIOError::unsupported("line-by-line reading"))
    }
}

/// Writes one image format.
pub trait ImageSaver {

    /// File name extensions handled by this saver, separated by commas or semicolons.
    fn extensions(&self) -> &str;

    fn full_name(&self) -> &str;

    fn description(&self) -> &str;

    fn save(&self, filename: &Path, image: &Image, params: &ParamBag) -> Result<(), ImageIOError>;
}

pub trait ScanlineReader {

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn components(&self) -> usize;

    /// Reads row `line` (0 is the top row) into `buf`, which holds at least `width * components` bytes.
    fn read_line(&mut self, line: usize, buf: &mut [u8]) -> Result<(), ImageIOError>;
}
