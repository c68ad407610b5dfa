extern crate libloading;
extern crate custom_error;

pub mod error;
pub mod models;
pub mod movie;
pub mod params;
pub mod plugins;
pub mod simage;
pub mod stream;
pub mod utils;

pub use error::{Result, SimageError};
pub use models::{ComponentOrder, Image, ImageIOError, ImageLoader, ImageSaver, Pixel, ScanlineReader};
pub use movie::Movie;
pub use params::{ParamBag, ParamType, ParamValue};
pub use plugins::ImageFormatSupportPlugin;
pub use simage::{OpenImage, Simage};
pub use stream::{Stream, Whence};
