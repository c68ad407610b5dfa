pub mod image;
pub mod io;
pub mod pixel;

pub use self::image::{ComponentOrder, Image};
pub use self::io::{ImageIOError, ImageLoader, ImageSaver, ScanlineReader};
pub use self::pixel::Pixel;
