extern crate custom_error;

use simage_core::models::io::{ImageLoader, ImageSaver};
use simage_core::plugins::ImageFormatSupportPlugin;

use reader::BMPReader;
use writer::BMPWriter;

pub mod reader;
pub mod writer;

#[derive(Default)]
pub struct BMPFormatSupportPlugin {
}

impl BMPFormatSupportPlugin {

    pub fn new() -> Self {
        BMPFormatSupportPlugin {}
    }
}

impl ImageFormatSupportPlugin for BMPFormatSupportPlugin {

    fn format_name(&self) -> String {
        "BMP".to_string()
    }

    fn loader(&self) -> Option<Box<dyn ImageLoader>> {
        Some(Box::new(BMPReader::new()))
    }

    fn saver(&self) -> Option<Box<dyn ImageSaver>> {
        Some(Box::new(BMPWriter::new()))
    }
}

#[no_mangle]
pub fn _plugin_init() -> Box<dyn ImageFormatSupportPlugin> {
    Box::new(BMPFormatSupportPlugin::new())
}

#[cfg(test)]
mod tests {
    use simage_core::models::pixel::Pixel;
    use simage_core::{ComponentOrder, Image, Simage};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn dispatcher_loads_bmp_as_rgb() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("picture.BMP");

        let mut simage = Simage::empty();
        simage.add_format_plugin(&BMPFormatSupportPlugin::new(), false);

        let mut image = Image::new(3, 2, 3).expect("valid image");
        image.fill(Pixel::from_rgb(1, 2, 3));
        image.set_pixel(2, 1, Pixel::from_rgb(200, 100, 0));
        simage.save(&path, &image, None).expect("failed to save");

        assert!(simage.check_supported(&path));
        let loaded = simage.read_image(&path).expect("failed to read");
        assert_eq!(loaded.component_order(), ComponentOrder::Rgb);
        assert_eq!(loaded.row(0), &[1, 2, 3, 1, 2, 3, 1, 2, 3]);
        assert_eq!(loaded.get_pixel(2, 1), Pixel::from_rgb(200, 100, 0));
    }
}
