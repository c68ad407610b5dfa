extern crate custom_error;

use simage_core::models::io::{ImageLoader, ImageSaver};
use simage_core::plugins::ImageFormatSupportPlugin;

use reader::PPMReader;
use writer::PPMWriter;

pub mod reader;
pub mod writer;

#[derive(Default)]
pub struct PPMFormatSupportPlugin {
}

impl PPMFormatSupportPlugin {

    pub fn new() -> Self {
        PPMFormatSupportPlugin {}
    }
}

impl ImageFormatSupportPlugin for PPMFormatSupportPlugin {

    fn format_name(&self) -> String {
        "PPM".to_string()
    }

    fn loader(&self) -> Option<Box<dyn ImageLoader>> {
        Some(Box::new(PPMReader::new()))
    }

    fn saver(&self) -> Option<Box<dyn ImageSaver>> {
        Some(Box::new(PPMWriter::new()))
    }
}

#[no_mangle]
pub fn _plugin_init() -> Box<dyn ImageFormatSupportPlugin> {
    Box::new(PPMFormatSupportPlugin::new())
}
