use std::fs;
use std::path::Path;

use log::*;

use simage_core::models::image::Image;
use simage_core::models::io::{ImageIOError, ImageSaver};
use simage_core::params::ParamBag;

/// Boolean saver parameter: write plain (P2/P3) instead of raw (P5/P6) files.
pub const ASCII_PARAM: &str = "ascii";

// plain files keep lines below 70 characters
const SAMPLES_PER_LINE: usize = 12;

#[derive(Default)]
pub struct PPMWriter {
}

impl PPMWriter {

    pub fn new() -> Self {
        PPMWriter {}
    }

    /// Encodes `image` as a greymap for 1 and 2 components and a pixmap otherwise.
    /// Alpha is dropped since the format has no place for it.
    pub fn write(&self, image: &Image, ascii: bool) -> Vec<u8> {
        let grey = image.components() < 3;
        let magic_number = match (grey, ascii) {
            (true, true) => "P2",
            (true, false) => "P5",
            (false, true) => "P3",
            (false, false) => "P6",
        };

        let mut samples = Vec::with_capacity(image.width() * image.height() * if grey { 1 } else { 3 });
        for y in 0..image.height() {
            for x in 0..image.width() {
                let pixel = image.get_pixel(x, y);
                if grey {
                    samples.push(pixel.red);
                } else {
                    samples.extend_from_slice(&[pixel.red, pixel.green, pixel.blue]);
                }
            }
        }

        let mut bytes = Vec::new();
        bytes.extend_from_slice(format!("{}\n{} {}\n255\n", magic_number, image.width(), image.height()).as_bytes());
        if ascii {
            for line in samples.chunks(SAMPLES_PER_LINE) {
                let line: Vec<String> = line.iter().map(|v| v.to_string()).collect();
                bytes.extend_from_slice(line.join(" ").as_bytes());
                bytes.push(b'\n');
            }
        } else {
            bytes.extend_from_slice(&samples);
        }
        bytes
    }
}

impl ImageSaver for PPMWriter {

    fn extensions(&self) -> &str {
        "ppm,pgm,pnm"
    }

    fn full_name(&self) -> &str {
        "Portable Pixmap"
    }

    fn description(&self) -> &str {
        "Netpbm greymaps and pixmaps, raw by default or plain with the \"ascii\" parameter"
    }

    fn save(&self, filename: &Path, image: &Image, params: &ParamBag) -> Result<(), ImageIOError> {
        if image.components() == 2 || image.components() == 4 {
            debug!("dropping alpha channel while saving {}", filename.to_string_lossy());
        }

        let bytes = self.write(image, params.get_bool_or(ASCII_PARAM, false));
        fs::write(filename, bytes).map_err(|err| ImageIOError::FailedToWrite {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })
    }
}

#[cfg(test)]
mod tests {
    use simage_core::models::image::ComponentOrder;
    use simage_core::models::pixel::Pixel;
    use tempfile::TempDir;

    use crate::reader::PPMReader;

    use super::*;

    #[test]
    fn writes_raw_pixmap() {
        let image = Image::from_vec(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).expect("valid image");
        let bytes = PPMWriter::new().write(&image, false);

        assert_eq!(bytes, b"P6\n2 1\n255\n\x01\x02\x03\x04\x05\x06".to_vec());
    }

    #[test]
    fn writes_plain_greymap_without_alpha() {
        let image = Image::from_vec(2, 1, 2, vec![10, 255, 20, 0]).expect("valid image");
        let bytes = PPMWriter::new().write(&image, true);

        assert_eq!(String::from_utf8_lossy(&bytes), "P2\n2 1\n255\n10 20\n");
    }

    #[test]
    fn follows_component_order() {
        let mut image = Image::from_vec(1, 1, 3, vec![30, 20, 10]).expect("valid image");
        image.set_component_order(ComponentOrder::Bgr);
        let bytes = PPMWriter::new().write(&image, false);

        assert_eq!(&bytes[bytes.len() - 3..], &[10, 20, 30]);
    }

    #[test]
    fn saved_file_reads_back() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("out.ppm");
        let mut image = Image::new(5, 3, 4).expect("valid image");
        image.fill(Pixel::from_rgba(200, 100, 50, 7));
        image.set_pixel(4, 2, Pixel::from_rgba(1, 2, 3, 4));

        let params = ParamBag::new().with(ASCII_PARAM, true);
        PPMWriter::new().save(&path, &image, &params).expect("failed to save");

        let data = fs::read(&path).expect("failed to read saved file");
        assert!(data.starts_with(b"P3\n"));
        let loaded = PPMReader::new().read(&data).expect("failed to decode saved file");
        assert_eq!((loaded.width(), loaded.height(), loaded.components()), (5, 3, 3));
        assert_eq!(loaded.get_pixel(0, 0), Pixel::from_rgb(200, 100, 50));
        assert_eq!(loaded.get_pixel(4, 2), Pixel::from_rgb(1, 2, 3));
    }
}
