use std::convert::TryFrom;
use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::*;

use simage_core::models::image::Image;
use simage_core::models::io::{ImageIOError, ImageSaver};
use simage_core::params::ParamBag;

use crate::reader::{ALPHA_MASK, BLUE_MASK, GREEN_MASK, RED_MASK};

const FILE_HEADER_SIZE: usize = 14;
const INFO_HEADER_SIZE: usize = 40;
const V4_HEADER_SIZE: usize = 108;
// 72 dpi
const PIXELS_PER_METER: i32 = 2835;

/// Writes 24 bit files, or 32 bit files with an alpha mask when the image has 4 components.
#[derive(Default)]
pub struct BMPWriter {
}

impl BMPWriter {

    pub fn new() -> Self {
        BMPWriter {}
    }

    pub fn write(&self, image: &Image) -> Result<Vec<u8>, ImageIOError> {
        let too_large = || ImageIOError::InvalidOptions {
            description: format!("{}x{} is too large for bmp", image.width(), image.height()),
        };
        let width = i32::try_from(image.width()).map_err(|_| too_large())?;
        let height = i32::try_from(image.height()).map_err(|_| too_large())?;

        let alpha = image.components() == 4;
        let (bit_count, dib_size) = if alpha { (32, V4_HEADER_SIZE) } else { (24, INFO_HEADER_SIZE) };
        let bytes_per_pixel = bit_count as usize / 8;
        let stride = (image.width() * bytes_per_pixel + 3) / 4 * 4;
        let offset = FILE_HEADER_SIZE + dib_size;
        let pixel_array_size = stride * image.height();
        let file_size = u32::try_from(offset + pixel_array_size).map_err(|_| too_large())?;

        let mut data = vec![0u8; offset];
        data[0..2].copy_from_slice(b"BM");
        LittleEndian::write_u32(&mut data[2..6], file_size);
        LittleEndian::write_u32(&mut data[10..14], offset as u32);

        let dib = &mut data[FILE_HEADER_SIZE..];
        LittleEndian::write_u32(&mut dib[0..4], dib_size as u32);
        LittleEndian::write_i32(&mut dib[4..8], width);
        // positive height, rows are written bottom to top
        LittleEndian::write_i32(&mut dib[8..12], height);
        LittleEndian::write_u16(&mut dib[12..14], 1);
        LittleEndian::write_u16(&mut dib[14..16], bit_count);
        LittleEndian::write_u32(&mut dib[16..20], if alpha { 3 } else { 0 });
        LittleEndian::write_u32(&mut dib[20..24], pixel_array_size as u32);
        LittleEndian::write_i32(&mut dib[24..28], PIXELS_PER_METER);
        LittleEndian::write_i32(&mut dib[28..32], PIXELS_PER_METER);
        if alpha {
            LittleEndian::write_u32(&mut dib[40..44], RED_MASK);
            LittleEndian::write_u32(&mut dib[44..48], GREEN_MASK);
            LittleEndian::write_u32(&mut dib[48..52], BLUE_MASK);
            LittleEndian::write_u32(&mut dib[52..56], ALPHA_MASK);
            dib[56..60].copy_from_slice(b"BGRs");
        }

        data.reserve(pixel_array_size);
        for y in (0..image.height()).rev() {
            let row_start = data.len();
            for x in 0..image.width() {
                let pixel = image.get_pixel(x, y);
                data.extend_from_slice(&[pixel.blue, pixel.green, pixel.red]);
                if alpha {
                    data.push(pixel.alpha);
                }
            }
            data.resize(row_start + stride, 0);
        }

        Ok(data)
    }
}

impl ImageSaver for BMPWriter {

    fn extensions(&self) -> &str {
        "bmp"
    }

    fn full_name(&self) -> &str {
        "Windows Bitmap"
    }

    fn description(&self) -> &str {
        "Uncompressed 24 and 32 bit bitmaps"
    }

    fn save(&self, filename: &Path, image: &Image, _params: &ParamBag) -> Result<(), ImageIOError> {
        if image.components() < 3 {
            debug!("expanding greyscale image {} to 24 bits", filename.to_string_lossy());
        }

        let data = self.write(image)?;
        fs::write(filename, data).map_err(|err| ImageIOError::FailedToWrite {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })
    }
}

#[cfg(test)]
mod tests {
    use simage_core::models::pixel::Pixel;

    use crate::reader::BMPReader;

    use super::*;

    #[test]
    fn pads_24_bit_rows() {
        let mut image = Image::new(3, 2, 3).expect("valid image");
        image.fill(Pixel::from_rgb(1, 2, 3));
        image.set_pixel(0, 0, Pixel::from_rgb(9, 8, 7));

        let data = BMPWriter::new().write(&image).expect("failed to write");
        assert_eq!(data.len(), 54 + 2 * 12);
        assert_eq!(LittleEndian::read_u32(&data[2..6]) as usize, data.len());

        // the last stored row is the top one
        assert_eq!(&data[54 + 12..54 + 24], &[7, 8, 9, 3, 2, 1, 3, 2, 1, 0, 0, 0]);

        let loaded = BMPReader::new().read(&data).expect("failed to read written file");
        assert_eq!(loaded.get_pixel(0, 0), Pixel::from_rgb(9, 8, 7));
        assert_eq!(loaded.get_pixel(2, 1), Pixel::from_rgb(1, 2, 3));
    }

    #[test]
    fn keeps_alpha_in_32_bit_files() {
        let mut image = Image::new(2, 1, 4).expect("valid image");
        image.set_pixel(0, 0, Pixel::from_rgba(10, 20, 30, 40));
        image.set_pixel(1, 0, Pixel::from_rgba(50, 60, 70, 255));

        let data = BMPWriter::new().write(&image).expect("failed to write");
        assert_eq!(LittleEndian::read_u16(&data[28..30]), 32);

        let loaded = BMPReader::new().read(&data).expect("failed to read written file");
        assert_eq!(loaded.components(), 4);
        assert_eq!(loaded.get_pixel(0, 0), Pixel::from_rgba(10, 20, 30, 40));
        assert_eq!(loaded.get_pixel(1, 0), Pixel::from_rgba(50, 60, 70, 255));
    }

    #[test]
    fn expands_greyscale() {
        let image = Image::from_vec(1, 1, 1, vec![77]).expect("valid image");
        let data = BMPWriter::new().write(&image).expect("failed to write");

        assert_eq!(&data[54..58], &[77, 77, 77, 0]);
    }
}
