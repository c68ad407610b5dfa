use std::convert::TryInto;
use std::fs;
use std::path::Path;

use custom_error::custom_error;
use byteorder::{ByteOrder, LittleEndian};

use simage_core::models::image::{ComponentOrder, Image};
use simage_core::models::io::{ImageIOError, ImageLoader};

custom_error! {pub BMPReaderError
    InvalidHeader {description: String} = "Invalid header: {description}",
    InvalidDIBHeader {description: String} = "Invalid DIB header: {description}",
    NotImplemented {description: String} = "Not implemented: {description}",
    UnexpectedEnd {description: String} = "Unexpected end of data: {description}"
}

pub(crate) const RED_MASK: u32 = 0x00ff_0000;
pub(crate) const GREEN_MASK: u32 = 0x0000_ff00;
pub(crate) const BLUE_MASK: u32 = 0x0000_00ff;
pub(crate) const ALPHA_MASK: u32 = 0xff00_0000;

#[derive(Default)]
pub struct BMPReader {
}

struct Header {
    offset: u32,
}

struct DIBHeader {
    width: i32,
    height: i32,
    bit_count: u16,
    alpha: bool,
}

enum Compression {
    Uncompressed,
    Bitfields,
}

impl BMPReader {

    pub fn new() -> Self {
        BMPReader {}
    }

    /// Decodes a complete file held in memory. The image keeps the file's BGR order.
    pub fn read(&self, data: &[u8]) -> Result<Image<'static>, BMPReaderError> {
        let header_bytes: &[u8; 14] = data.get(0..14)
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| BMPReaderError::UnexpectedEnd {
                description: "expected to get 14 bytes for header".to_string(),
            })?;
        let header = read_header(header_bytes)?;
        let dib_header = read_dib_header(&data[14..])?;

        let pixels = data.get(header.offset as usize..).ok_or_else(|| BMPReaderError::InvalidHeader {
            description: format!("pixel array offset {} is past the end of the file", header.offset),
        })?;
        read_pixel_array(pixels, &dib_header)
    }
}

impl ImageLoader for BMPReader {

    fn name(&self) -> &str {
        "BMP"
    }

    fn identify(&self, _filename: &Path, header: &[u8]) -> bool {
        header.starts_with(b"BM")
    }

    fn load(&self, filename: &Path) -> Result<Image<'static>, ImageIOError> {
        let data = fs::read(filename).map_err(|err| ImageIOError::FailedToOpen {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })?;

        self.read(&data).map_err(|err| ImageIOError::FailedToRead {
            description: format!("failed to read as bmp: {}", err),
        })
    }
}

fn read_header(header: &[u8; 14]) -> Result<Header, BMPReaderError> {
    // 0 - 2 bytes - header - "BM"
    if header[0] != 0x42 || header[1] != 0x4D {
        return Err(BMPReaderError::InvalidHeader {
            description: "file does not start with 0x42 0x4D".to_string()
        });
    }

    // 2 - 4 bytes - size of BMP file in bytes
    // 6 - 2 bytes - reserved
    // 8 - 2 bytes - reserved
    // 10 - 4 bytes - offset of the byte where the bitmap image data (pixel array) can be found.
    let offset = LittleEndian::read_u32(&header[10..14]);

    Ok(Header {
        offset
    })
}

fn read_dib_header(header: &[u8]) -> Result<DIBHeader, BMPReaderError> {
    if header.len() < 40 {
        return Err(BMPReaderError::UnexpectedEnd {
            description: "DIB header is truncated".to_string(),
        });
    }

    // 0 - 4 bytes - size of this header
    let size_of_header = LittleEndian::read_u32(&header[0..4]);
    if !matches!(size_of_header, 40 | 108 | 124) {
        return Err(BMPReaderError::InvalidDIBHeader {
            description: format!("Unexpected length of DIB header: {}", size_of_header),
        });
    }

    if header.len() < size_of_header as usize {
        return Err(BMPReaderError::UnexpectedEnd {
            description: "DIB header is truncated".to_string(),
        });
    }

    let width = LittleEndian::read_i32(&header[4..8]);
    // negative height means rows are stored top to bottom
    let height = LittleEndian::read_i32(&header[8..12]);
    if width <= 0 || height == 0 {
        return Err(BMPReaderError::InvalidDIBHeader {
            description: format!("invalid dimensions {}x{}", width, height),
        });
    }

    let _planes = LittleEndian::read_u16(&header[12..14]);
    let bit_count = LittleEndian::read_u16(&header[14..16]);

    let compression = LittleEndian::read_u32(&header[16..20]);
    let compression = match compression {
        0x0000 => Compression::Uncompressed,
        0x0001 => return Err(BMPReaderError::NotImplemented {
            description: "RLE8".to_string(),
        }),
        0x0002 => return Err(BMPReaderError::NotImplemented {
            description: "RLE4".to_string(),
        }),
        0x0003 => Compression::Bitfields,
        0x0004 => return Err(BMPReaderError::NotImplemented {
            description: "JPEG".to_string(),
        }),
        0x0005 => return Err(BMPReaderError::NotImplemented {
            description: "PNG".to_string(),
        }),
        0x0006 => return Err(BMPReaderError::NotImplemented {
            description: "alpha bitfields".to_string(),
        }),
        0x000B..=0x000D => return Err(BMPReaderError::NotImplemented {
            description: "CMYK".to_string(),
        }),
        compression => return Err(BMPReaderError::InvalidDIBHeader {
            description: format!("unknown compression type: {}", compression),
        })
    };

    let alpha = match (bit_count, compression) {
        (24, Compression::Uncompressed) | (32, Compression::Uncompressed) => false,
        (32, Compression::Bitfields) => {
            // the masks follow a 40 byte header and are part of the larger ones
            if header.len() < 52 {
                return Err(BMPReaderError::UnexpectedEnd {
                    description: "bitfield masks are missing".to_string(),
                });
            }
            let masks = [
                LittleEndian::read_u32(&header[40..44]),
                LittleEndian::read_u32(&header[44..48]),
                LittleEndian::read_u32(&header[48..52]),
            ];
            if masks != [RED_MASK, GREEN_MASK, BLUE_MASK] {
                return Err(BMPReaderError::NotImplemented {
                    description: format!("bitfield masks {:08x?}", masks),
                });
            }
            size_of_header >= 108 && LittleEndian::read_u32(&header[52..56]) == ALPHA_MASK
        },
        (bit_count, _) => return Err(BMPReaderError::NotImplemented {
            description: format!("this image uses {} bits", bit_count),
        }),
    };

    Ok(DIBHeader {
        width,
        height,
        bit_count,
        alpha,
    })
}

fn read_pixel_array(data: &[u8], header: &DIBHeader) -> Result<Image<'static>, BMPReaderError> {
    let width = header.width as usize;
    let height = header.height.unsigned_abs() as usize;
    let bytes_per_pixel = header.bit_count as usize / 8;
    let components = if header.alpha { 4 } else { 3 };

    // rows are padded to a multiple of 4 bytes
    let stride = (width * bytes_per_pixel + 3) / 4 * 4;
    let expected = stride.checked_mul(height).ok_or_else(|| BMPReaderError::InvalidDIBHeader {
        description: "image is too large".to_string(),
    })?;
    if data.len() < expected {
        return Err(BMPReaderError::UnexpectedEnd {
            description: format!("pixel array has {} bytes, expected {}", data.len(), expected),
        });
    }

    let mut image = Image::new(width, height, components).map_err(|err| BMPReaderError::InvalidDIBHeader {
        description: err.to_string(),
    })?;
    image.set_component_order(ComponentOrder::Bgr);

    for (row, source) in data.chunks_exact(stride).take(height).enumerate() {
        let y = if header.height > 0 { height - 1 - row } else { row };
        let target = image.row_mut(y);
        for (pixel, bytes) in target.chunks_exact_mut(components).zip(source.chunks_exact(bytes_per_pixel)) {
            pixel.copy_from_slice(&bytes[..components]);
        }
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use simage_core::models::pixel::Pixel;

    use super::*;

    fn bitmap(width: i32, height: i32, bit_count: u16, compression: u32, pixels: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 54];
        data[0..2].copy_from_slice(b"BM");
        LittleEndian::write_u32(&mut data[2..6], (54 + pixels.len()) as u32);
        LittleEndian::write_u32(&mut data[10..14], 54);
        LittleEndian::write_u32(&mut data[14..18], 40);
        LittleEndian::write_i32(&mut data[18..22], width);
        LittleEndian::write_i32(&mut data[22..26], height);
        LittleEndian::write_u16(&mut data[26..28], 1);
        LittleEndian::write_u16(&mut data[28..30], bit_count);
        LittleEndian::write_u32(&mut data[30..34], compression);
        data.extend_from_slice(pixels);
        data
    }

    // 2x2, 24 bits, two padding bytes per row
    const PIXELS: &[u8] = &[
        0, 0, 255,    0, 255, 0,      0, 0,
        255, 0, 0,    255, 255, 255,  0, 0,
    ];

    #[test]
    fn reads_bottom_up_rows() {
        let image = BMPReader::new().read(&bitmap(2, 2, 24, 0, PIXELS)).expect("failed to read test image");

        assert_eq!((image.width(), image.height(), image.components()), (2, 2, 3));
        assert_eq!(image.component_order(), ComponentOrder::Bgr);
        assert_eq!(image.get_pixel(0, 1), Pixel::from_rgb(255, 0, 0));
        assert_eq!(image.get_pixel(1, 1), Pixel::from_rgb(0, 255, 0));
        assert_eq!(image.get_pixel(0, 0), Pixel::from_rgb(0, 0, 255));
        assert_eq!(image.get_pixel(1, 0), Pixel::white());
    }

    #[test]
    fn reads_top_down_rows() {
        let image = BMPReader::new().read(&bitmap(2, -2, 24, 0, PIXELS)).expect("failed to read test image");

        assert_eq!(image.get_pixel(0, 0), Pixel::from_rgb(255, 0, 0));
        assert_eq!(image.get_pixel(1, 1), Pixel::white());
    }

    #[test]
    fn drops_unused_byte_of_32_bit_pixels() {
        let image = BMPReader::new().read(&bitmap(1, 1, 32, 0, &[10, 20, 30, 0])).expect("failed to read test image");

        assert_eq!(image.components(), 3);
        assert_eq!(image.get_pixel(0, 0), Pixel::from_rgb(30, 20, 10));
    }

    #[test]
    fn rejects_unsupported_files() {
        let reader = BMPReader::new();

        assert!(matches!(reader.read(&bitmap(2, 2, 24, 1, PIXELS)), Err(BMPReaderError::NotImplemented { .. })));
        assert!(matches!(reader.read(&bitmap(2, 2, 8, 0, PIXELS)), Err(BMPReaderError::NotImplemented { .. })));
        assert!(matches!(reader.read(&bitmap(2, 2, 24, 0, &PIXELS[..10])), Err(BMPReaderError::UnexpectedEnd { .. })));
        assert!(matches!(reader.read(&bitmap(0, 2, 24, 0, PIXELS)), Err(BMPReaderError::InvalidDIBHeader { .. })));
        assert!(matches!(reader.read(b"BM"), Err(BMPReaderError::UnexpectedEnd { .. })));

        let mut not_bmp = bitmap(2, 2, 24, 0, PIXELS);
        not_bmp[0] = b'X';
        assert!(matches!(reader.read(&not_bmp), Err(BMPReaderError::InvalidHeader { .. })));
        assert!(!reader.identify(Path::new("image.bmp"), &not_bmp));
    }
}
