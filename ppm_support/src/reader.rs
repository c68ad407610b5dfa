use std::convert::TryFrom;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use custom_error::custom_error;
use log::*;

use simage_core::models::image::{payload_len, Image};
use simage_core::models::io::{ImageIOError, ImageLoader, ScanlineReader};

custom_error! {pub PPMReaderError
    InvalidHeader {description: String} = "Invalid header: {description}",
    UnexpectedEnd {description: String} = "Unexpected end of data: {description}",
    InvalidValue {description: String} = "Invalid value: {description}"
}

// first read when looking for the header of a file opened line by line, doubled until it fits
const HEADER_CHUNK: u64 = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Ascii,
    Binary,
}

#[derive(Debug)]
struct Header {
    magic_number: u8,
    width: usize,
    height: usize,
    max_color_value: usize,
}

impl Header {

    fn encoding(&self) -> Encoding {
        match self.magic_number {
            b'2' | b'3' => Encoding::Ascii,
            _ => Encoding::Binary,
        }
    }

    fn components(&self) -> usize {
        match self.magic_number {
            b'2' | b'5' => 1,
            _ => 3,
        }
    }

    fn bytes_per_sample(&self) -> usize {
        if self.max_color_value < 256 { 1 } else { 2 }
    }

    fn payload_len(&self) -> Result<usize, PPMReaderError> {
        payload_len(self.width, self.height, self.components(), 1).map_err(|err| PPMReaderError::InvalidHeader {
            description: err.to_string(),
        })
    }

    /// Smallest raster that can hold every sample. Plain samples take a digit and a separator.
    fn min_raster_len(&self) -> Result<usize, PPMReaderError> {
        let samples = self.payload_len()?;
        let len = match self.encoding() {
            Encoding::Ascii => samples.checked_mul(2).map(|v| v - 1),
            Encoding::Binary => samples.checked_mul(self.bytes_per_sample()),
        };
        len.ok_or_else(|| PPMReaderError::InvalidHeader {
            description: format!("image is too large: {}x{}", self.width, self.height),
        })
    }
}

fn check_raster_len(header: &Header, available: usize) -> Result<(), PPMReaderError> {
    let expected = header.min_raster_len()?;
    if available < expected {
        return Err(PPMReaderError::UnexpectedEnd {
            description: format!("raster has {} bytes, expected at least {}", available, expected),
        });
    }
    Ok(())
}

trait RasterReader {
    /// Decodes `out.len()` samples from `data`, scaled to 0..=255.
    fn read_raster(&self, header: &Header, data: &[u8], out: &mut [u8]) -> Result<(), PPMReaderError>;
}

struct AsciiRasterReader {
}

impl RasterReader for AsciiRasterReader {
    fn read_raster(&self, header: &Header, data: &[u8], out: &mut [u8]) -> Result<(), PPMReaderError> {
        let mut position = 0;
        for sample in out.iter_mut() {
            let (value, next) = read_number(data, position, "sample")?;
            *sample = normalize(value, header.max_color_value)?;
            position = next;
        }
        Ok(())
    }
}

struct BinaryRasterReader {
}

impl RasterReader for BinaryRasterReader {
    fn read_raster(&self, header: &Header, data: &[u8], out: &mut [u8]) -> Result<(), PPMReaderError> {
        let bytes_per_sample = header.bytes_per_sample();
        let expected = out.len() * bytes_per_sample;
        if data.len() < expected {
            return Err(PPMReaderError::UnexpectedEnd {
                description: format!("raster has {} bytes, expected {}", data.len(), expected),
            });
        }

        for (sample, bytes) in out.iter_mut().zip(data.chunks_exact(bytes_per_sample)) {
            let value = match bytes {
                [value] => *value as usize,
                [high, low] => (*high as usize) << 8 | *low as usize,
                _ => 0,
            };
            *sample = normalize(value, header.max_color_value)?;
        }
        Ok(())
    }
}

fn get_raster_reader(encoding: Encoding) -> Box<dyn RasterReader> {
    match encoding {
        Encoding::Ascii => Box::new(AsciiRasterReader {}),
        Encoding::Binary => Box::new(BinaryRasterReader {}),
    }
}

fn normalize(value: usize, max_color_value: usize) -> Result<u8, PPMReaderError> {
    if value > max_color_value {
        return Err(PPMReaderError::InvalidValue {
            description: format!("sample {} exceeds maximum color value {}", value, max_color_value),
        });
    }
    Ok(((value * 255 + max_color_value / 2) / max_color_value) as u8)
}

fn is_whitespace(char: u8) -> bool {
    // 9 - TAB; 10 - LF; 11 - VT; 12 - FF; 13 - CR; 32 - SPACE;
    matches!(char, 9..=13 | 32)
}

/// Skips whitespace and `#` comments running to the end of the line.
fn skip_whitespaces(data: &[u8], mut position: usize) -> usize {
    while position < data.len() {
        if is_whitespace(data[position]) {
            position += 1;
        } else if data[position] == b'#' {
            while position < data.len() && data[position] != b'\n' {
                position += 1;
            }
        } else {
            break;
        }
    }
    position
}

fn read_number(data: &[u8], position: usize, what: &str) -> Result<(usize, usize), PPMReaderError> {
    let start = skip_whitespaces(data, position);
    let mut end = start;
    while end < data.len() && data[end].is_ascii_digit() {
        end += 1;
    }

    if start >= data.len() {
        return Err(PPMReaderError::UnexpectedEnd {
            description: format!("expected {}", what),
        });
    }
    if end == start {
        return Err(PPMReaderError::InvalidValue {
            description: format!("expected {}, found {:?}", what, data[start] as char),
        });
    }

    let value = std::str::from_utf8(&data[start..end]).ok()
        .and_then(|v| v.parse::<usize>().ok())
        .ok_or_else(|| PPMReaderError::InvalidValue {
            description: format!("{} is too large", what),
        })?;
    Ok((value, end))
}

fn is_magic_number(data: &[u8]) -> bool {
    match data {
        [b'P', b'2' | b'3' | b'5' | b'6'] => true,
        [b'P', b'2' | b'3' | b'5' | b'6', next, ..] => is_whitespace(*next) || *next == b'#',
        _ => false,
    }
}

/// Parses the header and returns it with the offset of the first raster byte.
fn read_header(data: &[u8]) -> Result<(Header, usize), PPMReaderError> {
    if data.len() < 2 {
        return Err(PPMReaderError::UnexpectedEnd {
            description: "expected magic number".to_string(),
        });
    }
    if !is_magic_number(data) {
        return Err(PPMReaderError::InvalidHeader {
            description: format!("unsupported magic number {:?}", String::from_utf8_lossy(&data[..2])),
        });
    }

    let (width, position) = read_number(data, 2, "width")?;
    let (height, position) = read_number(data, position, "height")?;
    let (max_color_value, position) = read_number(data, position, "maximum color value")?;

    if width == 0 || height == 0 {
        return Err(PPMReaderError::InvalidHeader {
            description: format!("empty image: {}x{}", width, height),
        });
    }
    if max_color_value == 0 || max_color_value > 65535 {
        return Err(PPMReaderError::InvalidHeader {
            description: format!("maximum color value {} is out of range", max_color_value),
        });
    }

    // exactly one whitespace byte separates the header from the raster
    match data.get(position) {
        Some(v) if is_whitespace(*v) => {},
        Some(_) => return Err(PPMReaderError::InvalidHeader {
            description: "no whitespace after maximum color value".to_string(),
        }),
        None => return Err(PPMReaderError::UnexpectedEnd {
            description: "expected raster".to_string(),
        }),
    }

    Ok((Header {
        magic_number: data[1],
        width,
        height,
        max_color_value,
    }, position + 1))
}

fn read_file_header(file: &mut File) -> Result<(Header, usize), ImageIOError> {
    let mut prefix = Vec::new();
    let mut limit = HEADER_CHUNK;

    loop {
        prefix.clear();
        file.seek(SeekFrom::Start(0)).map_err(read_error)?;
        file.by_ref().take(limit).read_to_end(&mut prefix).map_err(read_error)?;

        match read_header(&prefix) {
            Err(PPMReaderError::UnexpectedEnd { .. }) if prefix.len() as u64 == limit => limit *= 2,
            result => return result.map_err(|err| ImageIOError::FailedToRead {
                description: format!("failed to read ppm header: {}", err),
            }),
        }
    }
}

fn read_error(err: std::io::Error) -> ImageIOError {
    ImageIOError::FailedToRead {
        description: err.to_string(),
    }
}

/// Loader for the netpbm family: P2/P5 greymaps and P3/P6 pixmaps, with 8 or 16 bit samples.
#[derive(Default)]
pub struct PPMReader {
}

impl PPMReader {

    pub fn new() -> Self {
        PPMReader {}
    }

    /// Decodes a complete file held in memory.
    pub fn read(&self, data: &[u8]) -> Result<Image<'static>, PPMReaderError> {
        let (header, offset) = read_header(data)?;
        check_raster_len(&header, data.len() - offset)?;
        let mut pixels = vec![0; header.payload_len()?];
        get_raster_reader(header.encoding()).read_raster(&header, &data[offset..], &mut pixels)?;

        Image::from_vec(header.width, header.height, header.components(), pixels)
            .map_err(|err| PPMReaderError::InvalidHeader {
                description: err.to_string(),
            })
    }
}

impl ImageLoader for PPMReader {

    fn name(&self) -> &str {
        "PPM"
    }

    fn identify(&self, _filename: &Path, header: &[u8]) -> bool {
        is_magic_number(header)
    }

    fn load(&self, filename: &Path) -> Result<Image<'static>, ImageIOError> {
        let data = fs::read(filename).map_err(|err| ImageIOError::FailedToOpen {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })?;

        self.read(&data).map_err(|err| ImageIOError::FailedToRead {
            description: format!("failed to read as ppm: {}", err),
        })
    }

    fn open_scanlines(&self, filename: &Path) -> Result<Box<dyn ScanlineReader>, ImageIOError> {
        let mut file = File::open(filename).map_err(|err| ImageIOError::FailedToOpen {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })?;

        let (header, offset) = read_file_header(&mut file)?;
        if header.encoding() == Encoding::Ascii {
            return Err(ImageIOError::unsupported("line-by-line reading of plain ppm"));
        }

        let invalid_header = |description: String| ImageIOError::FailedToRead { description };
        let file_len = file.metadata().map_err(read_error)?.len();
        let available = usize::try_from(file_len.saturating_sub(offset as u64)).unwrap_or(usize::MAX);
        check_raster_len(&header, available).map_err(|err| invalid_header(err.to_string()))?;
        let row_bytes = (header.width * header.components()).checked_mul(header.bytes_per_sample())
            .ok_or_else(|| invalid_header("row is too large".to_string()))?;

        debug!("reading {}x{} ppm line by line", header.width, header.height);
        Ok(Box::new(PPMScanlineReader {
            file,
            header,
            raster_offset: offset as u64,
            row: vec![0; row_bytes],
        }))
    }
}

struct PPMScanlineReader {
    file: File,
    header: Header,
    raster_offset: u64,
    row: Vec<u8>,
}

impl ScanlineReader for PPMScanlineReader {

    fn width(&self) -> usize {
        self.header.width
    }

    fn height(&self) -> usize {
        self.header.height
    }

    fn components(&self) -> usize {
        self.header.components()
    }

    fn read_line(&mut self, line: usize, buf: &mut [u8]) -> Result<(), ImageIOError> {
        let len = self.header.width * self.header.components();
        if line >= self.header.height || buf.len() < len {
            return Err(ImageIOError::InvalidOptions {
                description: format!("cannot read line {} into {} bytes", line, buf.len()),
            });
        }

        let position = self.raster_offset + (line as u64) * (self.row.len() as u64);
        self.file.seek(SeekFrom::Start(position)).map_err(read_error)?;
        self.file.read_exact(&mut self.row).map_err(read_error)?;

        BinaryRasterReader {}.read_raster(&self.header, &self.row, &mut buf[..len])
            .map_err(|err| ImageIOError::FailedToRead {
                description: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::fs::read;

    use simage_core::models::pixel::Pixel;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn simple_test() {
        let simple_ppm = read("assets/simple.ppm")
            .expect("Failed to load assets/simple.ppm");
        let reader = PPMReader::new();
        let image = reader.read(&simple_ppm).expect("Failed to read the image");

        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 4);
        assert_eq!(image.components(), 3);
        assert_eq!(image.get_pixel(0, 0), Pixel::white());
        assert_eq!(image.get_pixel(1, 1), Pixel::from_rgb(3, 155, 229));
        assert_eq!(image.get_pixel(2, 2), Pixel::from_rgb(221, 47, 47));
        assert_eq!(image.get_pixel(3, 3), Pixel::black());
    }

    #[test]
    fn reads_binary_pixmap() {
        let mut data = b"P6\n2 1\n255\n".to_vec();
        data.extend_from_slice(&[10, 20, 30, 40, 50, 60]);

        let image = PPMReader::new().read(&data).expect("Failed to read the image");
        assert_eq!(image.data(), &[10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn scales_samples_to_eight_bits() {
        let grey = PPMReader::new().read(b"P2\n# comment\n3 # width\n1\n15\n0 15 7\n")
            .expect("Failed to read the image");
        assert_eq!(grey.components(), 1);
        assert_eq!(grey.data(), &[0, 255, 119]);

        let mut data = b"P5 2 1 65535\n".to_vec();
        data.extend_from_slice(&[0xff, 0xff, 0x80, 0x00]);
        let deep = PPMReader::new().read(&data).expect("Failed to read the image");
        assert_eq!(deep.data(), &[255, 128]);
    }

    #[test]
    fn rejects_malformed_files() {
        let reader = PPMReader::new();

        assert!(matches!(reader.read(b"P7\n1 1\n255\n"), Err(PPMReaderError::InvalidHeader { .. })));
        assert!(matches!(reader.read(b"P6\n0 1\n255\n"), Err(PPMReaderError::InvalidHeader { .. })));
        assert!(matches!(reader.read(b"P6\n2 2\n255\n\x01\x02"), Err(PPMReaderError::UnexpectedEnd { .. })));
        assert!(matches!(reader.read(b"P3\n1 1\n100\n1 2 300\n"), Err(PPMReaderError::InvalidValue { .. })));
        assert!(matches!(reader.read(b"P3\n1 1\n255\n1 x 3\n"), Err(PPMReaderError::InvalidValue { .. })));
        assert!(matches!(reader.read(b"P"), Err(PPMReaderError::UnexpectedEnd { .. })));
    }

    #[test]
    fn rejects_dimensions_larger_than_the_file() {
        let reader = PPMReader::new();

        assert!(matches!(reader.read(b"P6\n1000000 1000000 255\n\0\0\0"), Err(PPMReaderError::UnexpectedEnd { .. })));
        assert!(matches!(reader.read(b"P3\n1000000 1000000 255\n1 2 3\n"), Err(PPMReaderError::UnexpectedEnd { .. })));
        assert!(matches!(reader.read(b"P5\n2 1 65535\n\0\0\0"), Err(PPMReaderError::UnexpectedEnd { .. })));
    }

    #[test]
    fn does_not_open_truncated_file_line_by_line() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("huge.ppm");
        fs::write(&path, b"P6\n1000000000 1 255\n\0\0\0").expect("failed to write test file");

        match PPMReader::new().open_scanlines(&path) {
            Err(ImageIOError::FailedToRead { .. }) => {},
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("truncated ppm should not open"),
        }
    }

    #[test]
    fn identifies_netpbm_headers() {
        let reader = PPMReader::new();
        let path = Path::new("image");

        assert!(reader.identify(path, b"P6\n640 480\n255\n"));
        assert!(reader.identify(path, b"P2#comment"));
        assert!(!reader.identify(path, b"P4\n1 1\n"));
        assert!(!reader.identify(path, b"PNG"));
        assert!(!reader.identify(path, b"P"));
    }

    #[test]
    fn reads_binary_file_line_by_line() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("lines.ppm");
        let mut data = format!("P6\n#{}\n2 3\n255\n", "x".repeat(1000)).into_bytes();
        data.extend((0..18).map(|v| v as u8));
        fs::write(&path, &data).expect("failed to write test file");

        let mut lines = PPMReader::new().open_scanlines(&path).expect("binary ppm reads line by line");
        assert_eq!((lines.width(), lines.height(), lines.components()), (2, 3, 3));

        let mut buf = [0u8; 6];
        lines.read_line(2, &mut buf).expect("failed to read line");
        assert_eq!(buf, [12, 13, 14, 15, 16, 17]);
        lines.read_line(0, &mut buf).expect("failed to read line");
        assert_eq!(buf, [0, 1, 2, 3, 4, 5]);
        assert!(lines.read_line(3, &mut buf).is_err());
    }

    #[test]
    fn plain_file_is_not_read_line_by_line() {
        let reader = PPMReader::new();
        match reader.open_scanlines(Path::new("assets/simple.ppm")) {
            Err(ImageIOError::Unsupported { .. }) => {},
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("plain ppm should not be read line by line"),
        }
    }
}
