//! Uncompressed frame container.
//!
//! Layout: the magic `SIMGRAW\0`, then width, height and components as little-endian u32,
//! then every frame as `width * height * components` bytes in RGB order, rows top to bottom.

use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::models::image::{payload_len, ComponentOrder, Image};
use crate::models::io::ImageIOError;
use crate::params::ParamBag;

use super::{MovieExporter, MovieImporter, MovieSink, MovieSource};

pub const RAW_MOVIE_MIME_TYPE: &str = "video/x-simage-raw";

const MAGIC: &[u8; 8] = b"SIMGRAW\0";
// magic followed by three u32 fields
const HEADER_LEN: u64 = 20;

pub struct RawMovieImporter;

impl MovieImporter for RawMovieImporter {

    fn mime_type(&self) -> &str {
        RAW_MOVIE_MIME_TYPE
    }

    fn open(&self, filename: &Path) -> Result<Box<dyn MovieSource>, ImageIOError> {
        let file = File::open(filename).map_err(|err| ImageIOError::FailedToOpen {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })?;
        let file_len = file.metadata().map_err(read_error)?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).map_err(read_error)?;
        if &magic != MAGIC {
            return Err(ImageIOError::FailedToRead {
                description: "not a raw movie".to_string(),
            });
        }

        let width = reader.read_u32::<LittleEndian>().map_err(read_error)? as usize;
        let height = reader.read_u32::<LittleEndian>().map_err(read_error)? as usize;
        let components = reader.read_u32::<LittleEndian>().map_err(read_error)? as usize;
        let frame_len = payload_len(width, height, components, 1).map_err(|err| ImageIOError::FailedToRead {
            description: err.to_string(),
        })?;
        let frames_len = file_len.saturating_sub(HEADER_LEN);
        if frames_len > 0 && frames_len < frame_len as u64 {
            return Err(ImageIOError::FailedToRead {
                description: format!("{}x{}x{} frames do not fit in {} bytes", width, height, components, file_len),
            });
        }

        Ok(Box::new(RawMovieReader {
            reader,
            width,
            height,
            components,
            frame_len,
        }))
    }
}

struct RawMovieReader {
    reader: BufReader<File>,
    width: usize,
    height: usize,
    components: usize,
    frame_len: usize,
}

impl MovieSource for RawMovieReader {

    fn get_image(&mut self, _params: Option<&ParamBag>) -> Result<Option<Image<'static>>, ImageIOError> {
        // grows with what the file actually holds
        let mut frame = Vec::new();
        self.reader.by_ref().take(self.frame_len as u64).read_to_end(&mut frame).map_err(read_error)?;

        if frame.is_empty() {
            return Ok(None);
        }
        if frame.len() < self.frame_len {
            return Err(ImageIOError::FailedToRead {
                description: format!("truncated frame: {} of {} bytes", frame.len(), self.frame_len),
            });
        }

        Image::from_vec(self.width, self.height, self.components, frame)
            .map(Some)
            .map_err(|err| ImageIOError::FailedToRead { description: err.to_string() })
    }
}

pub struct RawMovieExporter;

impl MovieExporter for RawMovieExporter {

    fn mime_type(&self) -> &str {
        RAW_MOVIE_MIME_TYPE
    }

    fn create(&self, filename: &Path, params: &mut ParamBag) -> Result<Box<dyn MovieSink>, ImageIOError> {
        let width = required_dimension(params, "width")?;
        let height = required_dimension(params, "height")?;
        let components = usize::try_from(params.get_int_or("components", 3)).unwrap_or(0);
        payload_len(width, height, components, 1).map_err(|err| ImageIOError::InvalidOptions {
            description: err.to_string(),
        })?;

        let file = File::create(filename).map_err(|err| ImageIOError::FailedToOpen {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC).map_err(write_error)?;
        for value in [width, height, components] {
            writer.write_u32::<LittleEndian>(value as u32).map_err(write_error)?;
        }

        Ok(Box::new(RawMovieWriter {
            writer,
            width,
            height,
            components,
        }))
    }
}

struct RawMovieWriter {
    writer: BufWriter<File>,
    width: usize,
    height: usize,
    components: usize,
}

impl MovieSink for RawMovieWriter {

    fn put_image(&mut self, image: &Image, _params: Option<&ParamBag>) -> Result<(), ImageIOError> {
        if image.layers() != 1 {
            return Err(ImageIOError::InvalidOptions {
                description: format!("frame has {} layers, movies take one per frame", image.layers()),
            });
        }
        if (image.width(), image.height(), image.components()) != (self.width, self.height, self.components) {
            return Err(ImageIOError::InvalidOptions {
                description: format!(
                    "frame is {}x{}x{}, movie is {}x{}x{}",
                    image.width(), image.height(), image.components(), self.width, self.height, self.components
                ),
            });
        }

        if image.component_order() == ComponentOrder::Bgr && self.components >= 3 {
            let mut frame = image.data().to_vec();
            for pixel in frame.chunks_exact_mut(self.components) {
                pixel.swap(0, 2);
            }
            self.writer.write_all(&frame).map_err(write_error)
        } else {
            self.writer.write_all(image.data()).map_err(write_error)
        }
    }

    fn close(&mut self) -> Result<(), ImageIOError> {
        self.writer.flush().map_err(write_error)
    }
}

fn required_dimension(params: &ParamBag, name: &str) -> Result<usize, ImageIOError> {
    params.get_int(name)
        .and_then(|v| usize::try_from(v).ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| ImageIOError::InvalidOptions {
            description: format!("\"{}\" must be set to a positive integer", name),
        })
}

fn read_error(err: std::io::Error) -> ImageIOError {
    ImageIOError::FailedToRead {
        description: err.to_string(),
    }
}

fn write_error(err: std::io::Error) -> ImageIOError {
    ImageIOError::FailedToWrite {
        description: err.to_string(),
    }
}
