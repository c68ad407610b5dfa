//! Plain file streams.

use std::convert::TryFrom;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::models::io::ImageIOError;
use crate::params::ParamBag;

use super::{StreamExporter, StreamImporter, StreamSink, StreamSource, Whence};

pub const FILE_STREAM_MIME_TYPE: &str = "application/octet-stream";

/// Set on the stream parameters when a file stream is opened.
pub const FILE_SIZE_PARAM: &str = "file size";

pub struct FileStreamImporter;

impl StreamImporter for FileStreamImporter {

    fn mime_type(&self) -> &str {
        FILE_STREAM_MIME_TYPE
    }

    fn open(&self, filename: &Path, params: &mut ParamBag) -> Result<Box<dyn StreamSource>, ImageIOError> {
        let file = File::open(filename).map_err(|err| ImageIOError::FailedToOpen {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })?;
        let size = file.metadata().map(|v| v.len()).unwrap_or(0);
        params.set(FILE_SIZE_PARAM, i32::try_from(size).unwrap_or(i32::MAX));

        Ok(Box::new(FileStream { file }))
    }
}

pub struct FileStreamExporter;

impl StreamExporter for FileStreamExporter {

    fn mime_type(&self) -> &str {
        FILE_STREAM_MIME_TYPE
    }

    fn create(&self, filename: &Path, _params: &mut ParamBag) -> Result<Box<dyn StreamSink>, ImageIOError> {
        let file = File::create(filename).map_err(|err| ImageIOError::FailedToOpen {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        })?;

        Ok(Box::new(FileStream { file }))
    }
}

struct FileStream {
    file: File,
}

impl FileStream {

    fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<u64, ImageIOError> {
        let position = match whence {
            Whence::Set => SeekFrom::Start(u64::try_from(offset).map_err(|_| ImageIOError::InvalidOptions {
                description: format!("negative absolute offset {}", offset),
            })?),
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };

        self.file.seek(position).map_err(|err| ImageIOError::FailedToRead {
            description: format!("seek failed: {}", err),
        })
    }

    fn position(&mut self) -> Result<u64, ImageIOError> {
        self.file.stream_position().map_err(|err| ImageIOError::FailedToRead {
            description: format!("failed to get position: {}", err),
        })
    }
}

impl StreamSource for FileStream {

    fn get(&mut self, buf: &mut [u8], _params: Option<&ParamBag>) -> Result<usize, ImageIOError> {
        self.file.read(buf).map_err(|err| ImageIOError::FailedToRead {
            description: err.to_string(),
        })
    }

    fn seek(&mut self, offset: i64, whence: Whence, _params: Option<&ParamBag>) -> Result<u64, ImageIOError> {
        self.seek_to(offset, whence)
    }

    fn tell(&mut self, _params: Option<&ParamBag>) -> Result<u64, ImageIOError> {
        self.position()
    }
}

impl StreamSink for FileStream {

    fn put(&mut self, buf: &[u8], _params: Option<&ParamBag>) -> Result<(), ImageIOError> {
        self.file.write_all(buf).map_err(|err| ImageIOError::FailedToWrite {
            description: err.to_string(),
        })
    }

    fn seek(&mut self, offset: i64, whence: Whence, _params: Option<&ParamBag>) -> Result<u64, ImageIOError> {
        self.seek_to(offset, whence)
    }

    fn tell(&mut self, _params: Option<&ParamBag>) -> Result<u64, ImageIOError> {
        self.position()
    }

    fn close(&mut self) -> Result<(), ImageIOError> {
        self.file.flush().map_err(|err| ImageIOError::FailedToWrite {
            description: err.to_string(),
        })
    }
}
