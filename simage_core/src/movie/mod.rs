//! Frame-by-frame image sequences bound to pluggable importers and exporters.

pub mod raw;

use std::path::{Path, PathBuf};

use log::*;

use crate::error::{Result, SimageError};
use crate::models::image::Image;
use crate::models::io::ImageIOError;
use crate::params::ParamBag;

pub trait MovieSource {

    /// Decodes the next frame, `None` once the movie is exhausted.
    fn get_image(&mut self, params: Option<&ParamBag>) -> std::result::Result<Option<Image<'static>>, ImageIOError>;

    fn close(&mut self) -> std::result::Result<(), ImageIOError> {
        Ok(())
    }
}

pub trait MovieSink {

    /// Encodes `image` as the next frame.
    fn put_image(&mut self, image: &Image, params: Option<&ParamBag>) -> std::result::Result<(), ImageIOError>;

    fn close(&mut self) -> std::result::Result<(), ImageIOError> {
        Ok(())
    }
}

pub trait MovieImporter {

    fn mime_type(&self) -> &str;

    fn open(&self, filename: &Path) -> std::result::Result<Box<dyn MovieSource>, ImageIOError>;
}

pub trait MovieExporter {

    fn mime_type(&self) -> &str;

    /// Creates `filename`. Common parameters are "width" and "height"; exporters may require them.
    fn create(&self, filename: &Path, params: &mut ParamBag) -> std::result::Result<Box<dyn MovieSink>, ImageIOError>;
}

enum Backend {
    Source(Box<dyn MovieSource>),
    Sink(Box<dyn MovieSink>),
}

/// An open movie, either being read or being written. Follows the same lifecycle as
/// [`crate::stream::Stream`]: close ends the transfer, drop releases the handle.
pub struct Movie {
    path: PathBuf,
    mime_type: String,
    params: ParamBag,
    backend: Option<Backend>,
}

impl Movie {

    pub(crate) fn reader(path: &Path, mime_type: String, source: Box<dyn MovieSource>) -> Self {
        Self::with_backend(path, mime_type, ParamBag::new(), Backend::Source(source))
    }

    pub(crate) fn writer(path: &Path, mime_type: String, params: ParamBag, sink: Box<dyn MovieSink>) -> Self {
        Self::with_backend(path, mime_type, params, Backend::Sink(sink))
    }

    fn with_backend(path: &Path, mime_type: String, params: ParamBag, backend: Backend) -> Self {
        debug!("movie {} bound to {}", path.to_string_lossy(), mime_type);
        Movie {
            path: path.to_path_buf(),
            mime_type,
            params,
            backend: Some(backend),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn params(&self) -> &ParamBag {
        &self.params
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn get_image(&mut self, params: Option<&ParamBag>) -> Result<Option<Image<'static>>> {
        let mime_type = &self.mime_type;
        match &mut self.backend {
            Some(Backend::Source(source)) => source.get_image(params)
                .map_err(|err| SimageError::from_plugin(mime_type, err)),
            Some(Backend::Sink(_)) => Err(SimageError::invalid_state("movie was created for writing")),
            None => Err(SimageError::invalid_state("movie is closed")),
        }
    }

    /// Decodes the next frame into `target`, reusing its storage when the frame has the same
    /// dimensions. Returns false once the movie is exhausted.
    pub fn get_image_into(&mut self, target: &mut Image, params: Option<&ParamBag>) -> Result<bool> {
        match self.get_image(params)? {
            Some(frame) => {
                target.copy_from(&frame)?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    pub fn put_image(&mut self, image: &Image, params: Option<&ParamBag>) -> Result<()> {
        let mime_type = &self.mime_type;
        match &mut self.backend {
            Some(Backend::Sink(sink)) => sink.put_image(image, params)
                .map_err(|err| SimageError::from_plugin(mime_type, err)),
            Some(Backend::Source(_)) => Err(SimageError::invalid_state("movie was opened for reading")),
            None => Err(SimageError::invalid_state("movie is closed")),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        let result = match self.backend.take() {
            Some(Backend::Source(mut source)) => source.close(),
            Some(Backend::Sink(mut sink)) => sink.close(),
            None => return Err(SimageError::invalid_state("movie is closed")),
        };
        debug!("movie {} closed", self.path.to_string_lossy());
        result.map_err(|err| SimageError::from_plugin(&self.mime_type, err))
    }

    pub fn destroy(self) {
        drop(self)
    }
}

impl Drop for Movie {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                warn!("failed to close movie {}: {}", self.path.to_string_lossy(), err);
            }
        }
    }
}
