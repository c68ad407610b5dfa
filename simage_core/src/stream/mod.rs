//! Sequential byte streams bound to pluggable importers and exporters.

pub mod file;

use std::path::{Path, PathBuf};

use log::*;

use crate::error::{Result, SimageError};
use crate::models::io::ImageIOError;
use crate::params::ParamBag;

/// Parameter selecting a backend by type when opening or creating a stream or movie.
pub const MIME_TYPE_PARAM: &str = "mime-type";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

/// Read side of a stream backend. `seek` and `tell` are optional.
pub trait StreamSource {

    /// Fills `buf` from the stream and returns the number of bytes read, 0 at the end.
    fn get(&mut self, buf: &mut [u8], params: Option<&ParamBag>) -> std::result::Result<usize, ImageIOError>;

    fn seek(&mut self, _offset: i64, _whence: Whence, _params: Option<&ParamBag>) -> std::result::Result<u64, ImageIOError> {
        Err(ImageIOError::unsupported("seek"))
    }

    fn tell(&mut self, _params: Option<&ParamBag>) -> std::result::Result<u64, ImageIOError> {
        Err(ImageIOError::unsupported("tell"))
    }

    fn close(&mut self) -> std::result::Result<(), ImageIOError> {
        Ok(())
    }
}

/// Write side of a stream backend. `seek` and `tell` are optional.
pub trait StreamSink {

    fn put(&mut self, buf: &[u8], params: Option<&ParamBag>) -> std::result::Result<(), ImageIOError>;

    fn seek(&mut self, _offset: i64, _whence: Whence, _params: Option<&ParamBag>) -> std::result::Result<u64, ImageIOError> {
        Err(ImageIOError::unsupported("seek"))
    }

    fn tell(&mut self, _params: Option<&ParamBag>) -> std::result::Result<u64, ImageIOError> {
        Err(ImageIOError::unsupported("tell"))
    }

    fn close(&mut self) -> std::result::Result<(), ImageIOError> {
        Ok(())
    }
}

pub trait StreamImporter {

    fn mime_type(&self) -> &str;

    /// Opens `filename` for reading. The backend may record what it learns about the
    /// stream in `params`; callers read it back through [`Stream::params`].
    fn open(&self, filename: &Path, params: &mut ParamBag) -> std::result::Result<Box<dyn StreamSource>, ImageIOError>;
}

pub trait StreamExporter {

    fn mime_type(&self) -> &str;

    fn create(&self, filename: &Path, params: &mut ParamBag) -> std::result::Result<Box<dyn StreamSink>, ImageIOError>;
}

enum Backend {
    Source(Box<dyn StreamSource>),
    Sink(Box<dyn StreamSink>),
}

/// An open stream. Closing ends the transfer but keeps the handle (and its parameters)
/// around; every transfer call after [`Stream::close`] fails with `InvalidState`.
/// Dropping the handle, or calling [`Stream::destroy`], releases it.
pub struct Stream {
    path: PathBuf,
    mime_type: String,
    params: ParamBag,
    backend: Option<Backend>,
}

impl Stream {

    pub(crate) fn reader(path: &Path, mime_type: String, params: ParamBag, source: Box<dyn StreamSource>) -> Self {
        Self::with_backend(path, mime_type, params, Backend::Source(source))
    }

    pub(crate) fn writer(path: &Path, mime_type: String, params: ParamBag, sink: Box<dyn StreamSink>) -> Self {
        Self::with_backend(path, mime_type, params, Backend::Sink(sink))
    }

    fn with_backend(path: &Path, mime_type: String, params: ParamBag, backend: Backend) -> Self {
        debug!("stream {} bound to {}", path.to_string_lossy(), mime_type);
        Stream {
            path: path.to_path_buf(),
            mime_type,
            params,
            backend: Some(backend),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mime type of the backend this stream is bound to.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn params(&self) -> &ParamBag {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamBag {
        &mut self.params
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn get_buffer(&mut self, buf: &mut [u8], params: Option<&ParamBag>) -> Result<usize> {
        let mime_type = &self.mime_type;
        match &mut self.backend {
            Some(Backend::Source(source)) => source.get(buf, params)
                .map_err(|err| SimageError::from_plugin(mime_type, err)),
            Some(Backend::Sink(_)) => Err(SimageError::invalid_state("stream was created for writing")),
            None => Err(closed()),
        }
    }

    pub fn put_buffer(&mut self, buf: &[u8], params: Option<&ParamBag>) -> Result<()> {
        let mime_type = &self.mime_type;
        match &mut self.backend {
            Some(Backend::Sink(sink)) => sink.put(buf, params)
                .map_err(|err| SimageError::from_plugin(mime_type, err)),
            Some(Backend::Source(_)) => Err(SimageError::invalid_state("stream was opened for reading")),
            None => Err(closed()),
        }
    }

    /// Moves the stream position. Fails with `CapabilityUnsupported` if the backend cannot seek.
    pub fn seek(&mut self, offset: i64, whence: Whence, params: Option<&ParamBag>) -> Result<u64> {
        let mime_type = &self.mime_type;
        let result = match &mut self.backend {
            Some(Backend::Source(source)) => source.seek(offset, whence, params),
            Some(Backend::Sink(sink)) => sink.seek(offset, whence, params),
            None => return Err(closed()),
        };
        result.map_err(|err| SimageError::from_optional_capability(mime_type, err))
    }

    pub fn tell(&mut self, params: Option<&ParamBag>) -> Result<u64> {
        let mime_type = &self.mime_type;
        let result = match &mut self.backend {
            Some(Backend::Source(source)) => source.tell(params),
            Some(Backend::Sink(sink)) => sink.tell(params),
            None => return Err(closed()),
        };
        result.map_err(|err| SimageError::from_optional_capability(mime_type, err))
    }

    /// Ends the transfer and releases the backend state. Closing twice is an error.
    pub fn close(&mut self) -> Result<()> {
        let result = match self.backend.take() {
            Some(Backend::Source(mut source)) => source.close(),
            Some(Backend::Sink(mut sink)) => sink.close(),
            None => return Err(closed()),
        };
        debug!("stream {} closed", self.path.to_string_lossy());
        result.map_err(|err| SimageError::from_plugin(&self.mime_type, err))
    }

    pub fn destroy(self) {
        drop(self)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                warn!("failed to close stream {}: {}", self.path.to_string_lossy(), err);
            }
        }
    }
}

fn closed() -> SimageError {
    SimageError::invalid_state("handle is closed")
}

/// Picks the backend a new stream or movie is bound to.
///
/// With a requested mime type the first backend of that type is bound and its open error,
/// if any, is final. Without one every backend is tried in order and the first that opens
/// the file wins.
pub(crate) fn bind_backend<'r, B, H>(
    kind: &str,
    backends: impl Iterator<Item = &'r Box<B>>,
    mime_type: Option<&str>,
    backend_mime_type: impl Fn(&B) -> &str,
    mut open: impl FnMut(&B) -> std::result::Result<H, ImageIOError>,
) -> Result<(String, H)>
where
    B: ?Sized + 'r,
{
    for backend in backends {
        let backend: &B = backend.as_ref();
        let name = backend_mime_type(backend);

        if let Some(requested) = mime_type {
            if !name.eq_ignore_ascii_case(requested) {
                continue;
            }
            return open(backend)
                .map(|handle| (name.to_string(), handle))
                .map_err(|err| SimageError::from_plugin(name, err));
        }

        match open(backend) {
            Ok(handle) => return Ok((name.to_string(), handle)),
            Err(err) => debug!("{} {} declined: {}", kind, name, err),
        }
    }

    Err(SimageError::not_supported(match mime_type {
        Some(requested) => format!("no {} for {}", kind, requested),
        None => format!("no {} accepted the file", kind),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        left: usize,
    }

    impl StreamSource for Countdown {
        fn get(&mut self, buf: &mut [u8], _params: Option<&ParamBag>) -> std::result::Result<usize, ImageIOError> {
            if self.left == 0 {
                return Err(ImageIOError::FailedToRead { description: "source exhausted".to_string() });
            }
            self.left -= 1;
            buf[0] = self.left as u8;
            Ok(1)
        }
    }

    fn countdown(left: usize) -> Stream {
        Stream::reader(Path::new("countdown"), "test/countdown".to_string(), ParamBag::new(), Box::new(Countdown { left }))
    }

    #[test]
    fn seek_without_backend_support_is_capability_error() {
        let mut stream = countdown(0);

        match stream.seek(0, Whence::Set, None) {
            Err(SimageError::CapabilityUnsupported { operation }) => assert_eq!(operation, "seek"),
            other => panic!("unexpected seek result: {:?}", other),
        }
        match stream.tell(None) {
            Err(SimageError::CapabilityUnsupported { .. }) => {},
            other => panic!("unexpected tell result: {:?}", other),
        }

        let mut buf = [0u8; 1];
        match stream.get_buffer(&mut buf, None) {
            Err(SimageError::PluginFailure { plugin, code, .. }) => {
                assert_eq!(plugin, "test/countdown");
                assert_eq!(code, 2);
            },
            other => panic!("unexpected get result: {:?}", other),
        }
    }

    #[test]
    fn closed_stream_rejects_transfers() {
        let mut stream = countdown(3);
        let mut buf = [0u8; 1];
        assert_eq!(stream.get_buffer(&mut buf, None).expect("stream is open"), 1);
        assert_eq!(buf[0], 2);

        stream.close().expect("first close succeeds");
        assert!(!stream.is_open());
        assert_eq!(stream.mime_type(), "test/countdown");

        for result in [stream.get_buffer(&mut buf, None).map(|_| ()), stream.seek(0, Whence::Set, None).map(|_| ()), stream.close()] {
            match result {
                Err(SimageError::InvalidState { .. }) => {},
                other => panic!("expected invalid state, got {:?}", other),
            }
        }
        stream.destroy();
    }

    #[test]
    fn reader_cannot_be_written() {
        let mut stream = countdown(1);
        assert!(matches!(stream.put_buffer(&[1, 2, 3], None), Err(SimageError::InvalidState { .. })));
    }
}
