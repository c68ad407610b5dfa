//! The dispatcher: owns every plugin registry and routes load, save, stream and movie
//! requests to the first plugin able to handle them.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::*;

use crate::error::{Result, SimageError};
use crate::models::image::{ComponentOrder, Image};
use crate::models::io::{ImageIOError, ImageLoader, ImageSaver, ScanlineReader};
use crate::movie::raw::{RawMovieExporter, RawMovieImporter};
use crate::movie::{Movie, MovieExporter, MovieImporter};
use crate::params::ParamBag;
use crate::plugins::plugins::{DynamicLoader, ImageFormatSupportPlugin, PluginManager};
use crate::plugins::registry::{Handle, Registry};
use crate::stream::file::{FileStreamExporter, FileStreamImporter};
use crate::stream::{bind_backend, Stream, StreamExporter, StreamImporter, MIME_TYPE_PARAM};

/// Number of leading bytes handed to `identify`. Enough for every magic number in use.
pub const DEFAULT_HEADER_LEN: usize = 64;

/// Parameter naming the saver extension for [`Simage::save`].
pub const FILE_TYPE_PARAM: &str = "file type";

/// A registered saver and its parsed extension list.
pub struct SaverDescriptor {
    saver: Box<dyn ImageSaver>,
    extensions: Vec<String>,
}

impl SaverDescriptor {

    fn new(saver: Box<dyn ImageSaver>) -> Self {
        let extensions = saver.extensions()
            .split(|c| c == ',' || c == ';')
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();

        SaverDescriptor {
            saver,
            extensions,
        }
    }

    pub fn saver(&self) -> &dyn ImageSaver {
        self.saver.as_ref()
    }

    pub fn handles(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.extensions.iter().any(|v| v.eq_ignore_ascii_case(extension))
    }
}

pub type LoaderHandle = Handle<Box<dyn ImageLoader>>;
pub type SaverHandle = Handle<SaverDescriptor>;
pub type StreamImporterHandle = Handle<Box<dyn StreamImporter>>;
pub type StreamExporterHandle = Handle<Box<dyn StreamExporter>>;
pub type MovieImporterHandle = Handle<Box<dyn MovieImporter>>;
pub type MovieExporterHandle = Handle<Box<dyn MovieExporter>>;

/// What [`Simage::add_format_plugin`] registered for one plugin bundle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormatHandles {
    pub loader: Option<LoaderHandle>,
    pub saver: Option<SaverHandle>,
}

/// Image I/O context.
///
/// Every registry lives here rather than in process-wide state, and every dispatch call
/// returns its error. The message of the most recent failure is also kept for callers
/// that only look at [`Simage::last_error`]; each dispatch call clears it first.
///
/// The context is not synchronised: share it between threads behind a `Mutex`.
pub struct Simage {
    header_len: usize,
    last_error: Option<String>,
    // DO NOT change order of fields here. Plugins need to be freed earlier than the libraries
    // in plugin_manager they were loaded from.
    loaders: Registry<Box<dyn ImageLoader>>,
    savers: Registry<SaverDescriptor>,
    stream_importers: Registry<Box<dyn StreamImporter>>,
    stream_exporters: Registry<Box<dyn StreamExporter>>,
    movie_importers: Registry<Box<dyn MovieImporter>>,
    movie_exporters: Registry<Box<dyn MovieExporter>>,
    plugin_manager: PluginManager,
}

impl Simage {

    /// A context with the built-in file stream and raw movie backends registered.
    pub fn new() -> Self {
        let mut simage = Self::empty();
        simage.add_stream_importer(Box::new(FileStreamImporter), false);
        simage.add_stream_exporter(Box::new(FileStreamExporter), false);
        simage.add_movie_importer(Box::new(RawMovieImporter), false);
        simage.add_movie_exporter(Box::new(RawMovieExporter), false);
        simage
    }

    /// A context without any registered plugin or backend.
    pub fn empty() -> Self {
        Simage {
            header_len: DEFAULT_HEADER_LEN,
            last_error: None,
            loaders: Registry::new(),
            savers: Registry::new(),
            stream_importers: Registry::new(),
            stream_exporters: Registry::new(),
            movie_importers: Registry::new(),
            movie_exporters: Registry::new(),
            plugin_manager: PluginManager::new(),
        }
    }

    pub fn with_header_len(mut self, header_len: usize) -> Self {
        self.header_len = header_len;
        self
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Message of the error returned by the most recent failed dispatch call.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        self.last_error = match &result {
            Ok(_) => None,
            Err(err) => {
                debug!("{}", err);
                Some(err.to_string())
            }
        };
        result
    }

    // loaders and savers

    pub fn add_loader(&mut self, loader: Box<dyn ImageLoader>, add_before: bool) -> LoaderHandle {
        debug!("adding loader {}", loader.name());
        self.loaders.add(loader, add_before)
    }

    /// Unregisters a loader. Unknown handles are ignored.
    pub fn remove_loader(&mut self, handle: LoaderHandle) {
        if let Some(loader) = self.loaders.remove(handle) {
            debug!("removed loader {}", loader.name());
        }
    }

    /// Loaders in the order they are tried.
    pub fn loaders(&self) -> impl Iterator<Item = &dyn ImageLoader> + '_ {
        self.loaders.iter().map(|v| v.as_ref())
    }

    pub fn add_saver(&mut self, saver: Box<dyn ImageSaver>, add_before: bool) -> SaverHandle {
        debug!("adding saver {} for {}", saver.full_name(), saver.extensions());
        self.savers.add(SaverDescriptor::new(saver), add_before)
    }

    pub fn remove_saver(&mut self, handle: SaverHandle) {
        if let Some(descriptor) = self.savers.remove(handle) {
            debug!("removed saver {}", descriptor.saver.full_name());
        }
    }

    pub fn num_savers(&self) -> usize {
        self.savers.len()
    }

    pub fn saver_handle(&self, index: usize) -> Option<SaverHandle> {
        self.savers.handle_at(index)
    }

    pub fn saver_extensions(&self, handle: SaverHandle) -> Option<&str> {
        self.savers.get(handle).map(|v| v.saver.extensions())
    }

    pub fn saver_full_name(&self, handle: SaverHandle) -> Option<&str> {
        self.savers.get(handle).map(|v| v.saver.full_name())
    }

    pub fn saver_description(&self, handle: SaverHandle) -> Option<&str> {
        self.savers.get(handle).map(|v| v.saver.description())
    }

    /// Registers whatever halves of `plugin` exist.
    pub fn add_format_plugin(&mut self, plugin: &dyn ImageFormatSupportPlugin, add_before: bool) -> FormatHandles {
        info!("adding support for {}", plugin.format_name());
        FormatHandles {
            loader: plugin.loader().map(|v| self.add_loader(v, add_before)),
            saver: plugin.saver().map(|v| self.add_saver(v, add_before)),
        }
    }

    /// Replaces the hook used to open plugin libraries. Must happen before any plugin is loaded.
    pub fn set_dynamic_loader(&mut self, loader: Box<dyn DynamicLoader>) -> Result<()> {
        let result = self.plugin_manager.set_dynamic_loader(loader).map_err(SimageError::from);
        self.record(result)
    }

    /// Loads a plugin library and registers its loader and saver.
    pub fn load_plugin(&mut self, library_path: &Path, add_before: bool) -> Result<FormatHandles> {
        let result = self.plugin_manager.load_plugin(library_path).map_err(SimageError::from);
        let plugin = self.record(result)?;
        Ok(self.add_format_plugin(plugin.as_ref(), add_before))
    }

    /// Loads every plugin library in `plugins_directory`, appending them to the registries.
    /// Libraries that fail to load are logged and skipped.
    pub fn load_plugins(&mut self, plugins_directory: &Path) -> Result<usize> {
        let result = self.plugin_manager.load_plugins(plugins_directory).map_err(SimageError::from);
        let plugins = self.record(result)?;
        for plugin in &plugins {
            self.add_format_plugin(plugin.as_ref(), false);
        }
        Ok(plugins.len())
    }

    // loading

    /// True if some registered loader claims the file.
    pub fn check_supported(&self, filename: &Path) -> bool {
        self.find_loader(filename).is_ok()
    }

    /// Reads an image with the first loader that identifies it. The result is always in RGB order.
    pub fn read_image(&mut self, filename: &Path) -> Result<Image<'static>> {
        let result = self.load(filename);
        self.record(result)
    }

    /// Reads an image into `target`, writing through its storage when the dimensions match.
    pub fn load_into(&mut self, filename: &Path, target: &mut Image) -> Result<()> {
        let result = self.load(filename).and_then(|image| target.copy_from(&image));
        self.record(result)
    }

    /// Opens an image for line-by-line reading. If the loader cannot read incrementally the
    /// whole image is loaded instead, but only when `ok_to_read_all` allows it.
    pub fn open_image(&mut self, filename: &Path, ok_to_read_all: bool) -> Result<OpenImage> {
        let result = self.open_lines(filename, ok_to_read_all);
        self.record(result)
    }

    fn read_header(&self, filename: &Path) -> Result<Vec<u8>> {
        let open_failure = |err: std::io::Error| SimageError::OpenFailure {
            description: format!("{}: {}", filename.to_string_lossy(), err),
        };

        let file = File::open(filename).map_err(open_failure)?;
        let mut header = Vec::with_capacity(self.header_len);
        file.take(self.header_len as u64).read_to_end(&mut header).map_err(open_failure)?;
        Ok(header)
    }

    fn find_loader(&self, filename: &Path) -> Result<&dyn ImageLoader> {
        let header = self.read_header(filename)?;

        self.loaders()
            .find(|loader| loader.identify(filename, &header))
            .ok_or_else(|| SimageError::not_supported(filename.to_string_lossy()))
    }

    fn load(&self, filename: &Path) -> Result<Image<'static>> {
        let loader = self.find_loader(filename)?;
        debug!("loading {} as {}", filename.to_string_lossy(), loader.name());

        let mut image = loader.load(filename).map_err(|err| SimageError::from_plugin(loader.name(), err))?;
        image.convert_component_order(ComponentOrder::Rgb);
        Ok(image)
    }

    fn open_lines(&self, filename: &Path, ok_to_read_all: bool) -> Result<OpenImage> {
        let loader = self.find_loader(filename)?;

        match loader.open_scanlines(filename) {
            Ok(reader) => Ok(OpenImage::incremental(loader.name(), reader)),
            Err(ImageIOError::Unsupported { .. }) if ok_to_read_all => {
                debug!("{} reads whole images only, loading {}", loader.name(), filename.to_string_lossy());
                self.load(filename).map(|image| OpenImage::loaded(loader.name(), image))
            },
            Err(err) => Err(SimageError::from_optional_capability(loader.name(), err)),
        }
    }

    // saving

    pub fn check_save_supported(&self, extension: &str) -> bool {
        self.find_saver(extension).is_some()
    }

    /// Saves with the first saver whose extension list contains `extension` (case-insensitive).
    pub fn save_image(&mut self, filename: &Path, image: &Image, extension: &str) -> Result<()> {
        let result = self.save_with(filename, image, extension, &ParamBag::new());
        self.record(result)
    }

    /// Saves with the extension from the "file type" parameter, or the file name's extension
    /// when the parameter is missing. `params` is passed on to the saver.
    pub fn save(&mut self, filename: &Path, image: &Image, params: Option<&ParamBag>) -> Result<()> {
        let empty = ParamBag::new();
        let params = params.unwrap_or(&empty);
        let extension = params.get_string(FILE_TYPE_PARAM)
            .map(str::to_string)
            .or_else(|| filename.extension().map(|v| v.to_string_lossy().to_string()));

        let result = match extension {
            Some(extension) => self.save_with(filename, image, &extension, params),
            None => Err(SimageError::not_supported(format!("no file type for {}", filename.to_string_lossy()))),
        };
        self.record(result)
    }

    fn find_saver(&self, extension: &str) -> Option<&SaverDescriptor> {
        self.savers.iter().find(|v| v.handles(extension))
    }

    fn save_with(&self, filename: &Path, image: &Image, extension: &str, params: &ParamBag) -> Result<()> {
        let saver = self.find_saver(extension)
            .ok_or_else(|| SimageError::not_supported(format!("no saver for \"{}\"", extension)))?
            .saver();
        if image.layers() != 1 {
            return Err(SimageError::invalid_image("layered images cannot be saved"));
        }
        debug!("saving {} with {}", filename.to_string_lossy(), saver.full_name());

        let result = if image.component_order() == ComponentOrder::Bgr && image.components() >= 3 {
            let mut normalized = Image::from_vec(image.width(), image.height(), image.components(), image.data().to_vec())?;
            normalized.set_component_order(ComponentOrder::Bgr);
            normalized.convert_component_order(ComponentOrder::Rgb);
            saver.save(filename, &normalized, params)
        } else {
            saver.save(filename, image, params)
        };

        result.map_err(|err| SimageError::from_plugin(saver.full_name(), err))
    }

    // streams

    pub fn add_stream_importer(&mut self, importer: Box<dyn StreamImporter>, add_before: bool) -> StreamImporterHandle {
        debug!("adding stream importer {}", importer.mime_type());
        self.stream_importers.add(importer, add_before)
    }

    pub fn remove_stream_importer(&mut self, handle: StreamImporterHandle) {
        self.stream_importers.remove(handle);
    }

    pub fn add_stream_exporter(&mut self, exporter: Box<dyn StreamExporter>, add_before: bool) -> StreamExporterHandle {
        debug!("adding stream exporter {}", exporter.mime_type());
        self.stream_exporters.add(exporter, add_before)
    }

    pub fn remove_stream_exporter(&mut self, handle: StreamExporterHandle) {
        self.stream_exporters.remove(handle);
    }

    /// Opens a stream for reading. A "mime-type" parameter selects the importer; without
    /// one the first importer that opens the file is used.
    pub fn stream_open(&mut self, filename: &Path, params: Option<&ParamBag>) -> Result<Stream> {
        let mut bag = params.cloned().unwrap_or_default();
        let mime_type = bag.get_string(MIME_TYPE_PARAM).map(str::to_string);

        let result = bind_backend(
            "stream importer",
            self.stream_importers.iter(),
            mime_type.as_deref(),
            |importer| importer.mime_type(),
            |importer| importer.open(filename, &mut bag),
        );
        let (name, source) = self.record(result)?;
        Ok(Stream::reader(filename, name, bag, source))
    }

    /// Creates a stream for writing, selecting the exporter the same way as [`Simage::stream_open`].
    pub fn stream_create(&mut self, filename: &Path, params: Option<&ParamBag>) -> Result<Stream> {
        let mut bag = params.cloned().unwrap_or_default();
        let mime_type = bag.get_string(MIME_TYPE_PARAM).map(str::to_string);

        let result = bind_backend(
            "stream exporter",
            self.stream_exporters.iter(),
            mime_type.as_deref(),
            |exporter| exporter.mime_type(),
            |exporter| exporter.create(filename, &mut bag),
        );
        let (name, sink) = self.record(result)?;
        Ok(Stream::writer(filename, name, bag, sink))
    }

    // movies

    pub fn add_movie_importer(&mut self, importer: Box<dyn MovieImporter>, add_before: bool) -> MovieImporterHandle {
        debug!("adding movie importer {}", importer.mime_type());
        self.movie_importers.add(importer, add_before)
    }

    pub fn remove_movie_importer(&mut self, handle: MovieImporterHandle) {
        self.movie_importers.remove(handle);
    }

    pub fn add_movie_exporter(&mut self, exporter: Box<dyn MovieExporter>, add_before: bool) -> MovieExporterHandle {
        debug!("adding movie exporter {}", exporter.mime_type());
        self.movie_exporters.add(exporter, add_before)
    }

    pub fn remove_movie_exporter(&mut self, handle: MovieExporterHandle) {
        self.movie_exporters.remove(handle);
    }

    /// Opens a movie with the first importer that accepts the file.
    pub fn movie_open(&mut self, filename: &Path) -> Result<Movie> {
        let result = bind_backend(
            "movie importer",
            self.movie_importers.iter(),
            None,
            |importer| importer.mime_type(),
            |importer| importer.open(filename),
        );
        let (name, source) = self.record(result)?;
        Ok(Movie::reader(filename, name, source))
    }

    /// Creates a movie. A "mime-type" parameter selects the exporter; without one the
    /// first exporter that accepts the parameters is used.
    pub fn movie_create(&mut self, filename: &Path, params: Option<&ParamBag>) -> Result<Movie> {
        let mut bag = params.cloned().unwrap_or_default();
        let mime_type = bag.get_string(MIME_TYPE_PARAM).map(str::to_string);

        let result = bind_backend(
            "movie exporter",
            self.movie_exporters.iter(),
            mime_type.as_deref(),
            |exporter| exporter.mime_type(),
            |exporter| exporter.create(filename, &mut bag),
        );
        let (name, sink) = self.record(result)?;
        Ok(Movie::writer(filename, name, bag, sink))
    }
}

impl Default for Simage {
    fn default() -> Self {
        Self::new()
    }
}

enum Lines {
    Incremental(Box<dyn ScanlineReader>),
    Loaded(Image<'static>),
}

/// An image opened for line-by-line reading by [`Simage::open_image`].
pub struct OpenImage {
    loader: String,
    width: usize,
    height: usize,
    components: usize,
    lines: Lines,
}

impl OpenImage {

    fn incremental(loader: &str, reader: Box<dyn ScanlineReader>) -> Self {
        OpenImage {
            loader: loader.to_string(),
            width: reader.width(),
            height: reader.height(),
            components: reader.components(),
            lines: Lines::Incremental(reader),
        }
    }

    fn loaded(loader: &str, image: Image<'static>) -> Self {
        OpenImage {
            loader: loader.to_string(),
            width: image.width(),
            height: image.height(),
            components: image.components(),
            lines: Lines::Loaded(image),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn components(&self) -> usize {
        self.components
    }

    /// True when lines are decoded on demand rather than served from a fully loaded image.
    pub fn is_incremental(&self) -> bool {
        matches!(self.lines, Lines::Incremental(_))
    }

    /// Reads row `line` (0 is the top) into the first `width * components` bytes of `buf`.
    pub fn read_line(&mut self, line: usize, buf: &mut [u8]) -> Result<()> {
        let len = self.width * self.components;
        if line >= self.height {
            return Err(SimageError::invalid_image(format!("line {} is outside an image of height {}", line, self.height)));
        }
        if buf.len() < len {
            return Err(SimageError::invalid_image(format!("line buffer holds {} bytes, need {}", buf.len(), len)));
        }

        let loader = &self.loader;
        match &mut self.lines {
            Lines::Incremental(reader) => reader.read_line(line, &mut buf[..len])
                .map_err(|err| SimageError::from_plugin(loader, err)),
            Lines::Loaded(image) => {
                buf[..len].copy_from_slice(image.row(line));
                Ok(())
            }
        }
    }
}
