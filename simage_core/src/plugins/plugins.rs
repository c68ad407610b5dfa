use std::ffi::c_void;
use std::fs;
use std::path::Path;

use custom_error::custom_error;
use libloading::{Library, Symbol};
use log::*;

use crate::error::SimageError;
use crate::models::io::{ImageLoader, ImageSaver};

custom_error! {pub PluginManagerError
    FailedToLoadLibrary{description: String} = "Failed to load library: {description}",
    InvalidPlugin{description: String} = "Invalid plugin: {description}",
    InvalidState{description: String} = "Invalid plugin manager state: {description}",
    IOError{description: String} = "IOError: {description}"
}

impl From<PluginManagerError> for SimageError {
    fn from(err: PluginManagerError) -> Self {
        SimageError::PluginLoad {
            description: err.to_string(),
        }
    }
}

/// Support for one image format, as handed out by a plugin library. Either half may be missing.
pub trait ImageFormatSupportPlugin {

    fn format_name(&self) -> String;

    fn loader(&self) -> Option<Box<dyn ImageLoader>>;
    fn saver(&self) -> Option<Box<dyn ImageSaver>>;
}

/// Symbol every plugin library exports.
pub const PLUGIN_INIT_SYMBOL: &str = "_plugin_init";

pub type PluginInit = unsafe fn () -> Box<dyn ImageFormatSupportPlugin>;

pub type LibraryId = usize;

/// The open/symbol/close triple used whenever a shared object has to be loaded at run time.
/// Applications that need their own loading mechanism replace [`NativeLoader`] with
/// [`PluginManager::set_dynamic_loader`].
pub trait DynamicLoader {

    fn open(&mut self, path: &Path) -> Result<LibraryId, PluginManagerError>;

    /// Address of `name` inside the library.
    ///
    /// # Safety
    ///
    /// The returned pointer is only valid while the library stays open, and the caller
    /// must know the real type of the symbol before using it.
    unsafe fn symbol(&self, library: LibraryId, name: &str) -> Result<*const c_void, PluginManagerError>;

    fn close(&mut self, library: LibraryId);
}

/// Platform loader backed by `libloading`.
#[derive(Default)]
pub struct NativeLoader {
    libraries: Vec<Option<Library>>,
}

impl NativeLoader {

    pub fn new() -> Self {
        Self::default()
    }
}

impl DynamicLoader for NativeLoader {

    fn open(&mut self, path: &Path) -> Result<LibraryId, PluginManagerError> {
        let library = unsafe { Library::new(path) }
            .map_err(|err| PluginManagerError::FailedToLoadLibrary { description: err.to_string() })?;

        self.libraries.push(Some(library));
        Ok(self.libraries.len() - 1)
    }

    unsafe fn symbol(&self, library: LibraryId, name: &str) -> Result<*const c_void, PluginManagerError> {
        let lib = match self.libraries.get(library) {
            Some(Some(v)) => v,
            _ => return Err(PluginManagerError::InvalidState {
                description: format!("library {} is not open", library),
            }),
        };

        let symbol: Symbol<*const c_void> = lib.get(name.as_bytes())
            .map_err(|err| PluginManagerError::InvalidPlugin { description: format!("failed to find {}: {}", name, err) })?;
        Ok(*symbol)
    }

    fn close(&mut self, library: LibraryId) {
        if let Some(slot) = self.libraries.get_mut(library) {
            slot.take();
        }
    }
}

/// Loads format plugins from shared libraries and keeps those libraries open.
///
/// Plugins handed out by the manager run code from its libraries, so they have to be
/// dropped before the manager is.
pub struct PluginManager {
    loader: Box<dyn DynamicLoader>,
    loaded_libraries: Vec<LibraryId>,
}

impl PluginManager {

    pub fn new() -> Self {
        Self::with_loader(Box::new(NativeLoader::new()))
    }

    pub fn with_loader(loader: Box<dyn DynamicLoader>) -> Self {
        PluginManager {
            loader,
            loaded_libraries: Vec::new(),
        }
    }

    /// Replaces the dynamic loader. Only allowed before any library has been opened,
    /// since open libraries must be closed by the loader that opened them.
    pub fn set_dynamic_loader(&mut self, loader: Box<dyn DynamicLoader>) -> Result<(), PluginManagerError> {
        if !self.loaded_libraries.is_empty() {
            return Err(PluginManagerError::InvalidState {
                description: format!("{} libraries are already loaded", self.loaded_libraries.len()),
            });
        }

        self.loader = loader;
        Ok(())
    }

    pub fn loaded_libraries(&self) -> usize {
        self.loaded_libraries.len()
    }

    pub fn load_plugins(&mut self, plugins_directory: &Path) -> Result<Vec<Box<dyn ImageFormatSupportPlugin>>, PluginManagerError> {
        info!("loading plugins from {}...", plugins_directory.to_string_lossy());

        let mut paths: Vec<_> = fs::read_dir(plugins_directory)
            .map_err(|err| PluginManagerError::IOError { description: err.to_string() })?
            .filter_map(|v| v.ok())
            .map(|v| v.path())
            .filter(|v| is_plugin_library(v))
            .collect();
        paths.sort();

        let plugins: Vec<Box<dyn ImageFormatSupportPlugin>> = paths.into_iter()
            .map(|path| (self.load_plugin(&path), path))
            .filter_map(|(v, path)| match v {
                Ok(v) => {
                    info!("loaded plugin: support for {}", v.format_name());
                    Some(v)
                },
                Err(err) => {
                    error!("failed to load plugin ({}): {}", path.to_string_lossy(), err);
                    None
                }
            })
            .collect();

        info!("loaded {} plugins", plugins.len());

        Ok(plugins)
    }

    /// Opens `library_path` and calls its `_plugin_init`.
    ///
    /// The library runs with the full privileges of this process: only load trusted plugins,
    /// built against the same version of this crate.
    pub fn load_plugin(&mut self, library_path: &Path) -> Result<Box<dyn ImageFormatSupportPlugin>, PluginManagerError> {
        let library = self.loader.open(library_path)?;

        // the library stays open even if init fails, plugins may have registered destructors
        self.loaded_libraries.push(library);

        let address = unsafe { self.loader.symbol(library, PLUGIN_INIT_SYMBOL)? };
        if address.is_null() {
            return Err(PluginManagerError::InvalidPlugin {
                description: format!("{} resolved to a null address", PLUGIN_INIT_SYMBOL),
            });
        }

        debug!("calling {} in {}", PLUGIN_INIT_SYMBOL, library_path.to_string_lossy());
        Ok(unsafe {
            let init = std::mem::transmute::<*const c_void, PluginInit>(address);
            init()
        })
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        for library in self.loaded_libraries.drain(..).rev() {
            self.loader.close(library);
        }
    }
}

fn is_plugin_library(path: &Path) -> bool {
    match path.extension().map(|v| v.to_string_lossy().to_lowercase()) {
        Some(extension) => extension == "so" || extension == "dll" || extension == "dylib",
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    struct FakeFormat;

    impl ImageFormatSupportPlugin for FakeFormat {
        fn format_name(&self) -> String {
            "FAKE".to_string()
        }

        fn loader(&self) -> Option<Box<dyn ImageLoader>> {
            None
        }

        fn saver(&self) -> Option<Box<dyn ImageSaver>> {
            None
        }
    }

    fn fake_init() -> Box<dyn ImageFormatSupportPlugin> {
        Box::new(FakeFormat)
    }

    #[derive(Default)]
    struct RecordingLoader {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl DynamicLoader for RecordingLoader {
        fn open(&mut self, path: &Path) -> Result<LibraryId, PluginManagerError> {
            self.events.borrow_mut().push(format!("open {}", path.to_string_lossy()));
            Ok(7)
        }

        unsafe fn symbol(&self, library: LibraryId, name: &str) -> Result<*const c_void, PluginManagerError> {
            self.events.borrow_mut().push(format!("symbol {} {}", library, name));
            let init: PluginInit = fake_init;
            Ok(init as *const c_void)
        }

        fn close(&mut self, library: LibraryId) {
            self.events.borrow_mut().push(format!("close {}", library));
        }
    }

    #[test]
    fn uses_custom_dynamic_loader() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut manager = PluginManager::new();
        manager.set_dynamic_loader(Box::new(RecordingLoader { events: events.clone() }))
            .expect("no libraries are loaded yet");

        let plugin = manager.load_plugin(Path::new("libfake.so")).expect("failed to load plugin");
        assert_eq!(plugin.format_name(), "FAKE");
        assert_eq!(manager.loaded_libraries(), 1);
        drop(plugin);
        drop(manager);

        assert_eq!(*events.borrow(), vec![
            "open libfake.so".to_string(),
            "symbol 7 _plugin_init".to_string(),
            "close 7".to_string(),
        ]);
    }

    #[test]
    fn loader_cannot_be_replaced_after_loading() {
        let mut manager = PluginManager::with_loader(Box::new(RecordingLoader::default()));
        manager.load_plugin(Path::new("libfake.so")).expect("failed to load plugin");

        assert!(manager.set_dynamic_loader(Box::new(NativeLoader::new())).is_err());
    }

    #[test]
    fn missing_library_is_an_error() {
        let mut manager = PluginManager::new();
        assert!(manager.load_plugin(Path::new("/nonexistent/libnothing.so")).is_err());
        assert_eq!(manager.loaded_libraries(), 0);
    }

    #[test]
    fn filters_library_extensions() {
        assert!(is_plugin_library(Path::new("plugins/libppm_support.so")));
        assert!(is_plugin_library(Path::new("plugins/bmp_support.DLL")));
        assert!(!is_plugin_library(Path::new("plugins/readme.txt")));
        assert!(!is_plugin_library(Path::new("plugins/noextension")));
    }
}
