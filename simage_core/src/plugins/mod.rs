pub mod plugins;
pub mod registry;

pub use self::plugins::{
    DynamicLoader, ImageFormatSupportPlugin, LibraryId, NativeLoader, PluginInit, PluginManager, PluginManagerError,
    PLUGIN_INIT_SYMBOL,
};
pub use self::registry::{Handle, Registry};
