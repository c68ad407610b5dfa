use custom_error::custom_error;

use crate::models::io::ImageIOError;
use crate::params::ParamType;

custom_error! {pub SimageError
    NotSupported {description: String} = "Format not supported: {description}",
    OpenFailure {description: String} = "Failed to open file: {description}",
    PluginFailure {plugin: String, code: i32, description: String} = "{plugin} failed with code {code}: {description}",
    CapabilityUnsupported {operation: String} = "Operation is not supported by the backend: {operation}",
    ParamTypeMismatch {name: String, expected: ParamType, actual: ParamType} = "Parameter \"{name}\" is {actual}, not {expected}",
    InvalidImage {description: String} = "Invalid image: {description}",
    InvalidState {description: String} = "Invalid state: {description}",
    PluginLoad {description: String} = "Failed to load plugin: {description}",
}

impl SimageError {

    /// Converts an error reported by a plugin into a `PluginFailure` carrying the plugin's
    /// own code and message.
    pub fn from_plugin(plugin: &str, err: ImageIOError) -> Self {
        SimageError::PluginFailure {
            plugin: plugin.to_string(),
            code: err.code(),
            description: err.to_string(),
        }
    }

    /// Like [`SimageError::from_plugin`], for operations a plugin may leave out (seek, tell,
    /// line-by-line reading). Leaving one out is `CapabilityUnsupported`.
    pub fn from_optional_capability(plugin: &str, err: ImageIOError) -> Self {
        match err {
            ImageIOError::Unsupported { description } => SimageError::CapabilityUnsupported {
                operation: description,
            },
            other => Self::from_plugin(plugin, other),
        }
    }

    pub fn not_supported(description: impl Into<String>) -> Self {
        SimageError::NotSupported { description: description.into() }
    }

    pub fn invalid_state(description: impl Into<String>) -> Self {
        SimageError::InvalidState { description: description.into() }
    }

    pub fn invalid_image(description: impl Into<String>) -> Self {
        SimageError::InvalidImage { description: description.into() }
    }
}

pub type Result<T> = std::result::Result<T, SimageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_capability_is_capability_error() {
        let err = SimageError::from_optional_capability("PPM", ImageIOError::Unsupported {
            description: "seek".to_string(),
        });

        match err {
            SimageError::CapabilityUnsupported { operation } => assert_eq!(operation, "seek"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn unsupported_load_is_plugin_failure() {
        let err = SimageError::from_plugin("PPM", ImageIOError::unsupported("16 bit samples"));

        match err {
            SimageError::PluginFailure { plugin, description, .. } => {
                assert_eq!(plugin, "PPM");
                assert!(description.contains("16 bit samples"));
            },
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn plugin_failure_keeps_code_and_message() {
        let err = SimageError::from_plugin("TIFF", ImageIOError::FailedToOpen {
            description: "no such file".to_string(),
        });

        match err {
            SimageError::PluginFailure { plugin, code, description } => {
                assert_eq!(plugin, "TIFF");
                assert_eq!(code, 1);
                assert!(description.contains("no such file"));
            },
            other => panic!("unexpected error: {}", other),
        }
    }
}
