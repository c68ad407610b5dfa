//! Name-keyed, dynamically typed parameters handed to plugins in place of a fixed argument list.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SimageError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    Integer,
    Float,
    Double,
    String,
    Pointer,
    Function,
}

impl ParamType {

    /// Booleans share the integer tag: a bool set is an integer get and vice versa.
    pub const BOOL: ParamType = ParamType::Integer;
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Integer => "integer",
            ParamType::Float => "float",
            ParamType::Double => "double",
            ParamType::String => "string",
            ParamType::Pointer => "pointer",
            ParamType::Function => "function",
        };
        f.write_str(name)
    }
}

pub type ParamCallback = Arc<dyn Fn(&ParamBag) -> i32 + Send + Sync>;

/// A single parameter value. Strings are owned by the bag, pointers and functions are shared references.
#[derive(Clone)]
pub enum ParamValue {
    Integer(i32),
    Float(f32),
    Double(f64),
    String(String),
    Pointer(Arc<dyn Any + Send + Sync>),
    Function(ParamCallback),
}

impl ParamValue {

    pub fn pointer<T: Any + Send + Sync>(value: T) -> Self {
        ParamValue::Pointer(Arc::new(value))
    }

    pub fn function<F>(callback: F) -> Self where F: Fn(&ParamBag) -> i32 + Send + Sync + 'static {
        ParamValue::Function(Arc::new(callback))
    }

    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Integer(_) => ParamType::Integer,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Double(_) => ParamType::Double,
            ParamValue::String(_) => ParamType::String,
            ParamValue::Pointer(_) => ParamType::Pointer,
            ParamValue::Function(_) => ParamType::Function,
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => f.debug_tuple("Integer").field(v).finish(),
            ParamValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            ParamValue::Double(v) => f.debug_tuple("Double").field(v).finish(),
            ParamValue::String(v) => f.debug_tuple("String").field(v).finish(),
            ParamValue::Pointer(v) => write!(f, "Pointer({:p})", Arc::as_ptr(v)),
            ParamValue::Function(v) => write!(f, "Function({:p})", Arc::as_ptr(v)),
        }
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Integer(if value { 1 } else { 0 })
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Float(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Double(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

/// Insertion-ordered parameter bag.
///
/// Setting a name that is already present replaces the value in place, so lookups always
/// see the most recent `set`. Lookups are type checked: asking for a name with a different
/// type than the one stored reports the parameter as missing instead of reinterpreting it.
/// Use [`ParamBag::check`] when the difference between "missing" and "wrong type" matters.
#[derive(Clone, Debug, Default)]
pub struct ParamBag {
    entries: Vec<(String, ParamValue)>,
}

impl ParamBag {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        self
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str, param_type: ParamType) -> Option<&ParamValue> {
        self.lookup(name).filter(|value| value.param_type() == param_type)
    }

    pub fn check(&self, name: &str, expected: ParamType) -> Result<()> {
        match self.lookup(name) {
            Some(value) if value.param_type() != expected => Err(SimageError::ParamTypeMismatch {
                name: name.to_string(),
                expected,
                actual: value.param_type(),
            }),
            _ => Ok(()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.get(name, ParamType::Integer) {
            Some(ParamValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int_or(&self, name: &str, default: i32) -> i32 {
        self.get_int(name).unwrap_or(default)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_int(name).map(|v| v != 0)
    }

    pub fn get_bool_or(&self, name: &str, default: bool) -> bool {
        self.get_bool(name).unwrap_or(default)
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.get(name, ParamType::Float) {
            Some(ParamValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        match self.get(name, ParamType::Double) {
            Some(ParamValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name, ParamType::String) {
            Some(ParamValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the shared pointer if it is present and actually points to a `T`.
    pub fn get_pointer<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        match self.get(name, ParamType::Pointer) {
            Some(ParamValue::Pointer(v)) => v.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn get_function(&self, name: &str) -> Option<ParamCallback> {
        match self.get(name, ParamType::Function) {
            Some(ParamValue::Function(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_previous_value() {
        let mut params = ParamBag::new();
        params.set("x", 5);
        params.set("x", 7);

        assert_eq!(params.get_int("x"), Some(7));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn overwrite_keeps_insertion_position() {
        let params = ParamBag::new()
            .with("width", 320)
            .with("height", 240)
            .with("width", 640);

        let names: Vec<&str> = params.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["width", "height"]);
        assert_eq!(params.get_int("width"), Some(640));
    }

    #[test]
    fn mismatched_type_is_reported_as_missing() {
        let params = ParamBag::new()
            .with("quality", 0.75f32)
            .with("mime-type", "video/mpeg");

        assert_eq!(params.get_int("quality"), None);
        assert_eq!(params.get_double("quality"), None);
        assert_eq!(params.get_float("quality"), Some(0.75));
        assert!(params.get("mime-type", ParamType::Integer).is_none());
        assert_eq!(params.get_string("mime-type"), Some("video/mpeg"));
    }

    #[test]
    fn check_distinguishes_mismatch_from_missing() {
        let params = ParamBag::new().with("fps", 25);

        assert!(params.check("fps", ParamType::Integer).is_ok());
        assert!(params.check("missing", ParamType::String).is_ok());
        match params.check("fps", ParamType::String) {
            Err(SimageError::ParamTypeMismatch { name, expected, actual }) => {
                assert_eq!(name, "fps");
                assert_eq!(expected, ParamType::String);
                assert_eq!(actual, ParamType::Integer);
            },
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn bool_shares_integer_tag() {
        let params = ParamBag::new()
            .with("allow image modification", true)
            .with("frames", 3);

        assert_eq!(params.get_int("allow image modification"), Some(1));
        assert_eq!(params.get_bool("frames"), Some(true));
        assert!(params.get_bool_or("missing", true));
        assert_eq!(params.get_int_or("missing", 4), 4);
    }

    #[test]
    fn copy_is_independent_of_original() {
        let original = ParamBag::new()
            .with("file type", "png")
            .with("width", 10);

        let mut copy = original.clone();
        copy.set("file type", "tiff");
        copy.set("height", 20);
        copy.remove("width");

        assert_eq!(original.get_string("file type"), Some("png"));
        assert_eq!(original.get_int("width"), Some(10));
        assert!(!original.contains("height"));
        assert_eq!(copy.get_string("file type"), Some("tiff"));
    }

    #[test]
    fn pointers_are_shared_not_copied() {
        let params = ParamBag::new().with("palette", ParamValue::pointer(vec![1u8, 2, 3]));
        let copy = params.clone();

        let a = params.get_pointer::<Vec<u8>>("palette").expect("pointer should be present");
        let b = copy.get_pointer::<Vec<u8>>("palette").expect("pointer should be present");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(params.get_pointer::<String>("palette").is_none());
    }

    #[test]
    fn function_params_can_be_called() {
        let params = ParamBag::new()
            .with("progress", ParamValue::function(|bag: &ParamBag| bag.get_int_or("done", 0) * 2))
            .with("done", 21);

        let callback = params.get_function("progress").expect("callback should be present");
        assert_eq!(callback(&params), 42);
    }
}
