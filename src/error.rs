//! Error type shared by the controller, the config layer and the WASM bindings

use wasm_bindgen::JsValue;

/// CssHits errors
///
/// Foreign or malformed marker values are never errors; they are silently
/// skipped by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum HitsError {
    /// `init` was given something that cannot be called
    CallbackNotFunction,
    /// `init` was called on a controller that already owns a callback
    AlreadyInitialized,
    /// Configuration values that cannot drive a scan
    InvalidConfig(String),
    /// Configuration could not be deserialized
    Config(String),
    /// No `window`/`document` in the current global scope
    NoDocument,
}

impl std::fmt::Display for HitsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HitsError::CallbackNotFunction => {
                write!(f, "AdGuard Extension: \"callback\" parameter is not a function")
            }
            HitsError::AlreadyInitialized => write!(f, "CSS hits counter is already initialized"),
            HitsError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            HitsError::Config(msg) => write!(f, "Failed to parse config: {}", msg),
            HitsError::NoDocument => write!(f, "No document available in this context"),
        }
    }
}

impl std::error::Error for HitsError {}

impl From<HitsError> for JsValue {
    fn from(err: HitsError) -> Self {
        js_sys::Error::new(&err.to_string()).into()
    }
}
