//! Console logging
//!
//! Lines go to `web_sys::console` on wasm32. Native builds (tests, headless
//! hosts) have no console to write to, so the macros only type-check their
//! arguments there.

macro_rules! console_log {
    ($($arg:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::log_1(&wasm_bindgen::JsValue::from_str(&format!($($arg)*)));
        #[cfg(not(target_arch = "wasm32"))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! console_error {
    ($($arg:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::error_1(&wasm_bindgen::JsValue::from_str(&format!($($arg)*)));
        #[cfg(not(target_arch = "wasm32"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Verbose line, emitted only when the config asks for it
macro_rules! debug_log {
    ($config:expr, $($arg:tt)*) => {{
        if $config.debug {
            console_log!($($arg)*);
        }
    }};
}
