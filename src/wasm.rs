//! WASM bindings for the content script

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::config::HitsConfig;
use crate::error::HitsError;
use crate::hits::controller::HitsController;
use crate::hits::record::HitRecord;
use crate::host::{WebDom, WebScheduler};

/// Walk `value.a.b.c`, stopping at the first missing or null-ish step
fn get_path(value: &JsValue, path: &[&str]) -> Option<JsValue> {
    let mut current = value.clone();
    for key in path {
        if current.is_undefined() || current.is_null() {
            return None;
        }
        current = js_sys::Reflect::get(&current, &JsValue::from_str(key)).ok()?;
    }
    if current.is_undefined() || current.is_null() {
        None
    } else {
        Some(current)
    }
}

#[wasm_bindgen]
pub struct CssHitsCounter {
    inner: HitsController<WebDom, WebScheduler>,
}

#[wasm_bindgen]
impl CssHitsCounter {
    /// Create a counter bound to the current document. `config` is an
    /// optional partial `HitsConfig` object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<CssHitsCounter, JsValue> {
        let config = HitsConfig::from_js(config)?;
        let inner = HitsController::new(WebDom::new()?, WebScheduler::new()?, config)?;
        Ok(CssHitsCounter { inner })
    }

    /// Install the hits callback and start counting once the document is
    /// interactive. Throws if `callback` is not a function.
    #[wasm_bindgen]
    pub fn init(&self, callback: JsValue) -> Result<(), JsValue> {
        let callback: js_sys::Function = callback
            .dyn_into()
            .map_err(|_| HitsError::CallbackNotFunction)?;

        self.inner.init(move |hits: Vec<HitRecord>| {
            let value = match serde_wasm_bindgen::to_value(&hits) {
                Ok(value) => value,
                Err(e) => {
                    console_error!("[CssHits] Failed to serialize hits: {}", e);
                    return;
                }
            };
            if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                console_error!("[CssHits] Hits callback threw: {:?}", e);
            }
        })?;
        Ok(())
    }

    /// Report an element affected by an extended-css rule.
    /// Expects `{ node, rule: { style: { content } } }`; anything else is ignored.
    #[wasm_bindgen(js_name = countAffectedByExtendedCss)]
    pub fn count_affected_by_extended_css(&self, affected: JsValue) {
        let Some(node) = get_path(&affected, &["node"]).and_then(|n| n.dyn_into::<web_sys::Node>().ok())
        else {
            return;
        };
        let Some(content) = get_path(&affected, &["rule", "style", "content"]).and_then(|c| c.as_string())
        else {
            return;
        };
        if !content.is_empty() {
            self.inner.report_external_match(&node, &content);
        }
    }

    /// Request a full rescan; false if one is running or counting has not started
    #[wasm_bindgen]
    pub fn rescan(&self) -> bool {
        self.inner.rescan()
    }

    /// Stop observing the document
    #[wasm_bindgen]
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Diagnostics counters as a plain object
    #[wasm_bindgen(js_name = getStats)]
    pub fn get_stats(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.stats())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
