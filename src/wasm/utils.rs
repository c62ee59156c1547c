//! WASM utility functions

use crate::error::SyncError;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser
#[wasm_bindgen(js_name = initPanicHook)]
pub fn init_panic_hook() {
    #[cfg(feature = "wasm")]
    console_error_panic_hook::set_once();
}

/// Turn a core error into a JavaScript exception value
pub fn to_js_error(err: SyncError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))
}
