//! CssHits: Style-injection hit detection for content blocking
//!
//! A Rust/WASM implementation of the content-script side of CSS hit counting.
//! Cosmetic rules are injected with a `content: 'adguard{filterId};{ruleText}'`
//! marker; this crate finds the elements those rules actually affected and
//! reports each (element, rule) pair exactly once.
//!
//! # Architecture
//!
//! ## Hit Detection (`hits`)
//! - `marker.rs` - MarkerCodec: decode/encode rule provenance in style markers
//! - `signature.rs` - ElementSignature: `<tag attr="...">` snapshots for reports
//! - `index.rs` - HitIndex: identity-keyed, non-owning dedup table
//! - `detector.rs` - HitDetector: decode → dedup → signature for a set of nodes
//! - `batch.rs` - BatchScanner: chunked full-document walk with yields
//! - `reactor.rs` - MutationReactor: probe handling + debounced rescans
//! - `controller.rs` - HitsController: callback ownership and startup wiring
//!
//! ## Host Platform (`host`)
//! - `mod.rs` - `Dom` and `Scheduler` traits the engine runs against
//! - `memory.rs` - MemoryDom: in-memory document with a tiny style cascade
//! - `clock.rs` - VirtualClock: deterministic timer queue
//! - `web.rs` - WebDom/WebScheduler: browser implementation over `web-sys`
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { CssHitsCounter } from 'css-hits';
//!
//! await init();
//!
//! const counter = new CssHitsCounter({ batchSize: 25, rescanDebounceMs: 500 });
//! counter.init((hits) => {
//!   // [{ filterId: 2, ruleText: 'example.org##.banner', element: '<div class="banner">' }]
//!   browser.runtime.sendMessage({ type: 'saveCssHitStats', stats: hits });
//! });
//!
//! // Called by the extended-css engine for every element it affected
//! counter.countAffectedByExtendedCss(affectedEl);
//! ```

#[macro_use]
mod log;

pub mod config;
pub mod error;
pub mod hits;
pub mod host;
pub mod wasm;

pub use config::*;
pub use error::*;
pub use hits::*;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("css-hits v{}", env!("CARGO_PKG_VERSION"))
}
