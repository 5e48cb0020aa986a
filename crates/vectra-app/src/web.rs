//! WebAssembly bindings.
//!
//! Each engine is exposed as a JavaScript class. Configuration objects may be
//! omitted or partial; missing fields take their defaults.

use serde::Serialize;
use serde::de::DeserializeOwned;
use vectra_core::{
    Compiler, CompilerEndpoint, CompilerEvent, CompilerOptions, CompilerRequest, Endpoint,
    HistoryConfig, HistoryEndpoint, HistoryEvent, HistoryManager, HistoryRequest, LayoutEngine,
    Rect, SnapConfig,
};
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn start() {
    // Set up panic hook for better error messages
    console_error_panic_hook::set_once();

    if console_log::init_with_level(log::Level::Info).is_err() {
        log::debug!("Logger already initialised");
    }
}

fn js_error(message: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&message.to_string()).into()
}

/// Deserialize an optional configuration object.
fn from_js_or_default<T: DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(js_error)
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(js_error)
}

/// Snapping for drag gestures.
#[wasm_bindgen(js_name = LayoutEngine)]
pub struct WasmLayoutEngine {
    inner: LayoutEngine,
}

#[wasm_bindgen(js_class = LayoutEngine)]
impl WasmLayoutEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmLayoutEngine, JsValue> {
        let config: SnapConfig = from_js_or_default(config)?;
        Ok(Self {
            inner: LayoutEngine::with_config(config),
        })
    }

    /// Replace the candidate rects, an array of `{x, y, w, h}`.
    pub fn sync(&mut self, rects: JsValue) -> Result<(), JsValue> {
        let rects: Vec<Rect> = serde_wasm_bindgen::from_value(rects).map_err(js_error)?;
        self.inner.sync(&rects);
        Ok(())
    }

    pub fn query(
        &self,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        threshold: Option<f64>,
    ) -> Result<JsValue, JsValue> {
        to_js(&self.inner.query(x, y, w, h, threshold))
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[wasm_bindgen(getter, js_name = candidateCount)]
    pub fn candidate_count(&self) -> usize {
        self.inner.candidate_count()
    }
}

/// Undo history kept on the calling thread.
#[wasm_bindgen(js_name = HistoryManager)]
pub struct WasmHistoryManager {
    inner: HistoryManager,
}

#[wasm_bindgen(js_class = HistoryManager)]
impl WasmHistoryManager {
    #[wasm_bindgen(constructor)]
    pub fn new(initial: &str, config: JsValue) -> Result<WasmHistoryManager, JsValue> {
        let config: HistoryConfig = from_js_or_default(config)?;
        Ok(Self {
            inner: HistoryManager::with_initial(config, initial),
        })
    }

    pub fn init(&mut self, initial: &str) {
        self.inner.init(initial);
    }

    pub fn push(&mut self, snapshot: &str) {
        self.inner.push(snapshot);
    }

    pub fn undo(&mut self) -> Option<String> {
        self.inner.undo()
    }

    pub fn redo(&mut self) -> Option<String> {
        self.inner.redo()
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.inner.can_undo()
    }

    #[wasm_bindgen(js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.inner.can_redo()
    }

    #[wasm_bindgen(getter)]
    pub fn backend(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.backend())
    }
}

/// Component compiler.
#[wasm_bindgen(js_name = Compiler)]
pub struct WasmCompiler {
    inner: Compiler,
}

#[wasm_bindgen(js_class = Compiler)]
impl WasmCompiler {
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<WasmCompiler, JsValue> {
        let options: CompilerOptions = from_js_or_default(options)?;
        Ok(Self {
            inner: Compiler::new(options),
        })
    }

    /// Compile a module. Never throws.
    pub fn compile(&mut self, source: &str) -> String {
        self.inner.compile(source)
    }

    #[wasm_bindgen(getter)]
    pub fn stats(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.stats())
    }
}

/// History engine for hosting inside a web worker.
///
/// The worker script posts `ready()` once, then passes every incoming
/// message to `handle` and posts back each returned event.
#[wasm_bindgen]
pub struct HistoryWorkerEndpoint {
    inner: HistoryEndpoint,
}

#[wasm_bindgen]
impl HistoryWorkerEndpoint {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<HistoryWorkerEndpoint, JsValue> {
        let config: HistoryConfig = from_js_or_default(config)?;
        log::info!("History worker endpoint ready");
        Ok(Self {
            inner: HistoryEndpoint::new(config),
        })
    }

    pub fn ready(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.ready())
    }

    /// Handle one request message, returning an array of events.
    pub fn handle(&mut self, message: JsValue) -> Result<JsValue, JsValue> {
        let events = match serde_wasm_bindgen::from_value::<HistoryRequest>(message) {
            Ok(request) => self.inner.handle(request),
            Err(e) => {
                log::warn!("Failed to parse history request: {}", e);
                vec![HistoryEvent::Error {
                    message: format!("Invalid request: {e}"),
                }]
            }
        };
        to_js(&events)
    }
}

/// Compiler engine for hosting inside a web worker.
#[wasm_bindgen]
pub struct CompilerWorkerEndpoint {
    inner: CompilerEndpoint,
}

#[wasm_bindgen]
impl CompilerWorkerEndpoint {
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<CompilerWorkerEndpoint, JsValue> {
        let options: CompilerOptions = from_js_or_default(options)?;
        log::info!("Compiler worker endpoint ready");
        Ok(Self {
            inner: CompilerEndpoint::new(options),
        })
    }

    pub fn ready(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.ready())
    }

    /// Handle one request message, returning an array of events.
    pub fn handle(&mut self, message: JsValue) -> Result<JsValue, JsValue> {
        let request: CompilerRequest = serde_wasm_bindgen::from_value(message).map_err(js_error)?;
        let events: Vec<CompilerEvent> = self.inner.handle(request);
        to_js(&events)
    }
}
