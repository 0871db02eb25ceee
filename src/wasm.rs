use std::cell::RefCell;

use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::scenario::{BindingSeed, NodeSeed, ScenarioRunner, Step};

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Identifier engine for the browser editor.
///
/// The editor forwards each user action as a JSON step (the same format the
/// CLI replays) and reads back bindings and diagnostics as JSON.
#[wasm_bindgen]
pub struct WasmIdentityEngine {
    inner: RefCell<ScenarioRunner>,
}

#[wasm_bindgen]
impl WasmIdentityEngine {
    /// Create an engine. An empty or invalid config falls back to the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Self {
        let config = if config_json.trim().is_empty() {
            EngineConfig::default()
        } else {
            EngineConfig::from_json(config_json).unwrap_or_else(|e| {
                log::error!("Invalid engine config, using defaults: {}", e);
                EngineConfig::default()
            })
        };
        Self {
            inner: RefCell::new(ScenarioRunner::new(config)),
        }
    }

    /// Restore a saved program. Takes `{ bindings, program }` JSON.
    /// Returns true if it loaded.
    pub fn load_program(&self, json: &str) -> bool {
        #[derive(serde::Deserialize)]
        struct Saved {
            #[serde(default)]
            bindings: Vec<BindingSeed>,
            #[serde(default)]
            program: Vec<NodeSeed>,
        }

        let saved: Saved = match serde_json::from_str(json) {
            Ok(saved) => saved,
            Err(e) => {
                log::error!("Failed to parse saved program: {}", e);
                return false;
            }
        };
        match self.inner.borrow_mut().load(&saved.bindings, &saved.program) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to load program: {}", e);
                false
            }
        }
    }

    /// Apply one editor action. Returns true if it was applied.
    pub fn apply_step(&self, json: &str) -> bool {
        let step: Step = match serde_json::from_str(json) {
            Ok(step) => step,
            Err(e) => {
                log::error!("Failed to parse step: {}", e);
                return false;
            }
        };
        match self.inner.borrow_mut().apply_step(&step) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Step rejected: {}", e);
                false
            }
        }
    }

    /// Current bindings, nodes and families as JSON.
    pub fn report_json(&self) -> String {
        let report = self.inner.borrow().report();
        serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string())
    }

    /// Drain pending engine diagnostics as JSON.
    pub fn take_diagnostics_json(&self) -> String {
        let diags = self.inner.borrow_mut().session.engine.take_diagnostics();
        serde_json::to_string(&diags).unwrap_or_else(|_| "[]".to_string())
    }
}
