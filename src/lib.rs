// Naming and graph model
pub mod naming;
pub mod program;
pub mod graph_walker;
pub mod binding_store;

// Host surface
pub mod events;
pub mod workspace;
pub mod config;
pub mod diagnostics;

// Resolution
pub mod creation_namer;
pub mod resolver;
pub mod engine;
pub mod session;
pub mod scenario;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
