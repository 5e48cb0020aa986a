//! Vectra Application
//!
//! Shell around the engine crate: JavaScript bindings for the browser build
//! and the `vectra` command-line tool for native builds.

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(not(target_arch = "wasm32"))]
pub use cli::{Cli, CliError, Command, run};

#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use web::{
    CompilerWorkerEndpoint, HistoryWorkerEndpoint, WasmCompiler, WasmHistoryManager,
    WasmLayoutEngine,
};
