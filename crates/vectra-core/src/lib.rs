//! Vectra Core Library
//!
//! Engines a browser-based design tool offloads from its UI thread: snapping
//! for drag gestures, compressed undo history, and a component compiler.

pub mod compiler;
pub mod history;
pub mod layout;
pub mod protocol;
pub mod snap;

#[cfg(not(target_arch = "wasm32"))]
pub mod worker;

pub use compiler::{COMPILE_ERROR_MARKER, CompileStats, Compiler, CompilerOptions};
pub use history::{
    BackendKind, CompressedStore, DocumentSnapshot, HistoryConfig, HistoryError, HistoryManager,
    HistoryResult, HistoryStore, LocalStore, VectraNode,
};
pub use layout::{LayoutEngine, SnapConfig};
pub use protocol::{
    CompilerEndpoint, CompilerEvent, CompilerRequest, Endpoint, HistoryEndpoint, HistoryEvent,
    HistoryRequest,
};
pub use snap::{DEFAULT_SNAP_THRESHOLD, Guide, GuideType, Orientation, Rect, SnapIndex, SnapResult};

#[cfg(not(target_arch = "wasm32"))]
pub use worker::{CompilerClient, HistoryClient, Restored, Ticket, Worker, WorkerError};
