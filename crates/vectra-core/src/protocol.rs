//! Messages exchanged with isolated history and compiler engines.
//!
//! The same types travel over a native worker thread's channel and, as JSON,
//! across a web worker's `postMessage` boundary.

use serde::{Deserialize, Serialize};

use crate::compiler::{Compiler, CompilerOptions};
use crate::history::{BackendKind, HistoryConfig, HistoryManager};

/// Requests sent to the history engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryRequest {
    /// Reset to a single entry
    Init { snapshot: String },
    /// Record a snapshot
    Push { snapshot: String },
    Undo { id: u64 },
    Redo { id: u64 },
    /// Ask for the current state
    Status { id: u64 },
}

/// Events emitted by the history engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// The engine booted and accepts requests
    Ready,
    /// Answer to an undo or redo; `None` when there was nothing to restore
    Restored {
        id: u64,
        snapshot: Option<String>,
    },
    /// Cursor state after a request
    State {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        can_undo: bool,
        can_redo: bool,
        backend: BackendKind,
    },
    /// A message could not be handled
    Error { message: String },
}

/// Requests sent to the compiler engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompilerRequest {
    Compile { id: u64, source: String },
}

/// Events emitted by the compiler engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompilerEvent {
    Ready,
    Compiled { id: u64, output: String },
}

/// An engine that runs in its own execution context.
pub trait Endpoint {
    type Request;
    type Event;

    /// The event announcing that the engine has booted.
    fn ready(&self) -> Self::Event;

    /// Handle one request, producing the events to send back in order.
    fn handle(&mut self, request: Self::Request) -> Vec<Self::Event>;
}

/// History engine behind a message boundary.
#[derive(Debug, Default)]
pub struct HistoryEndpoint {
    manager: HistoryManager,
}

impl HistoryEndpoint {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            manager: HistoryManager::new(config),
        }
    }

    pub fn manager(&self) -> &HistoryManager {
        &self.manager
    }

    fn state(&self, id: Option<u64>) -> HistoryEvent {
        HistoryEvent::State {
            id,
            can_undo: self.manager.can_undo(),
            can_redo: self.manager.can_redo(),
            backend: self.manager.backend(),
        }
    }

    /// Handle a JSON-encoded request. Malformed input yields an error event.
    pub fn handle_json(&mut self, message: &str) -> Vec<HistoryEvent> {
        match serde_json::from_str(message) {
            Ok(request) => self.handle(request),
            Err(e) => {
                log::warn!("Failed to parse history request: {}", e);
                vec![HistoryEvent::Error {
                    message: format!("Invalid request: {}", e),
                }]
            }
        }
    }
}

impl Endpoint for HistoryEndpoint {
    type Request = HistoryRequest;
    type Event = HistoryEvent;

    fn ready(&self) -> HistoryEvent {
        HistoryEvent::Ready
    }

    fn handle(&mut self, request: HistoryRequest) -> Vec<HistoryEvent> {
        match request {
            HistoryRequest::Init { snapshot } => {
                self.manager.init(&snapshot);
                vec![self.state(None)]
            }
            HistoryRequest::Push { snapshot } => {
                self.manager.push(&snapshot);
                vec![self.state(None)]
            }
            HistoryRequest::Undo { id } => {
                let snapshot = self.manager.undo();
                vec![HistoryEvent::Restored { id, snapshot }, self.state(Some(id))]
            }
            HistoryRequest::Redo { id } => {
                let snapshot = self.manager.redo();
                vec![HistoryEvent::Restored { id, snapshot }, self.state(Some(id))]
            }
            HistoryRequest::Status { id } => vec![self.state(Some(id))],
        }
    }
}

/// Compiler engine behind a message boundary.
#[derive(Debug)]
pub struct CompilerEndpoint {
    compiler: Compiler,
}

impl CompilerEndpoint {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            compiler: Compiler::new(options),
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }
}

impl Endpoint for CompilerEndpoint {
    type Request = CompilerRequest;
    type Event = CompilerEvent;

    fn ready(&self) -> CompilerEvent {
        CompilerEvent::Ready
    }

    fn handle(&mut self, request: CompilerRequest) -> Vec<CompilerEvent> {
        match request {
            CompilerRequest::Compile { id, source } => {
                let output = self.compiler.compile(&source);
                vec![CompilerEvent::Compiled { id, output }]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&HistoryRequest::Undo { id: 7 }).unwrap();
        assert_eq!(json, r#"{"type":"undo","id":7}"#);

        let parsed: HistoryRequest =
            serde_json::from_str(r#"{"type":"push","snapshot":"{}"}"#).unwrap();
        assert_eq!(parsed, HistoryRequest::Push { snapshot: "{}".into() });
    }

    #[test]
    fn test_state_event_wire_format() {
        let event = HistoryEvent::State {
            id: None,
            can_undo: true,
            can_redo: false,
            backend: BackendKind::Compressed,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"state","can_undo":true,"can_redo":false,"backend":"compressed"}"#
        );
    }

    #[test]
    fn test_history_endpoint_sequence() {
        let mut endpoint = HistoryEndpoint::default();
        endpoint.handle(HistoryRequest::Init { snapshot: "a".into() });
        endpoint.handle(HistoryRequest::Push { snapshot: "b".into() });

        let events = endpoint.handle(HistoryRequest::Undo { id: 1 });
        assert_eq!(
            events,
            [
                HistoryEvent::Restored { id: 1, snapshot: Some("a".into()) },
                HistoryEvent::State {
                    id: Some(1),
                    can_undo: false,
                    can_redo: true,
                    backend: BackendKind::Compressed,
                },
            ]
        );

        let events = endpoint.handle(HistoryRequest::Undo { id: 2 });
        assert_eq!(events[0], HistoryEvent::Restored { id: 2, snapshot: None });
    }

    #[test]
    fn test_history_endpoint_rejects_bad_json() {
        let mut endpoint = HistoryEndpoint::default();
        let events = endpoint.handle_json(r#"{"type":"rewind"}"#);
        assert!(matches!(events.as_slice(), [HistoryEvent::Error { .. }]));
    }

    #[test]
    fn test_compiler_endpoint_echoes_id() {
        let mut endpoint = CompilerEndpoint::new(CompilerOptions::default());
        assert_eq!(endpoint.ready(), CompilerEvent::Ready);

        let events = endpoint.handle(CompilerRequest::Compile {
            id: 3,
            source: "const a: number = 1;".into(),
        });
        match events.as_slice() {
            [CompilerEvent::Compiled { id, output }] => {
                assert_eq!(*id, 3);
                assert_eq!(output.trim(), "const a = 1;");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }
}
