//! Dedicated-thread workers for the history and compiler engines.
//!
//! Each worker owns one engine instance on a background thread and talks to
//! the host over a pair of channels. The request channel is FIFO, so requests
//! are handled in the order they were sent.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::compiler::{CompilerOptions, fallback_module};
use crate::history::{HistoryConfig, HistoryError, HistoryResult, HistoryStore, LocalStore};
use crate::protocol::{
    CompilerEndpoint, CompilerEvent, CompilerRequest, Endpoint, HistoryEndpoint, HistoryEvent,
    HistoryRequest,
};

/// Default time a host waits for a compile result.
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(3);

/// Worker errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
    #[error("Worker disconnected")]
    Disconnected,
    #[error("Worker did not respond in time")]
    Timeout,
}

/// Commands sent to the worker thread.
enum Command<R> {
    Request(R),
    Shutdown,
}

/// An engine running on its own thread.
pub struct Worker<E: Endpoint> {
    cmd_tx: Option<Sender<Command<E::Request>>>,
    event_rx: Receiver<E::Event>,
    _thread: Option<JoinHandle<()>>,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E> Worker<E>
where
    E: Endpoint + 'static,
    E::Request: Send + 'static,
    E::Event: Send + 'static,
{
    /// Start a worker thread. `boot` builds the engine on that thread, after
    /// which the worker emits the engine's ready event.
    pub fn spawn<F>(name: &str, boot: F) -> Result<Self, WorkerError>
    where
        F: FnOnce() -> E + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = channel::<Command<E::Request>>();
        let (event_tx, event_rx) = channel::<E::Event>();

        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut endpoint = boot();
                log::info!("Worker {} ready", thread_name);
                if event_tx.send(endpoint.ready()).is_err() {
                    return;
                }
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        Command::Request(request) => {
                            for event in endpoint.handle(request) {
                                if event_tx.send(event).is_err() {
                                    log::info!("Worker {} host went away", thread_name);
                                    return;
                                }
                            }
                        }
                        Command::Shutdown => break,
                    }
                }
                log::info!("Worker {} exiting", thread_name);
            })
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            event_rx,
            _thread: Some(handle),
            _endpoint: PhantomData,
        })
    }

    /// Queue a request.
    pub fn send(&self, request: E::Request) -> Result<(), WorkerError> {
        let tx = self.cmd_tx.as_ref().ok_or(WorkerError::Disconnected)?;
        tx.send(Command::Request(request))
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Next event if one is waiting (non-blocking).
    pub fn try_recv(&self) -> Result<Option<E::Event>, WorkerError> {
        match self.event_rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<E::Event, WorkerError> {
        self.event_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WorkerError::Timeout,
            RecvTimeoutError::Disconnected => WorkerError::Disconnected,
        })
    }
}

impl<E: Endpoint> Drop for Worker<E> {
    fn drop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Shutdown);
        }
        self._thread = None;
    }
}

/// Handle for an undo or redo whose answer may arrive later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// A resolved undo or redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    pub ticket: Ticket,
    /// `None` when there was nothing to restore.
    pub snapshot: Option<String>,
}

/// Host side of an isolated history engine.
///
/// Until the worker reports ready, a [`LocalStore`] answers every call. On
/// ready the local history is replayed into the worker and the local store
/// is dropped. If the worker is lost later, a fresh local store seeded with
/// the last known snapshot takes over; entries held only by the worker are
/// gone.
pub struct HistoryClient {
    worker: Option<Worker<HistoryEndpoint>>,
    local: Option<LocalStore>,
    resolved: VecDeque<Restored>,
    next_id: u64,
    max_entries: usize,
    /// Snapshot the host was last told is current.
    current: String,
    /// Undo or redo sent since the last push, if any.
    last_step: Option<u64>,
    can_undo: bool,
    can_redo: bool,
}

impl HistoryClient {
    /// Spawn a history worker seeded with `initial`.
    pub fn spawn(config: HistoryConfig, initial: &str) -> Self {
        let worker = Worker::spawn("vectra-history", move || HistoryEndpoint::new(config))
            .inspect_err(|e| log::warn!("History worker unavailable, using local history: {}", e))
            .ok();
        Self::with_worker(worker, config, initial)
    }

    /// Build a client around an existing worker, or none for local-only
    /// history.
    pub fn with_worker(
        worker: Option<Worker<HistoryEndpoint>>,
        config: HistoryConfig,
        initial: &str,
    ) -> Self {
        Self {
            worker,
            local: Some(LocalStore::with_seed(config.max_entries, initial)),
            resolved: VecDeque::new(),
            next_id: 1,
            max_entries: config.max_entries,
            current: initial.to_string(),
            last_step: None,
            can_undo: false,
            can_redo: false,
        }
    }

    /// Whether requests are going to the worker.
    pub fn is_ready(&self) -> bool {
        self.local.is_none() && self.worker.is_some()
    }

    fn ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_id);
        self.next_id += 1;
        ticket
    }

    /// Drain events that have already arrived.
    fn pump(&mut self) {
        loop {
            let Some(worker) = &self.worker else { return };
            match worker.try_recv() {
                Ok(Some(event)) => self.apply(event),
                Ok(None) => return,
                Err(e) => {
                    self.lose_worker(e);
                    return;
                }
            }
        }
    }

    fn apply(&mut self, event: HistoryEvent) {
        match event {
            HistoryEvent::Ready => self.hand_off(),
            HistoryEvent::Restored { id, snapshot } => {
                if self.last_step == Some(id) {
                    if let Some(snapshot) = &snapshot {
                        self.current.clone_from(snapshot);
                    }
                    self.last_step = None;
                }
                self.resolved.push_back(Restored {
                    ticket: Ticket(id),
                    snapshot,
                });
            }
            HistoryEvent::State {
                can_undo, can_redo, ..
            } => {
                self.can_undo = can_undo;
                self.can_redo = can_redo;
            }
            HistoryEvent::Error { message } => log::warn!("History worker error: {}", message),
        }
    }

    /// Replay the local history into the worker.
    fn hand_off(&mut self) {
        if self.worker.is_none() {
            return;
        }
        let Some(local) = self.local.take() else {
            return;
        };
        let Some(worker) = &self.worker else {
            return;
        };
        let entries: Vec<String> = local.reachable().map(str::to_string).collect();
        let Some((first, rest)) = entries.split_first() else {
            return;
        };
        let mut requests = vec![HistoryRequest::Init {
            snapshot: first.clone(),
        }];
        requests.extend(rest.iter().map(|s| HistoryRequest::Push {
            snapshot: s.clone(),
        }));
        if let Some(last) = entries.last() {
            self.current.clone_from(last);
        }
        let count = requests.len();
        if let Err(e) = requests.into_iter().try_for_each(|r| worker.send(r)) {
            // Nothing was lost yet; keep serving from the local store.
            self.local = Some(local);
            self.lose_worker(e);
            return;
        }
        log::info!("History worker ready, replayed {} entries", count);
    }

    fn lose_worker(&mut self, err: WorkerError) {
        log::warn!("History worker lost: {}", err);
        self.worker = None;
        self.last_step = None;
        if self.local.is_none() {
            log::warn!("Continuing with local history from the last known snapshot");
            self.local = Some(LocalStore::with_seed(self.max_entries, &self.current));
            self.can_undo = false;
            self.can_redo = false;
        }
    }

    /// Record a snapshot.
    pub fn push(&mut self, snapshot: &str) {
        self.pump();
        self.current = snapshot.to_string();
        self.last_step = None;
        if self.local.is_none() {
            let sent = match &self.worker {
                Some(worker) => worker.send(HistoryRequest::Push {
                    snapshot: snapshot.to_string(),
                }),
                None => Err(WorkerError::Disconnected),
            };
            match sent {
                Ok(()) => {
                    self.can_undo = true;
                    self.can_redo = false;
                    return;
                }
                Err(e) => self.lose_worker(e),
            }
        }
        if let Some(local) = &mut self.local {
            log::debug!("History push served locally");
            // LocalStore::push cannot fail.
            let _ = local.push(snapshot);
            self.can_undo = local.can_undo();
            self.can_redo = local.can_redo();
        }
    }

    /// Request an undo. The answer is delivered through [`poll`](Self::poll)
    /// or [`wait`](Self::wait).
    pub fn undo(&mut self) -> Ticket {
        self.step(true)
    }

    /// Request a redo.
    pub fn redo(&mut self) -> Ticket {
        self.step(false)
    }

    fn step(&mut self, back: bool) -> Ticket {
        self.pump();
        let ticket = self.ticket();
        if self.local.is_none() {
            let request = if back {
                HistoryRequest::Undo { id: ticket.0 }
            } else {
                HistoryRequest::Redo { id: ticket.0 }
            };
            let sent = match &self.worker {
                Some(worker) => worker.send(request),
                None => Err(WorkerError::Disconnected),
            };
            match sent {
                Ok(()) => {
                    self.last_step = Some(ticket.0);
                    return ticket;
                }
                Err(e) => self.lose_worker(e),
            }
        }
        let snapshot = match &mut self.local {
            Some(local) => {
                let snapshot = if back { local.undo() } else { local.redo() }.unwrap_or_default();
                self.can_undo = local.can_undo();
                self.can_redo = local.can_redo();
                snapshot
            }
            None => None,
        };
        if let Some(snapshot) = &snapshot {
            self.current.clone_from(snapshot);
        }
        self.resolved.push_back(Restored { ticket, snapshot });
        ticket
    }

    /// Resolved undos and redos, in the order they were answered.
    pub fn poll(&mut self) -> Vec<Restored> {
        self.pump();
        self.resolved.drain(..).collect()
    }

    /// Block until `ticket` resolves or `timeout` passes.
    pub fn wait(&mut self, ticket: Ticket, timeout: Duration) -> HistoryResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.resolved.iter().position(|r| r.ticket == ticket) {
                let restored = self.resolved.remove(pos);
                return Ok(restored.and_then(|r| r.snapshot));
            }
            let Some(worker) = &self.worker else {
                return Err(HistoryError::EngineUnavailable);
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match worker.recv_timeout(remaining) {
                Ok(event) => self.apply(event),
                Err(WorkerError::Timeout) => {
                    log::debug!("History ticket {} timed out", ticket.0);
                    return Err(HistoryError::EngineUnavailable);
                }
                Err(e) => {
                    self.lose_worker(e);
                    return Err(HistoryError::EngineUnavailable);
                }
            }
        }
    }

    /// Whether an undo is possible, as of the last answer from the engine.
    pub fn can_undo(&mut self) -> bool {
        self.pump();
        self.can_undo
    }

    /// Whether a redo is possible, as of the last answer from the engine.
    pub fn can_redo(&mut self) -> bool {
        self.pump();
        self.can_redo
    }
}

/// Host side of an isolated compiler engine.
pub struct CompilerClient {
    worker: Option<Worker<CompilerEndpoint>>,
    options: CompilerOptions,
    ready: bool,
    queued: Vec<CompilerRequest>,
    next_id: u64,
    timeout: Duration,
}

impl CompilerClient {
    /// Spawn a compiler worker.
    pub fn spawn(options: CompilerOptions) -> Self {
        let boot_options = options.clone();
        let worker = Worker::spawn("vectra-compiler", move || CompilerEndpoint::new(boot_options))
            .inspect_err(|e| log::warn!("Compiler worker unavailable: {}", e))
            .ok();
        Self::with_worker(worker, options)
    }

    /// Build a client around an existing worker.
    pub fn with_worker(worker: Option<Worker<CompilerEndpoint>>, options: CompilerOptions) -> Self {
        Self {
            worker,
            options,
            ready: false,
            queued: Vec::new(),
            next_id: 1,
            timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_ready(&self) -> bool {
        self.ready && self.worker.is_some()
    }

    /// Compile with the configured timeout.
    pub fn compile(&mut self, source: &str) -> String {
        self.compile_with_timeout(source, self.timeout)
    }

    /// Compile, returning the fallback module if no result arrives within
    /// `timeout`.
    pub fn compile_with_timeout(&mut self, source: &str, timeout: Duration) -> String {
        let id = self.next_id;
        self.next_id += 1;
        self.submit(CompilerRequest::Compile {
            id,
            source: source.to_string(),
        });

        let deadline = Instant::now() + timeout;
        loop {
            let Some(worker) = &self.worker else {
                return self.fallback("compiler worker unavailable");
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match worker.recv_timeout(remaining) {
                Ok(CompilerEvent::Ready) => self.on_ready(),
                Ok(CompilerEvent::Compiled { id: got, output }) if got == id => return output,
                Ok(CompilerEvent::Compiled { id: stale, .. }) => {
                    log::debug!("Discarding stale compile result {}", stale);
                }
                Err(WorkerError::Timeout) => {
                    log::warn!("Compile {} timed out after {:?}", id, timeout);
                    return self.fallback(&format!("compilation timed out after {timeout:?}"));
                }
                Err(e) => {
                    log::warn!("Compiler worker lost: {}", e);
                    self.worker = None;
                    return self.fallback("compiler worker unavailable");
                }
            }
        }
    }

    fn submit(&mut self, request: CompilerRequest) {
        if !self.ready {
            self.queued.push(request);
            return;
        }
        let sent = match &self.worker {
            Some(worker) => worker.send(request),
            None => return,
        };
        if sent.is_err() {
            log::warn!("Compiler worker lost while sending");
            self.worker = None;
        }
    }

    fn on_ready(&mut self) {
        self.ready = true;
        log::info!("Compiler worker ready, sending {} queued requests", self.queued.len());
        for request in std::mem::take(&mut self.queued) {
            self.submit(request);
        }
    }

    fn fallback(&self, message: &str) -> String {
        fallback_module(message, &self.options)
    }
}
