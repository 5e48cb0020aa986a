//! History and compiler engines running on worker threads.

#![cfg(not(target_arch = "wasm32"))]

use std::thread;
use std::time::{Duration, Instant};

use vectra_core::{
    COMPILE_ERROR_MARKER, CompilerClient, CompilerEndpoint, CompilerOptions, HistoryClient,
    HistoryConfig, Worker,
};

const WAIT: Duration = Duration::from_secs(5);

fn wait_until_ready(client: &mut HistoryClient) {
    let deadline = Instant::now() + WAIT;
    while !client.is_ready() {
        assert!(Instant::now() < deadline, "history worker never became ready");
        client.poll();
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_undo_before_ready_is_served_locally() {
    let mut client = HistoryClient::spawn(HistoryConfig::default(), "s0");
    client.push("s1");

    let ticket = client.undo();
    assert_eq!(client.wait(ticket, WAIT).unwrap().as_deref(), Some("s0"));
}

#[test]
fn test_local_history_is_replayed_on_ready() {
    let mut client = HistoryClient::spawn(HistoryConfig::default(), "s0");
    client.push("s1");
    client.push("s2");
    let ticket = client.undo();
    client.wait(ticket, WAIT).unwrap();

    wait_until_ready(&mut client);

    // The redo branch ("s2") is not carried over.
    let ticket = client.redo();
    assert_eq!(client.wait(ticket, WAIT).unwrap(), None);
    let ticket = client.undo();
    assert_eq!(client.wait(ticket, WAIT).unwrap().as_deref(), Some("s0"));
}

#[test]
fn test_push_then_undo_resolve_in_order() {
    let mut client = HistoryClient::spawn(HistoryConfig::default(), "s0");
    wait_until_ready(&mut client);

    client.push("s1");
    client.push("s2");
    let first = client.undo();
    let second = client.undo();
    let third = client.undo();

    assert_eq!(client.wait(second, WAIT).unwrap().as_deref(), Some("s0"));
    assert_eq!(client.wait(first, WAIT).unwrap().as_deref(), Some("s1"));
    assert_eq!(client.wait(third, WAIT).unwrap(), None);
    assert!(!client.can_undo());
    assert!(client.can_redo());
}

#[test]
fn test_poll_drains_answers() {
    let mut client = HistoryClient::spawn(HistoryConfig::default(), "s0");
    wait_until_ready(&mut client);
    client.push("s1");
    let ticket = client.undo();

    let deadline = Instant::now() + WAIT;
    let restored = loop {
        let mut answers = client.poll();
        if let Some(answer) = answers.pop() {
            break answer;
        }
        assert!(Instant::now() < deadline, "undo was never answered");
        thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(restored.ticket, ticket);
    assert_eq!(restored.snapshot.as_deref(), Some("s0"));
}

#[test]
fn test_compile_on_worker() {
    let mut client = CompilerClient::spawn(CompilerOptions::default());
    let output = client.compile_with_timeout("const x: number = 1;", WAIT);
    assert_eq!(output.trim(), "const x = 1;");
    assert!(client.is_ready());
}

#[test]
fn test_compile_timeout_and_late_result() {
    let options = CompilerOptions::default();
    let boot_options = options.clone();
    let worker = Worker::spawn("slow-compiler", move || {
        thread::sleep(Duration::from_millis(300));
        CompilerEndpoint::new(boot_options)
    })
    .unwrap();
    let mut client = CompilerClient::with_worker(Some(worker), options);

    let first = client.compile_with_timeout("const a: string = 'late';", Duration::from_millis(20));
    assert!(first.contains(COMPILE_ERROR_MARKER));
    assert!(first.contains("timed out"));

    // The first request is answered first and must not be taken for this one.
    let second = client.compile_with_timeout("const b: number = 2;", WAIT);
    assert_eq!(second.trim(), "const b = 2;");
}
