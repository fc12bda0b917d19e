//! Process isolation end to end: this binary is its own worker.
//!
//! Every re-executed copy builds the same table and calls `Runner::run`,
//! which serves the test named in the environment and exits.

use cronometro::worker::WORKER_DATA_ENV;
use cronometro::{
    Done, ProcessIsolation, RunOptions, Runner, Tests, WorkerData, WorkerKind, WorkerMessage,
    WorkerSettings,
};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

fn table() -> Tests {
    Tests::new()
        .sync("passes", || {
            println!("output from the test body");
            Ok(())
        })
        .sync("fails", || anyhow::bail!("FAILED"))
        .callback("panics", |_done: Done| panic!("callback blew up"))
}

fn options() -> RunOptions {
    RunOptions::new()
        .iterations(20)
        .warmup(false)
        .error_threshold(0.0)
        .print(false)
}

fn should_measure_every_test_in_its_own_process() -> anyhow::Result<()> {
    let handles = Arc::new(Mutex::new(Vec::new()));
    let sink = handles.clone();
    let options = options().on_test_start(move |_, _, handle| {
        sink.lock().unwrap().push(handle.kind.clone());
    });

    let results = Runner::new(options)
        .isolation(ProcessIsolation::current_exe()?)
        .run(table())?;

    assert_eq!(results.names().collect::<Vec<_>>(), vec!["passes", "fails", "panics"]);

    assert!(results["passes"].success);
    assert_eq!(results["passes"].size, 20);

    assert!(!results["fails"].success);
    assert_eq!(results["fails"].error.as_ref().map(|e| e.message()), Some("FAILED"));

    assert!(!results["panics"].success);
    assert_eq!(
        results["panics"].error.as_ref().map(|e| e.message()),
        Some("callback blew up")
    );

    let own_pid = std::process::id();
    let handles = handles.lock().unwrap();
    assert_eq!(handles.len(), 3);
    for kind in handles.iter() {
        assert!(matches!(kind, WorkerKind::Process { pid } if *pid != own_pid));
    }
    Ok(())
}

/// Run one worker by hand and return its exit code and terminal message.
fn serve_index(index: usize, name: &str) -> anyhow::Result<(Option<i32>, WorkerMessage)> {
    let data = WorkerData {
        index,
        name: name.to_string(),
        settings: WorkerSettings {
            iterations: 5,
            warmup: false,
            error_threshold: 0.0,
        },
    };
    let output = Command::new(std::env::current_exe()?)
        .env(WORKER_DATA_ENV, data.encode()?)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let messages: Vec<WorkerMessage> = stdout
        .lines()
        .filter_map(|line| WorkerMessage::decode(line).transpose())
        .collect::<Result<_, _>>()?;
    assert_eq!(messages.len(), 1, "exactly one terminal message in {:?}", stdout);

    let message = messages.into_iter().next().ok_or_else(|| anyhow::anyhow!("no message"))?;
    Ok((output.status.code(), message))
}

fn should_exit_with_status_matching_the_outcome() -> anyhow::Result<()> {
    let (code, message) = serve_index(0, "passes")?;
    assert_eq!(code, Some(0));
    assert!(message.is_success());

    let (code, message) = serve_index(1, "fails")?;
    assert_eq!(code, Some(1));
    assert_eq!(message.into_outcome()?.error.map(|e| e.message), Some("FAILED".to_string()));

    let (code, message) = serve_index(7, "missing")?;
    assert_eq!(code, Some(1));
    assert_eq!(
        message.into_outcome().unwrap_err().message(),
        "No test code exported from the worker thread"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Worker copies never get past the first `run`.
    should_measure_every_test_in_its_own_process()?;
    println!("test should_measure_every_test_in_its_own_process ... ok");

    should_exit_with_status_matching_the_outcome()?;
    println!("test should_exit_with_status_matching_the_outcome ... ok");
    Ok(())
}
