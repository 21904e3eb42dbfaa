use jobsearch::errors::Error;
use jobsearch::isolated::IsolatedExecutor;
use serde_json::json;
use std::time::{Duration, Instant};

fn worker() -> IsolatedExecutor {
    IsolatedExecutor::new(env!("CARGO_BIN_EXE_jobsearch"), vec!["worker".to_string()])
        .with_grace_period(Duration::from_millis(300))
}

#[tokio::test]
async fn worker_runs_external_command() {
    let value = worker()
        .run(
            "external_command",
            &json!({
                "program": "sh",
                "args": ["-c", "cat"],
                "input": {"company_name": "Acme", "levels": ["L5"]}
            }),
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    assert_eq!(value, json!({"company_name": "Acme", "levels": ["L5"]}));
}

#[tokio::test]
async fn worker_reports_failures_with_their_kind() {
    let err = worker()
        .run("no_such_function", &json!({}), Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StageFailed { ref kind, .. } if kind == "UnknownFunction"));

    let err = worker()
        .run(
            "external_command",
            &json!({"program": "sh", "args": ["-c", "echo quota exceeded >&2; exit 1"]}),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();
    match err {
        Error::StageFailed { kind, message } => {
            assert_eq!(kind, "CommandFailed");
            assert!(message.contains("quota exceeded"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn hung_collaborator_is_killed_with_the_worker() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("collaborator.pid");
    let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

    let started = Instant::now();
    let err = worker()
        .run(
            "external_command",
            &json!({"program": "sh", "args": ["-c", script]}),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(3));

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    // the collaborator shares the worker's process group
    for _ in 0..20 {
        if !is_running(pid) {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("collaborator {pid} survived the timeout");
}

/// A zombie awaiting its new parent's reap counts as gone
#[cfg(unix)]
fn is_running(pid: i32) -> bool {
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(true),
        Err(_) => true,
    }
}
