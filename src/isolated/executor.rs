use super::protocol::{Envelope, IsolatedRequest};
use crate::errors::Error;
use crate::utils::format_elapsed;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default time a terminated child gets to exit before it is killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Runs named functions in a child OS process under a hard timeout
///
/// The child is `program base_args...`; it reads one `IsolatedRequest` from
/// stdin and answers with an `Envelope` on stdout. Each call spawns its own
/// child in its own process group, and the child is reaped on every path.
///
/// # Example
///
/// ```ignore
/// let executor = IsolatedExecutor::for_current_exe()?;
/// let value = executor
///     .run("external_command", &args, Duration::from_secs(120))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    program: PathBuf,
    base_args: Vec<String>,
    grace_period: Duration,
}

impl IsolatedExecutor {
    /// Creates an executor spawning `program` with `base_args`
    ///
    /// # Arguments
    ///
    /// * `program` - Executable that speaks the child protocol
    /// * `base_args` - Arguments placed before nothing else; the request goes to stdin
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Executor re-running the current binary's hidden `worker` subcommand
    pub fn for_current_exe() -> Result<Self, Error> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".to_string()]))
    }

    /// Sets how long a terminated child may take to exit before SIGKILL
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Runs `function(args)` in a fresh child process
    ///
    /// # Arguments
    ///
    /// * `function` - Name of the function the child should run
    /// * `args` - Explicit, serializable arguments
    /// * `limit` - Wall-clock budget for the whole exchange
    ///
    /// # Returns
    ///
    /// The function's value
    ///
    /// # Errors
    ///
    /// * `Error::Timeout` if the budget expires; the child is then terminated,
    ///   so the error surfaces within `limit` plus the grace period
    /// * `Error::StageFailed` carrying the child's failure kind and message
    /// * `Error::ChildExited` / `Error::ProtocolError` if the child dies or
    ///   answers without a valid envelope
    pub async fn run(&self, function: &str, args: &Value, limit: Duration) -> Result<Value, Error> {
        let request = serde_json::to_vec(&IsolatedRequest {
            function: function.to_string(),
            args: args.clone(),
        })?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = command.spawn()?;
        debug!(
            "Spawned isolated process {:?} for {}",
            child.id(),
            function
        );

        let exchange = async {
            if let Some(mut stdin) = child.stdin.take() {
                match stdin.write_all(&request).await {
                    Ok(()) => {}
                    // the child may exit without reading its request
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            let mut out = Vec::new();
            if let Some(mut stdout) = child.stdout.take() {
                stdout.read_to_end(&mut out).await?;
            }
            Ok::<_, std::io::Error>(out)
        };

        let out = match timeout(limit, exchange).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                self.terminate(&mut child, function).await;
                return Err(e.into());
            }
            Err(_) => {
                let elapsed = started.elapsed();
                warn!("Function {} timed out after {}", function, format_elapsed(elapsed));
                self.terminate(&mut child, function).await;
                return Err(Error::Timeout {
                    function: function.to_string(),
                    elapsed,
                });
            }
        };

        // stdout is closed; give the child a moment to exit on its own
        let status = match timeout(self.grace_period, child.wait()).await {
            Ok(status) => status?.to_string(),
            Err(_) => {
                self.terminate(&mut child, function).await;
                "terminated after closing stdout".to_string()
            }
        };

        debug!(
            "Isolated process for {} finished in {} ({})",
            function,
            format_elapsed(started.elapsed()),
            status
        );

        match Envelope::parse_output(&out) {
            Ok(envelope) => envelope.into_result(),
            Err(_) if out.iter().all(u8::is_ascii_whitespace) => Err(Error::ChildExited {
                function: function.to_string(),
                status,
            }),
            Err(e) => Err(e),
        }
    }

    /// Stops a child: SIGTERM to its process group, SIGKILL after the grace
    /// period, then reaps it
    async fn terminate(&self, child: &mut Child, function: &str) {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        let Some(pid) = child.id() else {
            return;
        };

        warn!("Terminating still-running process {} ({})...", pid, function);
        signal_group(pid, GroupSignal::Terminate);

        if timeout(self.grace_period, child.wait()).await.is_err() {
            warn!("Killing still-running process {} ({})...", pid, function);
            signal_group(pid, GroupSignal::Kill);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill process {}: {}", pid, e);
            }
        } else {
            // the leader is gone; take down anything it left in its group
            signal_group(pid, GroupSignal::Kill);
        }
    }
}

enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!("Could not send {} to process group {}: {}", signal, pid, e);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn sh(script: &str) -> IsolatedExecutor {
        IsolatedExecutor::new("sh", vec!["-c".to_string(), script.to_string()])
            .with_grace_period(Duration::from_millis(200))
    }

    fn is_alive(pid: i32) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
    }

    #[tokio::test]
    async fn returns_child_value() {
        let executor = sh(r#"cat > /dev/null; echo '{"status":"ok","value":{"levels":["L5"]}}'"#);
        let value = executor
            .run("levels", &json!({"company_name": "Acme"}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, json!({"levels": ["L5"]}));
    }

    #[tokio::test]
    async fn child_sees_the_request() {
        // echo the request back as the value
        let executor = sh(r#"read req; printf '{"status":"ok","value":%s}\n' "$req""#);
        let value = executor
            .run("echo", &json!({"n": 1}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, json!({"function": "echo", "args": {"n": 1}}));
    }

    #[tokio::test]
    async fn child_failure_keeps_kind_and_message() {
        let executor = sh(
            r#"echo 'warming up'; echo '{"status":"error","kind":"ValueError","message":"no salary rows"}'"#,
        );
        let err = executor
            .run("salary", &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            Error::StageFailed { kind, message } => {
                assert_eq!(kind, "ValueError");
                assert_eq!(message, "no salary rows");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn crashed_child_is_reported() {
        let err = sh("exit 3")
            .run("linkedin", &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChildExited { ref function, .. } if function == "linkedin"));
    }

    #[tokio::test]
    async fn garbage_output_is_a_protocol_error() {
        let err = sh("echo not-json")
            .run("levels", &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    #[tokio::test]
    async fn hung_child_times_out_and_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

        let started = Instant::now();
        let err = sh(&script)
            .run("sleep_forever", &json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(err.to_string().contains("sleep_forever"));
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn default_grace_keeps_timeout_under_two_seconds() {
        let executor = IsolatedExecutor::new(
            "sh",
            vec!["-c".to_string(), "trap '' TERM; while true; do sleep 0.05; done".to_string()],
        );

        let started = Instant::now();
        let err = executor
            .run("stubborn", &json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn child_ignoring_sigterm_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!(
            "trap '' TERM; echo $$ > {}; while true; do sleep 0.05; done",
            pid_file.display()
        );

        let err = sh(&script)
            .run("stubborn", &json!({}), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!is_alive(pid));
    }
}
