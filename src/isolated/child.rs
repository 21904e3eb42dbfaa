use super::protocol::{Envelope, IsolatedRequest};
use crate::errors::Error;
use crate::utils::panic_message;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, Stdio};
use tracing::{debug, error};

/// Failure raised by a function running inside the child
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: String,
    pub message: String,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Function callable by name from the parent
pub type IsolatedFn = fn(Value) -> Result<Value, Failure>;

/// Functions available inside the child process
#[derive(Default)]
pub struct IsolatedRegistry {
    functions: HashMap<String, IsolatedFn>,
}

impl IsolatedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the functions shipped with the binary
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("external_command", external_command);
        registry
    }

    pub fn register(&mut self, name: &str, function: IsolatedFn) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Runs one request, turning every outcome into an envelope
    pub fn dispatch(&self, request: IsolatedRequest) -> Envelope {
        let Some(function) = self.functions.get(&request.function).copied() else {
            return Envelope::failure(
                "UnknownFunction",
                format!("unknown function '{}'", request.function),
            );
        };

        debug!("Running isolated function {}", request.function);
        match panic::catch_unwind(AssertUnwindSafe(|| function(request.args))) {
            Ok(Ok(value)) => Envelope::Ok { value },
            Ok(Err(failure)) => Envelope::failure(failure.kind, failure.message),
            Err(payload) => Envelope::failure("Panic", panic_message(payload.as_ref())),
        }
    }
}

/// Child-side loop body: read one request, run it, write the envelope
///
/// # Arguments
///
/// * `registry` - Functions the request may name
/// * `input` - Source of the JSON request (the process stdin)
/// * `output` - Sink for the envelope line (the process stdout)
///
/// # Errors
///
/// Returns an error only when the envelope cannot be written; malformed
/// requests are answered with an error envelope.
pub fn serve<R: Read, W: Write>(
    registry: &IsolatedRegistry,
    mut input: R,
    mut output: W,
) -> Result<(), Error> {
    let mut raw = String::new();
    input.read_to_string(&mut raw)?;

    let envelope = match serde_json::from_str::<IsolatedRequest>(&raw) {
        Ok(request) => registry.dispatch(request),
        Err(e) => {
            error!("Malformed isolated request: {}", e);
            Envelope::failure("InvalidRequest", e.to_string())
        }
    };

    writeln!(output, "{}", envelope.to_line()?)?;
    output.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ExternalCommandArgs {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    input: Value,
}

/// Runs an external program with JSON on stdin and JSON expected on stdout
///
/// Args: `{"program": "...", "args": [...], "input": <json>}`. A non-zero
/// exit becomes a `CommandFailed` failure carrying stderr; stdout that is
/// not JSON becomes `InvalidOutput`.
pub fn external_command(args: Value) -> Result<Value, Failure> {
    let command: ExternalCommandArgs = serde_json::from_value(args)
        .map_err(|e| Failure::new("InvalidArguments", e.to_string()))?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Failure::new("CommandFailed", format!("{}: {}", command.program, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        let payload = command.input.to_string();
        if let Err(e) = stdin.write_all(payload.as_bytes()) {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(Failure::new("CommandFailed", e.to_string()));
            }
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Failure::new("CommandFailed", e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(Failure::new(
            "CommandFailed",
            format!(
                "{} exited with {}: {}",
                command.program,
                output.status,
                stderr.trim()
            ),
        ));
    }

    serde_json::from_str(stdout.trim()).map_err(|e| {
        Failure::new(
            "InvalidOutput",
            format!("{} printed non-JSON output: {}", command.program, e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(registry: &IsolatedRegistry, request: &str) -> Envelope {
        let mut out = Vec::new();
        serve(registry, request.as_bytes(), &mut out).unwrap();
        Envelope::parse_output(&out).unwrap()
    }

    fn double(args: Value) -> Result<Value, Failure> {
        let n = args["n"]
            .as_i64()
            .ok_or_else(|| Failure::new("ValueError", "n must be an integer"))?;
        Ok(json!(n * 2))
    }

    fn explode(_: Value) -> Result<Value, Failure> {
        panic!("boom")
    }

    #[test]
    fn dispatches_registered_function() {
        let mut registry = IsolatedRegistry::new();
        registry.register("double", double);

        assert_eq!(
            run(&registry, r#"{"function":"double","args":{"n":21}}"#),
            Envelope::Ok { value: json!(42) }
        );
        assert_eq!(
            run(&registry, r#"{"function":"double","args":{"n":"x"}}"#),
            Envelope::failure("ValueError", "n must be an integer")
        );
    }

    #[test]
    fn unknown_function_and_bad_request() {
        let registry = IsolatedRegistry::new();
        assert!(!registry.contains("external_command"));
        assert!(IsolatedRegistry::with_builtins().contains("external_command"));
        match run(&registry, r#"{"function":"missing"}"#) {
            Envelope::Error { kind, .. } => assert_eq!(kind, "UnknownFunction"),
            other => panic!("unexpected envelope: {other:?}"),
        }
        match run(&registry, "not json") {
            Envelope::Error { kind, .. } => assert_eq!(kind, "InvalidRequest"),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn panics_become_failures() {
        let mut registry = IsolatedRegistry::new();
        registry.register("explode", explode);
        assert_eq!(
            run(&registry, r#"{"function":"explode","args":null}"#),
            Envelope::failure("Panic", "boom")
        );
    }

    #[cfg(unix)]
    #[test]
    fn external_command_pipes_json() {
        let value = external_command(json!({
            "program": "sh",
            "args": ["-c", "cat"],
            "input": {"company_name": "Acme"}
        }))
        .unwrap();
        assert_eq!(value, json!({"company_name": "Acme"}));
    }

    #[cfg(unix)]
    #[test]
    fn external_command_failures() {
        let failed = external_command(json!({
            "program": "sh",
            "args": ["-c", "echo 'rate limited' >&2; exit 2"]
        }))
        .unwrap_err();
        assert_eq!(failed.kind, "CommandFailed");
        assert!(failed.message.contains("rate limited"));

        let garbage = external_command(json!({
            "program": "sh",
            "args": ["-c", "cat > /dev/null; echo hello"]
        }))
        .unwrap_err();
        assert_eq!(garbage.kind, "InvalidOutput");

        let missing = external_command(json!({"args": []})).unwrap_err();
        assert_eq!(missing.kind, "InvalidArguments");
    }
}
