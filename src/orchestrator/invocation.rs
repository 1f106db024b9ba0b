//! Request shapes and their translation into tool argument lists.
//!
//! Builders are pure: no I/O, no spawning.  Flag order is fixed so that a
//! given request always produces the same argument list.
//!
//! Two coercions here are deliberately literal, kept for compatibility with
//! the frontends that already speak this API:
//! - the reverse flag is honored only for the exact JSON string `"true"`;
//!   boolean `true` and any other spelling mean "not reversed".
//! - the latency duration accepts strings and numbers alike, falling back
//!   to the default count when the value is absent, zero, or not numeric.

use serde::Deserialize;
use serde_json::Value;

use super::OrchestratorError;

/// Probe count used when a latency request carries no usable duration.
pub const DEFAULT_PING_COUNT: i64 = 5;

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// Full-knob throughput test request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedTestRequest {
    #[serde(rename = "serverIP")]
    pub server_ip: Option<String>,
    pub protocol: Option<String>,
    pub time: Option<String>,
    pub bandwidth: Option<String>,
    pub mtu: Option<String>,
    pub buffer_length: Option<String>,
    pub parallel: Option<String>,
    pub reverse: Option<Value>,
    pub window_size: Option<String>,
}

/// Preset throughput test request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicTestRequest {
    #[serde(rename = "serverIP")]
    pub server_ip: Option<String>,
    /// Preset selector; `"UDP"` picks the datagram preset, anything else
    /// the stream preset.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub reverse: Option<Value>,
}

/// Latency test request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LatencyTestRequest {
    #[serde(rename = "serverIP")]
    pub server_ip: Option<String>,
    pub duration: Option<Value>,
}

// ---------------------------------------------------------------------------
// Argument builders
// ---------------------------------------------------------------------------

/// Arguments for an advanced throughput run.
///
/// Base `-c <target>`, then each knob appended only when present and
/// non-empty, in a fixed order.
pub fn advanced_args(request: &AdvancedTestRequest) -> Result<Vec<String>, OrchestratorError> {
    let target = required_target(&request.server_ip)?;

    let mut args = vec!["-c".to_string(), target.to_string()];
    if matches!(request.protocol.as_deref(), Some("UDP")) {
        args.push("-u".to_string());
    }
    push_opt(&mut args, "-t", &request.time);
    push_opt(&mut args, "-b", &request.bandwidth);
    push_opt(&mut args, "--set-mss", &request.mtu);
    push_opt(&mut args, "-l", &request.buffer_length);
    push_opt(&mut args, "-P", &request.parallel);
    if reverse_requested(&request.reverse) {
        args.push("-R".to_string());
    }
    push_opt(&mut args, "-w", &request.window_size);
    Ok(args)
}

/// Arguments for a preset throughput run.
pub fn basic_args(request: &BasicTestRequest) -> Result<Vec<String>, OrchestratorError> {
    let target = required_target(&request.server_ip)?;

    let mut args = vec![
        "-c".to_string(),
        target.to_string(),
        "-i".to_string(),
        "1".to_string(),
    ];
    if matches!(request.kind.as_deref(), Some("UDP")) {
        args.extend(["-u", "-l", "1400", "-b", "1200M", "-t", "10"].map(String::from));
    } else {
        args.extend(["-t", "10", "-w", "256K"].map(String::from));
    }
    if reverse_requested(&request.reverse) {
        args.push("-R".to_string());
    }
    Ok(args)
}

/// Arguments for a latency run: `-c <count> <target>`.
pub fn latency_args(request: &LatencyTestRequest) -> Result<Vec<String>, OrchestratorError> {
    let target = required_target(&request.server_ip)?;
    let count = ping_count(&request.duration);
    Ok(vec!["-c".to_string(), count.to_string(), target.to_string()])
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn required_target(server_ip: &Option<String>) -> Result<&str, OrchestratorError> {
    match server_ip.as_deref() {
        Some(target) if !target.is_empty() => Ok(target),
        _ => Err(OrchestratorError::Validation(
            "target address is required".to_string(),
        )),
    }
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: &Option<String>) {
    if let Some(value) = value {
        if !value.is_empty() {
            args.push(flag.to_string());
            args.push(value.clone());
        }
    }
}

/// Only the exact string `"true"` turns the reverse flag on.
fn reverse_requested(reverse: &Option<Value>) -> bool {
    matches!(reverse, Some(Value::String(s)) if s == "true")
}

/// Probe count from a duration that may be a JSON number, a numeric
/// string, or garbage.  Zero and non-numbers fall back to the default.
fn ping_count(duration: &Option<Value>) -> i64 {
    let numeric = match duration {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match numeric {
        Some(value) if value.is_finite() && value != 0.0 => value.ceil() as i64,
        _ => DEFAULT_PING_COUNT,
    }
}
