//! Line-delimited JSON protocol spoken with interpreter children.
//!
//! Each child reads one JSON request per line on stdin and writes exactly
//! one JSON result per line on stdout, after announcing readiness with
//! `{"status":"ready"}`. Intra-line partial JSON is not valid on either
//! side; results are parsed strictly by newline delimitation.

use serde::{Deserialize, Serialize};

use warden_core::RichOutput;

/// One code-execution request, serialized as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    #[serde(rename = "executionId")]
    pub execution_id: String,
}

/// Structured error surfaced by a child when the user code raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionErrorInfo {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

/// The child's one-line result for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub success: bool,
    #[serde(rename = "executionId")]
    pub execution_id: String,
    #[serde(default)]
    pub outputs: Vec<RichOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionErrorInfo>,
}

/// A line the protocol failed to interpret.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("empty protocol line")]
    EmptyLine,

    #[error("invalid result line: {reason} (line: {line:?})")]
    InvalidResult { reason: String, line: String },
}

/// Encodes a request as one newline-terminated JSON line.
///
/// Newlines inside `code` are JSON-escaped by serialization, so the frame
/// is always exactly one line.
///
/// # Errors
/// Returns [`ProtocolError::InvalidResult`] if serialization fails, which
/// only happens for non-UTF-8 interior data.
pub fn encode_request(request: &ExecutionRequest) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(request).map_err(|e| ProtocolError::InvalidResult {
        reason: e.to_string(),
        line: String::new(),
    })?;
    Ok(format!("{json}\n"))
}

/// Returns `true` if the line is the child's ready handshake.
#[must_use]
pub fn is_ready_line(line: &str) -> bool {
    #[derive(Deserialize)]
    struct Ready {
        status: String,
    }
    let line = line.strip_suffix('\r').unwrap_or(line);
    serde_json::from_str::<Ready>(line).is_ok_and(|r| r.status == "ready")
}

/// Parses one result line.
///
/// The line must contain a single complete JSON object; trailing `\r` is
/// tolerated (children on some runtimes emit CRLF).
///
/// # Errors
/// Returns [`ProtocolError::EmptyLine`] for blank lines and
/// [`ProtocolError::InvalidResult`] for anything that is not a complete
/// result object.
pub fn parse_result_line(line: &str) -> Result<ExecutionResult, ProtocolError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Err(ProtocolError::EmptyLine);
    }
    serde_json::from_str(line).map_err(|e| ProtocolError::InvalidResult {
        reason: e.to_string(),
        line: truncate_for_log(line),
    })
}

/// Caps logged protocol lines so a misbehaving child cannot flood logs.
fn truncate_for_log(line: &str) -> String {
    const MAX: usize = 256;
    if line.len() <= MAX {
        line.to_owned()
    } else {
        let mut end = MAX;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &line[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::OutputKind;

    #[test]
    fn encode_request_is_one_line() {
        let req = ExecutionRequest {
            code: "print(1)\nprint(2)".to_owned(),
            execution_id: "exec-1".to_owned(),
        };
        let line = match encode_request(&req) {
            Ok(l) => l,
            Err(e) => panic!("encode failed: {e}"),
        };
        assert!(line.ends_with('\n'), "frame must be newline-terminated");
        assert_eq!(line.matches('\n').count(), 1, "newlines in code must be escaped");
        assert!(line.contains("\"executionId\":\"exec-1\""));
    }

    #[test]
    fn ready_line_detection() {
        assert!(is_ready_line("{\"status\":\"ready\"}"));
        assert!(is_ready_line("{\"status\":\"ready\"}\r"));
        assert!(!is_ready_line("{\"status\":\"starting\"}"));
        assert!(!is_ready_line("ready"));
        assert!(!is_ready_line(""));
    }

    #[test]
    fn parse_result_line_round_trips() {
        let json = "{\"stdout\":\"4\\n\",\"stderr\":\"\",\"success\":true,\
                    \"executionId\":\"exec-2\",\"outputs\":[]}";
        let result = match parse_result_line(json) {
            Ok(r) => r,
            Err(e) => panic!("parse failed: {e}"),
        };
        assert!(result.success);
        assert_eq!(result.stdout, "4\n");
        assert_eq!(result.execution_id, "exec-2");
        assert!(result.error.is_none());
    }

    #[test]
    fn parse_result_line_reads_rich_outputs() {
        let json = "{\"success\":true,\"executionId\":\"e\",\"outputs\":\
                    [{\"type\":\"image-png\",\"data\":\"aGk=\"}]}";
        let result = match parse_result_line(json) {
            Ok(r) => r,
            Err(e) => panic!("parse failed: {e}"),
        };
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs[0].kind, OutputKind::ImagePng);
    }

    #[test]
    fn parse_result_line_reads_structured_error() {
        let json = "{\"success\":false,\"executionId\":\"e\",\"error\":\
                    {\"ename\":\"ZeroDivisionError\",\"evalue\":\"division by zero\",\
                    \"traceback\":[\"Traceback (most recent call last):\"]}}";
        let result = match parse_result_line(json) {
            Ok(r) => r,
            Err(e) => panic!("parse failed: {e}"),
        };
        let error = match result.error {
            Some(e) => e,
            None => panic!("error info must be present"),
        };
        assert_eq!(error.ename, "ZeroDivisionError");
        assert_eq!(error.traceback.len(), 1);
    }

    #[test]
    fn parse_result_line_rejects_partial_json() {
        assert!(parse_result_line("{\"success\":true,").is_err());
        assert!(matches!(parse_result_line("   "), Err(ProtocolError::EmptyLine)));
        assert!(parse_result_line("not json at all").is_err());
    }

    #[test]
    fn invalid_result_truncates_long_lines_in_error() {
        let long = format!("x{}", "y".repeat(4096));
        let Err(ProtocolError::InvalidResult { line, .. }) = parse_result_line(&long) else {
            panic!("long garbage line must fail to parse");
        };
        assert!(line.len() < 300, "logged line must be truncated, got {}", line.len());
    }

    proptest::proptest! {
        #[test]
        fn proptest_encode_parse_identity(
            code in ".*",
            id in "[a-z0-9-]{1,32}",
        ) {
            let req = ExecutionRequest { code: code.clone(), execution_id: id.clone() };
            let line = match encode_request(&req) {
                Ok(l) => l,
                Err(e) => panic!("encode failed: {e}"),
            };
            proptest::prop_assert_eq!(line.matches('\n').count(), 1);
            let back: ExecutionRequest = match serde_json::from_str(line.trim_end()) {
                Ok(r) => r,
                Err(e) => panic!("decode failed: {e}"),
            };
            proptest::prop_assert_eq!(back.code, code);
            proptest::prop_assert_eq!(back.execution_id, id);
        }
    }
}
