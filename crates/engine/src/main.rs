use std::io::{self, Read, Write};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tvgrade_engine::{grade_with_options, GradingOptions, Status};

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum Request {
    Validate(GradeRequest),
    /// Same inputs as `validate`; answers with the score breakdown as CSV.
    ExportCsv(GradeRequest),
}

#[derive(Debug, Deserialize)]
struct GradeRequest {
    /// Either the raw document text or the document itself.
    instance: Value,
    submission: Value,
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    options: GradingOptions,
}

#[derive(Debug, Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrResponse {
    ok: bool,
    error: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Documents may arrive as JSON strings holding the file contents or inline
/// as objects. Either way the grader gets text to parse.
fn document_text(doc: Value) -> String {
    match doc {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn write_ok<T: Serialize>(data: T) {
    let resp = OkResponse { ok: true, data };
    let json = serde_json::to_string(&resp).unwrap_or_else(|e| {
        format!("{{\"ok\":false,\"error\":\"serialization error: {}\"}}", e)
    });
    debug!("response: ok ({} bytes)", json.len());
    println!("{}", json);
    let _ = io::stdout().flush();
}

fn write_err(msg: impl std::fmt::Display) -> ! {
    let resp = ErrResponse {
        ok: false,
        error: msg.to_string(),
    };
    let json = serde_json::to_string(&resp).unwrap_or_else(|_| {
        "{\"ok\":false,\"error\":\"double serialization error\"}".to_string()
    });
    debug!("response: error ({})", msg);
    println!("{}", json);
    let _ = io::stdout().flush();
    std::process::exit(1);
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        write_err(format!("Failed to read stdin: {}", e));
    }

    let request: Request = match serde_json::from_str(&input) {
        Ok(r) => r,
        Err(e) => write_err(format!("Invalid JSON input: {}", e)),
    };

    match request {
        Request::Validate(req) => {
            let result = grade_with_options(
                &document_text(req.instance),
                &document_text(req.submission),
                req.verbose,
                &req.options,
            );
            debug!(
                "validate: status={} violations={}",
                result.status().as_str(),
                result.violations().len()
            );
            write_ok(result);
        }
        Request::ExportCsv(req) => {
            let result = grade_with_options(
                &document_text(req.instance),
                &document_text(req.submission),
                false,
                &req.options,
            );
            match result.score_csv() {
                Some(csv) if result.status() != Status::Error => write_ok(csv),
                _ => write_err(format!(
                    "No score to export: {}",
                    result.error_message().unwrap_or("grading failed")
                )),
            }
        }
    }
}
