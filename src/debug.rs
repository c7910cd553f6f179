//! Debug logging for MCP traffic and ADT round trips.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

/// Debug logger. Writes to stderr and, when enabled, to a timestamped trace
/// file so a full MCP session can be replayed after the fact.
pub struct DebugLogger {
    enabled: bool,
    trace_file: Option<Mutex<File>>,
    trace_path: Option<PathBuf>,
}

impl DebugLogger {
    pub fn new(enabled: bool) -> Self {
        let (trace_file, trace_path) = if enabled {
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            let path = PathBuf::from(format!("/tmp/abap_adt_mcp_trace_{}.log", timestamp));
            match OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
            {
                Ok(file) => (Some(Mutex::new(file)), Some(path)),
                Err(e) => {
                    eprintln!("[DEBUG] Failed to create trace file: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        Self {
            enabled,
            trace_file,
            trace_path,
        }
    }

    pub fn trace_path(&self) -> Option<&PathBuf> {
        self.trace_path.as_ref()
    }

    pub fn log(&self, message: &str) {
        if !self.enabled {
            return;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let formatted = format!("[{}] {}", timestamp, message);

        eprintln!("{}", formatted);

        if let Some(ref file) = self.trace_file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{}", formatted);
                let _ = f.flush();
            }
        }
    }

    pub fn log_tool_call(&self, tool_name: &str, params: &serde_json::Value) {
        if !self.enabled {
            return;
        }
        self.log(&format!(
            "TOOL CALL: {} | params: {}",
            tool_name,
            truncate(&params.to_string(), 1000)
        ));
    }

    pub fn log_tool_result(&self, tool_name: &str, result: &str) {
        if !self.enabled {
            return;
        }
        self.log(&format!(
            "TOOL RESULT: {} | {}",
            tool_name,
            truncate(result, 1000)
        ));
    }

    pub fn log_tool_error(&self, tool_name: &str, error: &str) {
        if !self.enabled {
            return;
        }
        self.log(&format!("TOOL ERROR: {} | {}", tool_name, error));
    }

    pub fn log_http_request(&self, method: &str, url: &str) {
        if !self.enabled {
            return;
        }
        self.log(&format!("ADT {} {}", method, url));
    }

    pub fn log_http_response(&self, status: u16, content_type: Option<&str>, body_len: usize) {
        if !self.enabled {
            return;
        }
        self.log(&format!(
            "ADT -> {} | {} | {} bytes",
            status,
            content_type.unwrap_or("-"),
            body_len
        ));
    }
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger")
            .field("enabled", &self.enabled)
            .field("trace_path", &self.trace_path)
            .finish()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...(truncated)", &s[..end])
    }
}
