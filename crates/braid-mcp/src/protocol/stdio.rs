//! stdio Transport
//!
//! Reads one JSON envelope per line from stdin and writes one response per
//! line to stdout. Logs go to stderr so stdout stays a clean protocol
//! channel.

use std::io::{self, BufRead, BufReader, Write};

use braid_core::MemoryError;
use tracing::{debug, error, warn};

use super::types::{ToolRequest, ToolResponse};
use crate::server::ToolServer;

/// stdio transport for the tool server.
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }

    /// Run the request loop until stdin closes.
    pub async fn run(self, server: ToolServer) -> Result<(), io::Error> {
        let stdin = io::stdin();
        let stdout = io::stdout();

        let reader = BufReader::new(stdin.lock());
        let mut stdout = stdout.lock();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("failed to read line: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            debug!("received {} bytes", line.len());

            let response = match serde_json::from_str::<ToolRequest>(&line) {
                Ok(request) => server.handle(request).await,
                Err(e) => {
                    warn!("unparseable request: {}", e);
                    ToolResponse::failure(
                        None,
                        &MemoryError::InvalidArgument(format!("unparseable request: {e}")),
                    )
                }
            };

            match serde_json::to_string(&response) {
                Ok(json) => {
                    writeln!(stdout, "{}", json)?;
                    stdout.flush()?;
                }
                Err(e) => {
                    error!("failed to serialize response: {}", e);
                    let fallback = r#"{"error":{"kind":"internal","message":"response serialization failed","retriable":false}}"#;
                    let _ = writeln!(stdout, "{}", fallback);
                    let _ = stdout.flush();
                }
            }
        }

        Ok(())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}
