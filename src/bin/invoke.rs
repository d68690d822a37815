//! Stdin/stdout invocation runner.
//!
//! Reads one JSON invocation event per line from stdin, runs it through the
//! pipeline, and writes one JSON result (or ALB-wrapped response, for
//! envelope-shaped input) per line to stdout.

use std::io::{self, BufRead, Write};

use lane_replay::lambda::handle_raw_event;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(event) => match handle_raw_event(event, None).await {
                Ok(result) => result,
                Err(err) => serde_json::json!({"error": err.to_string()}),
            },
            Err(err) => serde_json::json!({"error": format!("invalid JSON: {err}")}),
        };

        writeln!(out, "{response}")?;
        out.flush()?;
    }

    Ok(())
}
