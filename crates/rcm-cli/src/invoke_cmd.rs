use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};

use rcm_core::{AgentRequest, ResponseEnvelope};

use crate::runtime::Runtime;

/// Run one request through the named agent's harness and print the
/// envelope. Returns whether the invocation succeeded.
pub async fn run_invoke(runtime: &Runtime, agent_name: &str, input: &str) -> Result<bool> {
    let Some(harness) = runtime.harness(agent_name) else {
        bail!(
            "unknown agent {agent_name:?}; available: {}",
            runtime.agents().join(", ")
        );
    };

    let raw = read_input(input)?;
    let request = parse_request(&raw)?;
    let envelope = harness.handle(request).await;
    print_envelope(&envelope)?;
    Ok(envelope.success)
}

/// Read the request body from a file, or from stdin when `input` is `-`.
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(Path::new(input))
        .with_context(|| format!("failed to read request file {input}"))
}

pub fn parse_request(raw: &str) -> Result<AgentRequest> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("request is not valid JSON")?;
    let request = AgentRequest::try_from(value).context("request must be a JSON object")?;
    Ok(request)
}

fn print_envelope(envelope: &ResponseEnvelope) -> Result<()> {
    let json = serde_json::to_string_pretty(envelope).context("failed to serialize envelope")?;
    println!("{json}");
    Ok(())
}
