use crate::parser::parse_hop_line;
use anyhow::{anyhow, Context, Result};
use latmesh_model::Hop;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct TraceSettings {
    pub max_hops: u32,
    pub hop_timeout: Duration,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            max_hops: 30,
            hop_timeout: Duration::from_secs(1),
        }
    }
}

/// Source of hop lists for a single target.
///
/// An empty list means nothing answered. `Err` is reserved for failures of
/// the probe machinery itself (the binary is missing, the pipe broke).
pub trait Tracer: Send + Sync + 'static {
    fn probe(
        &self,
        target: &str,
        settings: &TraceSettings,
    ) -> impl Future<Output = Result<Vec<Hop>>> + Send;
}

/// Runs the system `traceroute` binary in numeric single-probe mode and
/// parses hops as the child prints them.
#[derive(Debug, Clone)]
pub struct SystemTraceroute {
    program: String,
}

impl SystemTraceroute {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemTraceroute {
    fn default() -> Self {
        Self::new("traceroute")
    }
}

impl Tracer for SystemTraceroute {
    async fn probe(&self, target: &str, settings: &TraceSettings) -> Result<Vec<Hop>> {
        let wait = settings.hop_timeout.as_secs_f64().max(0.001);

        // The child is killed if this future is dropped mid-read.
        let mut child = Command::new(&self.program)
            .arg("-n")
            .arg("-q")
            .arg("1")
            .arg("-w")
            .arg(wait.to_string())
            .arg("-m")
            .arg(settings.max_hops.to_string())
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {} for {target}", self.program))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("missing traceroute stdout"))?;

        let mut lines = BufReader::new(stdout).lines();
        let mut hops = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("failed to read traceroute output for {target}"))?
        {
            if let Some(hop) = parse_hop_line(&line) {
                tracing::debug!(host = target, hop = %hop.addr, rtt_ms = hop.rtt_ms, "hop");
                hops.push(hop);
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("failed to wait for traceroute on {target}"))?;
        if !status.success() {
            tracing::debug!(host = target, %status, hops = hops.len(), "traceroute exited unsuccessfully");
        }

        Ok(hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let tracer = SystemTraceroute::new("/nonexistent/latmesh-traceroute");
        let err = tracer
            .probe("192.0.2.1", &TraceSettings::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hops_are_read_from_child_stdout() {
        // `echo` ignores the traceroute flags and prints them back as one
        // line, which is not a hop line.
        let tracer = SystemTraceroute::new("echo");
        let hops = tracer
            .probe("192.0.2.1", &TraceSettings::default())
            .await
            .unwrap();
        assert!(hops.is_empty());
    }
}
