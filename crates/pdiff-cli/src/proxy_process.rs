//! Proxy child process
//!
//! The proxy runs as `pdiff proxy` in its own OS process. [`ProxyProcess`]
//! owns the child; dropping it kills the child, so every exit path of a run
//! tears the proxy down.

use crate::error::{CliError, CliResult};
use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

/// How long to wait for the proxy port to accept connections
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

const READY_POLL: Duration = Duration::from_millis(50);

/// A running proxy child
#[derive(Debug)]
pub struct ProxyProcess {
    child: Child,
    port: u16,
}

impl ProxyProcess {
    /// Start `pdiff proxy` from the current executable
    pub async fn spawn(port: u16, default_host: Option<&str>, upstream_scheme: &str) -> CliResult<Self> {
        let exe = std::env::current_exe()?;
        let args = proxy_args(port, default_host, upstream_scheme);
        Self::spawn_command(exe.into_os_string(), args, port, DEFAULT_READY_TIMEOUT).await
    }

    /// Start `program` and wait until `port` accepts connections
    pub async fn spawn_command(
        program: OsString,
        args: Vec<OsString>,
        port: u16,
        ready_timeout: Duration,
    ) -> CliResult<Self> {
        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CliError::proxy(format!("cannot start {}: {e}", program.to_string_lossy())))?;
        let mut process = Self { child, port };
        tracing::debug!(port, pid = ?process.child.id(), "proxy spawned");

        if let Err(err) = process.wait_ready(ready_timeout).await {
            process.shutdown().await;
            return Err(err);
        }
        Ok(process)
    }

    /// Listen port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    async fn wait_ready(&mut self, timeout: Duration) -> CliResult<()> {
        let start = Instant::now();
        loop {
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                tracing::debug!(port = self.port, elapsed = ?start.elapsed(), "proxy ready");
                return Ok(());
            }
            if let Some(status) = self.child.try_wait()? {
                return Err(CliError::proxy(format!(
                    "proxy exited before listening ({status})"
                )));
            }
            if start.elapsed() >= timeout {
                return Err(CliError::proxy(format!(
                    "port {} not accepting connections after {}ms",
                    self.port,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// Kill the child and reap it
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "failed to stop proxy");
        }
    }
}

/// Arguments for the `pdiff proxy` subcommand
fn proxy_args(port: u16, default_host: Option<&str>, upstream_scheme: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["proxy".into(), "--port".into(), port.to_string().into()];
    if let Some(host) = default_host {
        args.push("--default-host".into());
        args.push(host.into());
    }
    args.push("--upstream-scheme".into());
    args.push(upstream_scheme.into());
    args
}
