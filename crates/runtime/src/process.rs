//! Browser process spawning and reaping
//!
//! A spawned browser is owned by exactly one waiter task. That task selects
//! between the child exiting and a kill request, runs the exit hook (profile
//! cleanup) and then publishes the exit status once on a watch channel.
//!
//! Output is drained continuously so the pipe buffers never fill. Stdout lines
//! are additionally offered to the readiness scanner until it hangs up.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::options::OutputMode;
use crate::spec::LaunchSpec;

/// Library search path variable extended with the executable's directory.
#[cfg(target_os = "linux")]
const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// How a browser process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessExit {
	/// Exit code, if the process exited normally.
	pub code: Option<i32>,
	/// Terminating signal, if the process was killed by one (Unix).
	pub signal: Option<i32>,
}

impl ProcessExit {
	pub fn success(&self) -> bool {
		self.code == Some(0)
	}
}

impl From<std::process::ExitStatus> for ProcessExit {
	fn from(status: std::process::ExitStatus) -> Self {
		#[cfg(unix)]
		let signal = std::os::unix::process::ExitStatusExt::signal(&status);
		#[cfg(not(unix))]
		let signal = None;

		Self {
			code: status.code(),
			signal,
		}
	}
}

impl fmt::Display for ProcessExit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (self.code, self.signal) {
			(Some(code), _) => write!(f, "exit code {code}"),
			(None, Some(signal)) => write!(f, "signal {signal}"),
			(None, None) => f.write_str("unknown status"),
		}
	}
}

/// Owning reference to a spawned browser process.
#[derive(Debug)]
pub struct ProcessHandle {
	pid: Option<u32>,
	kill_tx: mpsc::UnboundedSender<()>,
	kill_requested: AtomicBool,
	exit_rx: watch::Receiver<Option<ProcessExit>>,
}

impl ProcessHandle {
	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	/// Exit status, once the process has been reaped.
	pub fn exit_status(&self) -> Option<ProcessExit> {
		*self.exit_rx.borrow()
	}

	pub fn has_exited(&self) -> bool {
		self.exit_status().is_some()
	}

	/// Requests forced termination. Returns `false` if a kill was already
	/// requested or the process is gone.
	pub fn kill(&self) -> bool {
		if self.has_exited() || self.kill_requested.swap(true, Ordering::AcqRel) {
			return false;
		}
		self.kill_tx.send(()).is_ok()
	}

	/// Receiver that observes the single `None -> Some(exit)` transition.
	pub fn subscribe(&self) -> watch::Receiver<Option<ProcessExit>> {
		self.exit_rx.clone()
	}

	/// Waits until the process has been reaped and the exit hook has run.
	pub async fn wait(&self) -> ProcessExit {
		wait_for_exit(&mut self.subscribe()).await
	}
}

/// Waits on an exit receiver until the status is published.
pub async fn wait_for_exit(rx: &mut watch::Receiver<Option<ProcessExit>>) -> ProcessExit {
	match rx.wait_for(Option::is_some).await {
		Ok(exit) => (*exit).unwrap_or_default(),
		// Waiter task went away without publishing (runtime shutdown).
		Err(_) => ProcessExit::default(),
	}
}

/// Spawns the browser described by `spec`.
///
/// `on_exit` runs on the waiter task after the process is reaped and before the
/// exit is published, exactly once. It is dropped unused if spawning fails.
///
/// Returns the handle and a receiver of stdout lines for readiness scanning.
///
/// # Errors
///
/// Returns [`Error::LaunchFailed`] if the process cannot be started.
pub fn spawn<F>(
	spec: &LaunchSpec,
	profile_dir: Option<&Path>,
	on_exit: F,
) -> Result<(ProcessHandle, mpsc::UnboundedReceiver<String>)>
where
	F: FnOnce(&ProcessExit) + Send + 'static,
{
	let args = spec.command_args(profile_dir);
	let output = spec.output();

	let mut cmd = Command::new(spec.executable());
	cmd.args(&args)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(match output {
			OutputMode::Discard => Stdio::null(),
			OutputMode::Forward | OutputMode::Log => Stdio::piped(),
		});
	apply_env(&mut cmd, spec);

	// Own process group so a forced kill reaches content processes too.
	#[cfg(unix)]
	cmd.process_group(0);

	let mut child = cmd.spawn().map_err(|e| {
		Error::LaunchFailed(format!(
			"failed to spawn {}: {}",
			spec.executable().display(),
			e
		))
	})?;

	let pid = child.id();
	info!(
		target = "fx.process",
		pid = ?pid,
		executable = %spec.executable().display(),
		args = ?args,
		"browser process started"
	);

	let (lines_tx, lines_rx) = mpsc::unbounded_channel();
	if let Some(stdout) = child.stdout.take() {
		tokio::spawn(drain(stdout, Stream::Stdout, output, Some(lines_tx)));
	}
	if let Some(stderr) = child.stderr.take() {
		tokio::spawn(drain(stderr, Stream::Stderr, output, None));
	}

	let (kill_tx, kill_rx) = mpsc::unbounded_channel();
	let (exit_tx, exit_rx) = watch::channel(None);
	tokio::spawn(reap(child, pid, kill_rx, exit_tx, on_exit));

	Ok((
		ProcessHandle {
			pid,
			kill_tx,
			kill_requested: AtomicBool::new(false),
			exit_rx,
		},
		lines_rx,
	))
}

async fn reap<F>(
	mut child: Child,
	pid: Option<u32>,
	mut kill_rx: mpsc::UnboundedReceiver<()>,
	exit_tx: watch::Sender<Option<ProcessExit>>,
	on_exit: F,
) where
	F: FnOnce(&ProcessExit),
{
	let status = loop {
		tokio::select! {
			status = child.wait() => break status,
			Some(()) = kill_rx.recv() => force_kill(&mut child, pid),
		}
	};

	let exit = match status {
		Ok(status) => ProcessExit::from(status),
		Err(e) => {
			warn!(target = "fx.process", pid = ?pid, error = %e, "failed to wait for browser process");
			ProcessExit::default()
		}
	};

	info!(target = "fx.process", pid = ?pid, exit = %exit, "browser process exited");
	on_exit(&exit);
	exit_tx.send_replace(Some(exit));
}

fn force_kill(child: &mut Child, pid: Option<u32>) {
	debug!(target = "fx.process", pid = ?pid, "killing browser process");

	#[cfg(unix)]
	if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
		use nix::sys::signal::{Signal, killpg};
		use nix::unistd::Pid;

		if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
			debug!(target = "fx.process", pid, error = %e, "killpg failed; killing process only");
		}
	}

	if let Err(e) = child.start_kill() {
		// Already reaped races land here; the wait branch picks up the status.
		debug!(target = "fx.process", pid = ?pid, error = %e, "start_kill failed");
	}
}

#[derive(Debug, Clone, Copy)]
enum Stream {
	Stdout,
	Stderr,
}

impl Stream {
	fn name(self) -> &'static str {
		match self {
			Stream::Stdout => "stdout",
			Stream::Stderr => "stderr",
		}
	}
}

async fn drain<R>(reader: R, stream: Stream, mode: OutputMode, mut lines_tx: Option<mpsc::UnboundedSender<String>>)
where
	R: AsyncRead + Unpin,
{
	let mut segments = BufReader::new(reader).split(b'\n');
	loop {
		let bytes = match segments.next_segment().await {
			Ok(Some(bytes)) => bytes,
			Ok(None) => break,
			Err(e) => {
				debug!(target = "fx.process", stream = stream.name(), error = %e, "output stream read failed");
				break;
			}
		};

		let line = String::from_utf8_lossy(&bytes);
		let line = line.trim_end_matches('\r');

		if let Some(tx) = &lines_tx {
			if tx.send(line.to_string()).is_err() {
				// Readiness scan finished; keep draining.
				lines_tx = None;
			}
		}

		match mode {
			OutputMode::Discard => {}
			OutputMode::Log => {
				info!(target = "fx.browser", stream = stream.name(), "{line}");
			}
			OutputMode::Forward => {
				let result = match stream {
					Stream::Stdout => forward(tokio::io::stdout(), &bytes).await,
					Stream::Stderr => forward(tokio::io::stderr(), &bytes).await,
				};
				if let Err(e) = result {
					debug!(target = "fx.process", stream = stream.name(), error = %e, "failed to forward output");
				}
			}
		}
	}
}

async fn forward<W>(mut writer: W, bytes: &[u8]) -> std::io::Result<()>
where
	W: tokio::io::AsyncWrite + Unpin,
{
	writer.write_all(bytes).await?;
	writer.write_all(b"\n").await?;
	writer.flush().await
}

fn apply_env(cmd: &mut Command, spec: &LaunchSpec) {
	if let Some(env) = spec.env() {
		cmd.env_clear();
		cmd.envs(env);
	}

	#[cfg(target_os = "linux")]
	if let Some(dir) = spec.executable().parent().filter(|d| !d.as_os_str().is_empty()) {
		let existing = match spec.env() {
			Some(env) => env.get(LIBRARY_PATH_VAR).cloned(),
			None => std::env::var(LIBRARY_PATH_VAR).ok(),
		};
		cmd.env(LIBRARY_PATH_VAR, library_path(dir, existing.as_deref()));
	}
}

/// Prepends the executable's directory to an existing library search path.
pub fn library_path(exe_dir: &Path, existing: Option<&str>) -> String {
	let dir = exe_dir.display().to_string();
	match existing.filter(|s| !s.is_empty()) {
		Some(existing) if existing.split(':').any(|p| p == dir) => existing.to_string(),
		Some(existing) => format!("{dir}:{existing}"),
		None => dir,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_library_path_prepends_and_extends() {
		let dir = Path::new("/opt/firefox");
		assert_eq!(library_path(dir, None), "/opt/firefox");
		assert_eq!(library_path(dir, Some("")), "/opt/firefox");
		assert_eq!(library_path(dir, Some("/usr/lib")), "/opt/firefox:/usr/lib");
		assert_eq!(
			library_path(dir, Some("/usr/lib:/opt/firefox")),
			"/usr/lib:/opt/firefox"
		);
	}

	#[test]
	fn test_exit_display() {
		let code = ProcessExit {
			code: Some(3),
			signal: None,
		};
		assert_eq!(code.to_string(), "exit code 3");
		assert!(!code.success());

		let signal = ProcessExit {
			code: None,
			signal: Some(9),
		};
		assert_eq!(signal.to_string(), "signal 9");
		assert_eq!(ProcessExit::default().to_string(), "unknown status");
	}
}
