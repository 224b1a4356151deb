//! Browser server supervision
//!
//! [`BrowserServer`] owns a launched browser process for its whole lifetime.
//! Shutdown is two-phase: [`BrowserServer::close`] politely asks the browser to
//! quit over the existing transport, [`BrowserServer::kill`] terminates it.
//!
//! # State machine
//!
//! ```text
//! Running ──close()──► ClosingGracefully ──exit──► Exited
//!    │                                               ▲
//!    └───────────────── exit / kill() ───────────────┘
//! ```
//!
//! Every transition is a single compare-and-swap, so `close()` may race freely
//! with signal handlers and with the process exiting on its own.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{Result, millis};
use crate::process::{self, ProcessExit, ProcessHandle};
use crate::profile::Profile;
use crate::signals::{self, SignalGuard};
use crate::spec::LaunchSpec;
use crate::transport::{TransportSender, browser_close_message};

/// How long to wait for the process after a forced kill.
pub const KILL_WAIT: Duration = Duration::from_secs(5);

const RUNNING: u8 = 0;
const CLOSING: u8 = 1;
const EXITED: u8 = 2;

/// Lifecycle state of a [`BrowserServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
	Running,
	ClosingGracefully,
	Exited,
}

impl ServerState {
	fn from_raw(raw: u8) -> Self {
		match raw {
			RUNNING => ServerState::Running,
			CLOSING => ServerState::ClosingGracefully,
			_ => ServerState::Exited,
		}
	}
}

/// A launched browser process and its shutdown protocol.
///
/// Dropping the last reference kills the process if it is still running; the
/// waiter task still reaps it and removes a temporary profile afterwards.
#[derive(Debug)]
pub struct BrowserServer {
	process: ProcessHandle,
	state: Arc<AtomicU8>,
	endpoint: OnceLock<String>,
	profile_path: Option<PathBuf>,
	transport: Mutex<Option<TransportSender>>,
	signals: Mutex<Option<SignalGuard>>,
}

impl BrowserServer {
	/// Spawns the process for `spec`. The profile (if any) is removed by the
	/// waiter task once the process has exited.
	pub(crate) fn spawn(
		spec: &LaunchSpec,
		profile: Option<Profile>,
	) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<String>)> {
		let state = Arc::new(AtomicU8::new(RUNNING));
		let profile_path = profile.as_ref().map(|p| p.path().to_path_buf());

		let exit_state = Arc::clone(&state);
		let (process, lines) = process::spawn(spec, profile_path.as_deref(), move |_exit| {
			exit_state.store(EXITED, Ordering::Release);
			if let Some(profile) = profile {
				if let Err(e) = profile.remove() {
					warn!(target = "fx.server", error = %e, "failed to remove temporary profile");
				}
			}
		})?;

		let server = Arc::new(Self {
			process,
			state,
			endpoint: OnceLock::new(),
			profile_path,
			transport: Mutex::new(None),
			signals: Mutex::new(None),
		});
		Ok((server, lines))
	}

	/// Registers signal forwarding for this server only.
	pub(crate) fn install_signal_handlers(self: &Arc<Self>, flags: signals::SignalFlags) -> Result<()> {
		let guard = signals::install(flags, Arc::downgrade(self), self.process.subscribe())?;
		*self.signals.lock() = guard;
		Ok(())
	}

	/// Stores the channel used for the graceful close request.
	pub(crate) fn set_transport(&self, sender: TransportSender) {
		*self.transport.lock() = Some(sender);
	}

	/// Exposes the endpoint to callers (server launch mode).
	pub(crate) fn expose_endpoint(&self, endpoint: String) {
		let _ = self.endpoint.set(endpoint);
	}

	/// Endpoint announced by the browser. Only set for servers created with
	/// `launch_server`.
	pub fn endpoint(&self) -> Option<&str> {
		self.endpoint.get().map(String::as_str)
	}

	pub fn pid(&self) -> Option<u32> {
		self.process.pid()
	}

	/// Profile directory the browser runs against, when one was provisioned.
	pub fn profile_path(&self) -> Option<&Path> {
		self.profile_path.as_deref()
	}

	pub fn state(&self) -> ServerState {
		ServerState::from_raw(self.state.load(Ordering::Acquire))
	}

	/// Exit status once the process has been reaped and cleaned up.
	pub fn exit_status(&self) -> Option<ProcessExit> {
		self.process.exit_status()
	}

	/// Receiver for the exit notification. Changes exactly once.
	pub fn exit_receiver(&self) -> watch::Receiver<Option<ProcessExit>> {
		self.process.subscribe()
	}

	/// Waits until the process has exited and its temporary profile is gone.
	pub async fn wait_for_exit(&self) -> ProcessExit {
		self.process.wait().await
	}

	/// Asks the browser to close and waits for it to exit.
	///
	/// Idempotent: the close request is sent at most once, and calling this
	/// after the process exited returns immediately. There is no internal
	/// deadline; see [`BrowserServer::close_with_timeout`].
	pub async fn close(&self) -> Result<()> {
		match self
			.state
			.compare_exchange(RUNNING, CLOSING, Ordering::AcqRel, Ordering::Acquire)
		{
			Ok(_) => self.request_close().await,
			Err(EXITED) => debug!(target = "fx.server", pid = ?self.pid(), "close after exit is a no-op"),
			Err(_) => debug!(target = "fx.server", pid = ?self.pid(), "close already in progress"),
		}

		self.process.wait().await;
		Ok(())
	}

	/// [`close`](Self::close), escalating to [`kill`](Self::kill) when the
	/// browser has not exited within `grace`.
	pub async fn close_with_timeout(&self, grace: Duration) -> Result<ProcessExit> {
		if tokio::time::timeout(grace, self.close()).await.is_err() {
			warn!(
				target = "fx.server",
				pid = ?self.pid(),
				grace_ms = millis(grace),
				"browser did not close in time; killing"
			);
			self.kill();
		}
		self.wait_bounded().await;
		Ok(self.exit_status().unwrap_or_default())
	}

	/// Terminates the process (and its process group on Unix), bypassing the
	/// transport. Safe to call in any state; only the first call signals.
	pub fn kill(&self) {
		if self.process.kill() {
			info!(target = "fx.server", pid = ?self.pid(), "kill requested");
		}
	}

	/// Graceful close when a transport is available, kill otherwise. Bounded
	/// by [`KILL_WAIT`] either way.
	pub(crate) async fn close_or_kill(&self) {
		if self.transport.lock().is_none() {
			self.abort().await;
		} else if let Err(e) = self.close_with_timeout(KILL_WAIT).await {
			warn!(target = "fx.server", error = %e, "graceful close failed");
		}
	}

	/// Kills a half-started process and waits (bounded) for the exit hook.
	pub(crate) async fn abort(&self) {
		self.kill();
		self.wait_bounded().await;
	}

	async fn wait_bounded(&self) {
		if tokio::time::timeout(KILL_WAIT, self.process.wait()).await.is_err() {
			warn!(
				target = "fx.server",
				pid = ?self.pid(),
				"browser process did not exit {}s after kill",
				KILL_WAIT.as_secs()
			);
		}
	}

	async fn request_close(&self) {
		let sender = self.transport.lock().clone();
		let Some(sender) = sender else {
			debug!(target = "fx.server", pid = ?self.pid(), "no transport; graceful close unavailable");
			return;
		};

		// The process may have died between the state swap and now.
		if self.state.load(Ordering::Acquire) != CLOSING {
			return;
		}

		info!(target = "fx.server", pid = ?self.pid(), "requesting graceful close");
		if let Err(e) = sender.send(&browser_close_message()).await {
			warn!(target = "fx.server", pid = ?self.pid(), error = %e, "close request failed; killing");
			self.kill();
		}
	}
}

impl Drop for BrowserServer {
	fn drop(&mut self) {
		if !self.process.has_exited() {
			debug!(target = "fx.server", pid = ?self.pid(), "server dropped while running; killing");
			self.process.kill();
		}
	}
}
