//! Signal forwarding to launched browsers.
//!
//! Each [`BrowserServer`] registers for the host signals its launch options
//! intercept, and is unregistered when its process exits or the server is
//! dropped. Registrations for the same signal compose: one dispatcher per
//! signal serves every registered server.
//!
//! When a signal arrives, every registered browser is shut down first and the
//! host then takes the signal's default action:
//!
//! - SIGINT kills the browsers, then the host exits with status 130.
//! - SIGTERM and SIGHUP close the browsers gracefully (kill when no transport
//!   is attached yet), then the signal is re-delivered with its default
//!   disposition.
//!
//! The OS-level handler is only installed while a server is registered for the
//! signal. Once the last one is gone the default disposition is restored, so a
//! host without browsers reacts to signals as if nothing had been installed.

use std::sync::{Arc, LazyLock, Weak};

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::process::{ProcessExit, wait_for_exit};
use crate::server::BrowserServer;

/// Host exit status after SIGINT (128 + SIGINT).
pub const SIGINT_EXIT_CODE: i32 = 130;

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(|| Mutex::new(Registry::default()));

/// Which host signals are intercepted for a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalFlags {
	pub sigint: bool,
	pub sigterm: bool,
	pub sighup: bool,
}

impl SignalFlags {
	pub fn any(&self) -> bool {
		self.sigint || self.sigterm || self.sighup
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostSignal {
	Interrupt,
	Terminate,
	Hangup,
}

impl HostSignal {
	const ALL: [HostSignal; 3] = [HostSignal::Interrupt, HostSignal::Terminate, HostSignal::Hangup];

	fn index(self) -> usize {
		self as usize
	}

	fn name(self) -> &'static str {
		match self {
			HostSignal::Interrupt => "SIGINT",
			HostSignal::Terminate => "SIGTERM",
			HostSignal::Hangup => "SIGHUP",
		}
	}

	#[cfg(unix)]
	fn enabled(self, flags: SignalFlags) -> bool {
		match self {
			HostSignal::Interrupt => flags.sigint,
			HostSignal::Terminate => flags.sigterm,
			HostSignal::Hangup => flags.sighup,
		}
	}

	// Only Ctrl-C exists off Unix.
	#[cfg(not(unix))]
	fn enabled(self, flags: SignalFlags) -> bool {
		self == HostSignal::Interrupt && flags.sigint
	}

	#[cfg(unix)]
	fn os(self) -> nix::sys::signal::Signal {
		use nix::sys::signal::Signal;

		match self {
			HostSignal::Interrupt => Signal::SIGINT,
			HostSignal::Terminate => Signal::SIGTERM,
			HostSignal::Hangup => Signal::SIGHUP,
		}
	}
}

/// Keeps a server registered for its signals. Dropping it unregisters.
#[derive(Debug)]
pub struct SignalGuard {
	id: u64,
	exit_watch: JoinHandle<()>,
}

impl Drop for SignalGuard {
	fn drop(&mut self) {
		self.exit_watch.abort();
		unregister(self.id);
	}
}

/// Registers `server` for the signals in `flags`. Returns `None` when no signal
/// is intercepted. The registration ends when `exit` fires.
pub(crate) fn install(
	flags: SignalFlags,
	server: Weak<BrowserServer>,
	mut exit: watch::Receiver<Option<ProcessExit>>,
) -> Result<Option<SignalGuard>> {
	if !flags.any() {
		return Ok(None);
	}

	let id = {
		let mut registry = REGISTRY.lock();
		let id = registry.next_id;
		registry.next_id += 1;

		for signal in HostSignal::ALL.into_iter().filter(|s| s.enabled(flags)) {
			let slot = &mut registry.slots[signal.index()];
			if let Err(e) = slot.activate(signal) {
				registry.remove(id);
				return Err(e);
			}
			slot.servers.push((id, server.clone()));
			debug!(target = "fx.signal", signal = signal.name(), registered = slot.servers.len(), "registered");
		}
		id
	};

	let exit_watch = tokio::spawn(async move {
		wait_for_exit(&mut exit).await;
		unregister(id);
	});
	Ok(Some(SignalGuard { id, exit_watch }))
}

fn unregister(id: u64) {
	REGISTRY.lock().remove(id);
}

#[derive(Default)]
struct Registry {
	next_id: u64,
	slots: [Slot; 3],
}

impl Registry {
	fn remove(&mut self, id: u64) {
		for signal in HostSignal::ALL {
			let slot = &mut self.slots[signal.index()];
			let before = slot.servers.len();
			slot.servers.retain(|(entry, _)| *entry != id);
			if before != slot.servers.len() && slot.servers.is_empty() {
				slot.deactivate(signal);
			}
		}
	}
}

/// Registrations and the dispatcher for one signal.
#[derive(Default)]
struct Slot {
	servers: Vec<(u64, Weak<BrowserServer>)>,
	dispatcher: Option<JoinHandle<()>>,
	/// Set while the dispatcher shuts browsers down. Their exits unregister
	/// them, which must not tear the dispatcher down mid-flight.
	firing: bool,
	/// Handler parked while the default disposition is in place.
	#[cfg(unix)]
	parked: Option<nix::sys::signal::SigAction>,
}

impl Slot {
	fn activate(&mut self, signal: HostSignal) -> Result<()> {
		if self.dispatcher.as_ref().is_some_and(|d| !d.is_finished()) {
			return Ok(());
		}

		// tokio installs its OS handler only once per process; put it back.
		#[cfg(unix)]
		if let Some(handler) = self.parked.take() {
			// SAFETY: restores the handler that `deactivate` displaced.
			unsafe { nix::sys::signal::sigaction(signal.os(), &handler) }.map_err(std::io::Error::from)?;
		}

		let listener = Listener::new(signal)?;
		self.dispatcher = Some(tokio::spawn(dispatch(signal, listener)));
		debug!(target = "fx.signal", signal = signal.name(), "handler installed");
		Ok(())
	}

	fn deactivate(&mut self, signal: HostSignal) {
		if self.firing {
			return;
		}
		if let Some(dispatcher) = self.dispatcher.take() {
			dispatcher.abort();
		}

		#[cfg(unix)]
		match restore_default(signal) {
			Ok(previous) => {
				self.parked.get_or_insert(previous);
			}
			Err(e) => warn!(target = "fx.signal", signal = signal.name(), error = %e, "failed to restore default handler"),
		}
		debug!(target = "fx.signal", signal = signal.name(), "handler uninstalled");
	}

	fn live_servers(&self) -> Vec<Arc<BrowserServer>> {
		self.servers.iter().filter_map(|(_, server)| server.upgrade()).collect()
	}
}

#[cfg(unix)]
fn restore_default(signal: HostSignal) -> nix::Result<nix::sys::signal::SigAction> {
	use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, sigaction};

	let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
	// SAFETY: SIG_DFL carries no handler code.
	unsafe { sigaction(signal.os(), &default) }
}

async fn dispatch(signal: HostSignal, mut listener: Listener) {
	while listener.recv().await {
		let servers = {
			let mut registry = REGISTRY.lock();
			let slot = &mut registry.slots[signal.index()];
			slot.firing = true;
			slot.live_servers()
		};
		info!(target = "fx.signal", signal = signal.name(), browsers = servers.len(), "shutting down browsers");

		join_all(servers.iter().map(|server| async move {
			match signal {
				HostSignal::Interrupt => server.abort().await,
				HostSignal::Terminate | HostSignal::Hangup => server.close_or_kill().await,
			}
		}))
		.await;

		default_action(signal);

		// Still alive: the default action could not be taken.
		{
			let mut registry = REGISTRY.lock();
			let slot = &mut registry.slots[signal.index()];
			slot.firing = false;
			if slot.servers.is_empty() {
				slot.dispatcher = None;
				return;
			}
		}
	}
}

fn default_action(signal: HostSignal) {
	if signal == HostSignal::Interrupt {
		info!(target = "fx.signal", "browsers handled SIGINT; exiting");
		std::process::exit(SIGINT_EXIT_CODE);
	}

	#[cfg(unix)]
	{
		info!(target = "fx.signal", signal = signal.name(), "browsers closed; re-raising");
		let raised = restore_default(signal).and_then(|_| nix::sys::signal::raise(signal.os()));
		if let Err(e) = raised {
			warn!(target = "fx.signal", signal = signal.name(), error = %e, "failed to re-raise signal");
		}
	}
}

#[cfg(unix)]
struct Listener(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Listener {
	fn new(signal: HostSignal) -> Result<Self> {
		use tokio::signal::unix::SignalKind;

		let kind = match signal {
			HostSignal::Interrupt => SignalKind::interrupt(),
			HostSignal::Terminate => SignalKind::terminate(),
			HostSignal::Hangup => SignalKind::hangup(),
		};
		Ok(Self(tokio::signal::unix::signal(kind)?))
	}

	async fn recv(&mut self) -> bool {
		self.0.recv().await.is_some()
	}
}

#[cfg(not(unix))]
struct Listener;

#[cfg(not(unix))]
impl Listener {
	fn new(_signal: HostSignal) -> Result<Self> {
		Ok(Self)
	}

	async fn recv(&mut self) -> bool {
		tokio::signal::ctrl_c().await.is_ok()
	}
}

#[cfg(test)]
fn registered(signal: HostSignal) -> usize {
	REGISTRY.lock().slots[signal.index()].servers.len()
}
