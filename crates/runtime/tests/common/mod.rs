//! Shell-script fake browsers and the WebSocket endpoint they announce.
//!
//! Each fake browser records its argv and pid in a state directory, checks the
//! generated profile, announces a WebSocket endpoint served by the test
//! process, and exits once that endpoint receives `Browser.close`.

#![allow(dead_code)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use fx_runtime::LaunchOptions;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const CLOSED_MARKER: &str = "closed";
const CLOSE_LOG: &str = "close_requests";
const SELF_EXIT_MARKER: &str = "selfexit";

/// WebSocket endpoint standing in for the browser's remote protocol.
pub struct FakeEndpoint {
	pub url: String,
	close_requests: Arc<AtomicUsize>,
}

impl FakeEndpoint {
	/// Serves `ws://127.0.0.1:<port>/<path>`. Each `Browser.close` request is
	/// logged to `state` and touches its closed marker so the browser exits.
	pub async fn start(path: &str, state: &Path) -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("ws://{}/{path}", listener.local_addr().unwrap());
		let close_requests = Arc::new(AtomicUsize::new(0));

		let requests = Arc::clone(&close_requests);
		let state = state.to_path_buf();
		tokio::spawn(async move {
			while let Ok((stream, _)) = listener.accept().await {
				let requests = Arc::clone(&requests);
				let state = state.clone();
				tokio::spawn(async move {
					let Ok(mut ws) = accept_async(stream).await else {
						return;
					};
					while let Some(Ok(Message::Text(text))) = ws.next().await {
						let message: Value = serde_json::from_str(&text).unwrap();
						if message["method"] == "Browser.close" {
							requests.fetch_add(1, Ordering::SeqCst);
							record_close(&state);
						}
						let reply = json!({"id": message["id"], "result": {}});
						if ws.send(Message::Text(reply.to_string())).await.is_err() {
							break;
						}
					}
				});
			}
		});

		Self { url, close_requests }
	}

	pub fn close_requests(&self) -> usize {
		self.close_requests.load(Ordering::SeqCst)
	}
}

// Logged before the marker so the count survives the host being signalled.
fn record_close(state: &Path) {
	let mut log = std::fs::OpenOptions::new()
		.create(true)
		.append(true)
		.open(state.join(CLOSE_LOG))
		.unwrap();
	writeln!(log, "Browser.close").unwrap();
	std::fs::write(state.join(CLOSED_MARKER), b"").unwrap();
}

pub struct FakeBrowser {
	state: PathBuf,
	executable: PathBuf,
	_temp: Option<TempDir>,
}

impl FakeBrowser {
	pub fn new() -> Self {
		let temp = tempfile::tempdir().unwrap();
		let mut browser = Self::in_dir(temp.path());
		browser._temp = Some(temp);
		browser
	}

	/// Browser whose state lives in `dir`, which outlives it.
	pub fn in_dir(dir: &Path) -> Self {
		std::fs::create_dir_all(dir).unwrap();
		Self {
			state: dir.to_path_buf(),
			executable: dir.join("fake-firefox"),
			_temp: None,
		}
	}

	/// Announces `endpoint` after `delay`, then runs until closed.
	pub fn announcing(self, endpoint: &str, delay: Duration) -> Self {
		self.install(&announce(endpoint, delay, "[ ! -f \"$STATE/closed\" ]"))
	}

	/// Announces `endpoint` and exits on its own right away.
	pub fn announcing_then_exiting(self, endpoint: &str) -> Self {
		self.install(&format!("echo \"Listening on {endpoint}\"\nexit 0\n"))
	}

	/// Like [`announcing`](Self::announcing), but also exits on its own once
	/// [`trigger_self_exit`](Self::trigger_self_exit) is called.
	pub fn announcing_until_self_exit(self, endpoint: &str) -> Self {
		self.install(&announce(
			endpoint,
			Duration::ZERO,
			"[ ! -f \"$STATE/closed\" ] && [ ! -f \"$STATE/selfexit\" ]",
		))
	}

	/// Writes `lines` lines to both stdout and stderr right after announcing.
	pub fn announcing_then_flooding(self, endpoint: &str, lines: usize) -> Self {
		let flood = format!(
			"i=0\nwhile [ $i -lt {lines} ]; do\n\techo \"stdout filler line $i after readiness\"\n\techo \"stderr filler line $i after readiness\" >&2\n\ti=$((i + 1))\ndone\n"
		);
		let body = announce(endpoint, Duration::ZERO, "[ ! -f \"$STATE/closed\" ]");
		let (announce_line, wait) = body.split_once('\n').unwrap();
		self.install(&format!("{announce_line}\n{flood}{wait}"))
	}

	/// Records the named environment variables, then behaves like
	/// [`announcing`](Self::announcing).
	pub fn announcing_with_env(self, endpoint: &str, names: &[&str]) -> Self {
		let record: String = names
			.iter()
			.map(|name| format!("printf '%s' \"${{{name}-<unset>}}\" > \"$STATE/env.{name}\"\n"))
			.collect();
		let body = announce(endpoint, Duration::ZERO, "[ ! -f \"$STATE/closed\" ]");
		self.install(&format!("{record}{body}"))
	}

	/// Starts a background helper in the browser's process group before
	/// announcing.
	pub fn announcing_with_helper(self, endpoint: &str) -> Self {
		let body = announce(endpoint, Duration::ZERO, "[ ! -f \"$STATE/closed\" ]");
		self.install(&format!("sleep 30 &\necho $! > \"$STATE/helper\"\n{body}"))
	}

	/// Never announces anything.
	pub fn silent(self) -> Self {
		self.install("exec sleep 30\n")
	}

	/// Fails during startup.
	pub fn crashing(self) -> Self {
		self.install("echo \"Error: no DISPLAY environment variable specified\"\nexit 1\n")
	}

	fn install(self, body: &str) -> Self {
		let script = format!(
			r#"#!/bin/sh
STATE="{state}"
echo $$ > "$STATE/pid"
printf '%s\n' "$@" > "$STATE/args"
profile=""
while [ $# -gt 0 ]; do
	if [ "$1" = "-profile" ]; then profile="$2"; fi
	shift
done
echo "$profile" > "$STATE/profile"
if [ -n "$profile" ] && [ ! -f "$profile/user.js" ]; then
	echo "missing user.js"
	exit 3
fi
{body}"#,
			state = self.state.display(),
		);
		std::fs::write(&self.executable, script).unwrap();
		std::fs::set_permissions(&self.executable, std::fs::Permissions::from_mode(0o755)).unwrap();
		self
	}

	pub fn state(&self) -> &Path {
		&self.state
	}

	pub fn executable(&self) -> &Path {
		&self.executable
	}

	pub fn options(&self) -> LaunchOptions {
		LaunchOptions::new().executable_path(&self.executable).timeout(5_000)
	}

	pub fn trigger_self_exit(&self) {
		std::fs::write(self.state.join(SELF_EXIT_MARKER), b"").unwrap();
	}

	pub fn started(&self) -> bool {
		self.state.join("pid").exists()
	}

	pub fn recorded(&self, name: &str) -> String {
		std::fs::read_to_string(self.state.join(name))
			.unwrap_or_default()
			.trim()
			.to_string()
	}

	pub fn args(&self) -> Vec<String> {
		self.recorded("args").lines().map(str::to_string).collect()
	}

	pub fn profile(&self) -> PathBuf {
		PathBuf::from(self.recorded("profile"))
	}

	pub fn pid(&self) -> i32 {
		self.recorded("pid").parse().unwrap()
	}

	pub fn helper_pid(&self) -> i32 {
		self.recorded("helper").parse().unwrap()
	}

	/// Value of `name` as the browser saw it, `<unset>` when absent.
	pub fn env_var(&self, name: &str) -> String {
		self.recorded(&format!("env.{name}"))
	}

	/// `Browser.close` requests logged by this browser's endpoint.
	pub fn logged_close_requests(&self) -> usize {
		self.recorded(CLOSE_LOG).lines().count()
	}
}

fn announce(endpoint: &str, delay: Duration, running_while: &str) -> String {
	let sleep = if delay.is_zero() {
		String::new()
	} else {
		format!("sleep {}\n", delay.as_secs_f64())
	};
	format!("{sleep}echo \"Juggler listening on {endpoint}\"\nwhile {running_while}; do sleep 0.02; done\nexit 0\n")
}

/// A browser announcing an endpoint that closes it on `Browser.close`.
pub async fn browser_and_endpoint(path: &str, delay: Duration) -> (FakeBrowser, FakeEndpoint) {
	let browser = FakeBrowser::new();
	let endpoint = FakeEndpoint::start(path, browser.state()).await;
	(browser.announcing(&endpoint.url, delay), endpoint)
}

/// Same as [`browser_and_endpoint`], rooted in `dir`.
pub async fn browser_and_endpoint_in(dir: &Path, path: &str) -> (FakeBrowser, FakeEndpoint) {
	let browser = FakeBrowser::in_dir(dir);
	let endpoint = FakeEndpoint::start(path, browser.state()).await;
	(browser.announcing(&endpoint.url, Duration::ZERO), endpoint)
}

pub fn process_alive(pid: i32) -> bool {
	if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err() {
		return false;
	}
	// Zombies still accept signal 0.
	match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
		Ok(stat) => !stat
			.rsplit_once(')')
			.is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
		Err(_) => cfg!(not(target_os = "linux")),
	}
}

/// Polls until `pid` is gone. Orphans are reaped asynchronously.
pub fn process_gone_within(pid: i32, limit: Duration) -> bool {
	let deadline = Instant::now() + limit;
	while process_alive(pid) {
		if Instant::now() >= deadline {
			return false;
		}
		std::thread::sleep(Duration::from_millis(20));
	}
	true
}
