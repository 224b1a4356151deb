//! Launch options supplied by callers and the CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default readiness timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// What happens to the browser's stdout/stderr once readiness has been detected.
///
/// Stdout is always piped so the readiness line can be observed; this mode only
/// controls where the bytes end up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
	/// Drain and drop.
	#[default]
	Discard,
	/// Copy to the parent's stdout/stderr ("dumpio").
	Forward,
	/// Emit each line as a `tracing` event on target `fx.browser`.
	Log,
}

/// Controls default argument assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreDefaultArgs {
	/// `false`: assemble default arguments.
	/// `true`: use only the caller's arguments.
	Bool(bool),
	/// Assemble default arguments, then drop these exact entries.
	Filter(Vec<String>),
}

impl Default for IgnoreDefaultArgs {
	fn default() -> Self {
		IgnoreDefaultArgs::Bool(false)
	}
}

impl IgnoreDefaultArgs {
	pub fn ignores_all(&self) -> bool {
		matches!(self, IgnoreDefaultArgs::Bool(true))
	}

	/// Entries to drop from the assembled default arguments.
	pub fn denylist(&self) -> &[String] {
		match self {
			IgnoreDefaultArgs::Filter(list) => list,
			_ => &[],
		}
	}
}

/// Options for launching a browser.
///
/// Use the builder methods to customize; unset fields fall back to defaults.
///
/// # Example
///
/// ```ignore
/// let options = LaunchOptions::new()
///     .headless(false)
///     .args(["--width=1280"])
///     .timeout(10_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchOptions {
	/// Browser executable; resolved automatically when unset.
	pub executable_path: Option<PathBuf>,

	/// Extra arguments passed through to the browser.
	pub args: Vec<String>,

	/// Bypass or filter default argument assembly.
	pub ignore_default_args: IgnoreDefaultArgs,

	/// Environment for the browser process. Inherits the host environment when unset.
	pub env: Option<BTreeMap<String, String>>,

	/// Run without a visible window.
	pub headless: bool,

	/// Open devtools. Not supported; rejected at launch.
	pub devtools: bool,

	/// Where the browser's output goes.
	pub output: OutputMode,

	/// Kill the browser on SIGINT.
	#[serde(rename = "handleSIGINT")]
	pub handle_sigint: bool,

	/// Close the browser gracefully on SIGTERM.
	#[serde(rename = "handleSIGTERM")]
	pub handle_sigterm: bool,

	/// Close the browser gracefully on SIGHUP.
	#[serde(rename = "handleSIGHUP")]
	pub handle_sighup: bool,

	/// Readiness timeout in milliseconds. 0 disables the deadline.
	pub timeout: u64,

	/// Profile directory. A temporary one is created when unset.
	pub user_data_dir: Option<PathBuf>,

	/// Preference overrides written into the profile on top of the defaults.
	pub prefs: BTreeMap<String, Value>,

	/// Regex matched against each stdout line. Capture group 1 is the endpoint.
	pub readiness_pattern: Option<String>,
}

impl Default for LaunchOptions {
	fn default() -> Self {
		Self {
			executable_path: None,
			args: Vec::new(),
			ignore_default_args: IgnoreDefaultArgs::default(),
			env: None,
			headless: true,
			devtools: false,
			output: OutputMode::Discard,
			handle_sigint: true,
			handle_sigterm: true,
			handle_sighup: true,
			timeout: DEFAULT_TIMEOUT_MS,
			user_data_dir: None,
			prefs: BTreeMap::new(),
			readiness_pattern: None,
		}
	}
}

impl LaunchOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn executable_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.executable_path = Some(path.into());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args = args.into_iter().map(Into::into).collect();
		self
	}

	/// Uses only the caller's arguments.
	pub fn ignore_all_default_args(mut self) -> Self {
		self.ignore_default_args = IgnoreDefaultArgs::Bool(true);
		self
	}

	/// Drops the given entries from the assembled default arguments.
	pub fn ignore_default_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.ignore_default_args = IgnoreDefaultArgs::Filter(args.into_iter().map(Into::into).collect());
		self
	}

	pub fn env<I, K, V>(mut self, env: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.env = Some(env.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
		self
	}

	pub fn headless(mut self, headless: bool) -> Self {
		self.headless = headless;
		self
	}

	pub fn devtools(mut self, devtools: bool) -> Self {
		self.devtools = devtools;
		self
	}

	pub fn output(mut self, output: OutputMode) -> Self {
		self.output = output;
		self
	}

	/// Shorthand for [`OutputMode::Forward`].
	pub fn dumpio(self, dumpio: bool) -> Self {
		self.output(if dumpio { OutputMode::Forward } else { OutputMode::Discard })
	}

	pub fn handle_sigint(mut self, handle: bool) -> Self {
		self.handle_sigint = handle;
		self
	}

	pub fn handle_sigterm(mut self, handle: bool) -> Self {
		self.handle_sigterm = handle;
		self
	}

	pub fn handle_sighup(mut self, handle: bool) -> Self {
		self.handle_sighup = handle;
		self
	}

	/// Disables all signal interception.
	pub fn no_signal_handlers(self) -> Self {
		self.handle_sigint(false).handle_sigterm(false).handle_sighup(false)
	}

	/// Readiness timeout in milliseconds.
	pub fn timeout(mut self, timeout_ms: u64) -> Self {
		self.timeout = timeout_ms;
		self
	}

	pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.user_data_dir = Some(dir.into());
		self
	}

	pub fn pref(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.prefs.insert(key.into(), value.into());
		self
	}

	pub fn readiness_pattern(mut self, pattern: impl Into<String>) -> Self {
		self.readiness_pattern = Some(pattern.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_defaults() {
		let options = LaunchOptions::default();
		assert!(options.headless);
		assert!(!options.devtools);
		assert!(options.handle_sigint && options.handle_sigterm && options.handle_sighup);
		assert_eq!(options.timeout, DEFAULT_TIMEOUT_MS);
		assert_eq!(options.ignore_default_args, IgnoreDefaultArgs::Bool(false));
	}

	#[test]
	fn test_deserialize_camel_case() {
		let options: LaunchOptions = serde_json::from_value(json!({
			"executablePath": "/opt/firefox/firefox",
			"args": ["--kiosk"],
			"headless": false,
			"output": "forward",
			"handleSIGINT": false,
			"timeout": 500,
			"prefs": {"browser.startup.page": 1}
		}))
		.unwrap();

		assert_eq!(options.executable_path, Some(PathBuf::from("/opt/firefox/firefox")));
		assert_eq!(options.args, vec!["--kiosk"]);
		assert!(!options.headless);
		assert_eq!(options.output, OutputMode::Forward);
		assert!(!options.handle_sigint);
		assert!(options.handle_sigterm);
		assert_eq!(options.timeout, 500);
		assert_eq!(options.prefs["browser.startup.page"], json!(1));
	}

	#[test]
	fn test_ignore_default_args_accepts_bool_or_list() {
		let all: LaunchOptions = serde_json::from_value(json!({"ignoreDefaultArgs": true})).unwrap();
		assert!(all.ignore_default_args.ignores_all());

		let some: LaunchOptions =
			serde_json::from_value(json!({"ignoreDefaultArgs": ["-headless"]})).unwrap();
		assert_eq!(some.ignore_default_args.denylist(), ["-headless".to_string()]);
		assert!(!some.ignore_default_args.ignores_all());
	}

	#[test]
	fn test_builder_chain() {
		let options = LaunchOptions::new()
			.dumpio(true)
			.no_signal_handlers()
			.env([("MOZ_LOG", "sync")])
			.pref("a", true);

		assert_eq!(options.output, OutputMode::Forward);
		assert!(!options.handle_sigint && !options.handle_sigterm && !options.handle_sighup);
		assert_eq!(options.env.unwrap()["MOZ_LOG"], "sync");
		assert_eq!(options.prefs["a"], json!(true));
	}
}
