//! Validated launch description and default argument assembly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};
use crate::options::{LaunchOptions, OutputMode};
use crate::signals::SignalFlags;

/// Default readiness line: `Juggler listening on ws://...` or `Listening on ws://...`.
pub const DEFAULT_READINESS_PATTERN: &str = r"^(?:Juggler )?[Ll]istening on (ws://\S+)";

/// Destination appended when every passthrough argument is a flag.
pub const BLANK_PAGE: &str = "about:blank";

const NO_REMOTE: &str = "-no-remote";
const FOREGROUND: &str = "-foreground";
const HEADLESS: &str = "-headless";
const PROFILE_FLAGS: &[&str] = &["-profile", "--profile"];
const JUGGLER_FLAGS: &[&str] = &["-juggler", "--juggler"];
const AUTO_PORT: &str = "0";

/// Where the profile directory comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilePolicy {
	/// Auto-created, removed after exit.
	Temporary,
	/// Supplied by the caller, never removed.
	UserSupplied(PathBuf),
	/// The caller passed `-profile` in raw arguments (default args bypassed).
	FromArguments,
}

/// Immutable description of one browser launch.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
	executable: PathBuf,
	args: Vec<String>,
	/// Index at which `-profile <dir>` is inserted into the command line.
	profile_slot: usize,
	env: Option<BTreeMap<String, String>>,
	profile: ProfilePolicy,
	output: OutputMode,
	signals: SignalFlags,
	timeout: Option<Duration>,
	readiness: Regex,
}

impl LaunchSpec {
	/// Assembles the argument list. `options` must already have passed
	/// [`validate`].
	///
	/// # Errors
	///
	/// [`Error::InvalidArgument`] when the readiness pattern does not compile.
	pub fn new(options: &LaunchOptions, executable: PathBuf) -> Result<Self> {
		let readiness = Regex::new(options.readiness_pattern.as_deref().unwrap_or(DEFAULT_READINESS_PATTERN))
			.map_err(|e| Error::InvalidArgument(format!("readiness pattern: {e}")))?;

		let mut args = if options.ignore_default_args.ignores_all() {
			options.args.clone()
		} else {
			let deny = options.ignore_default_args.denylist();
			default_args(options)
				.into_iter()
				.filter(|arg| !deny.contains(arg))
				.collect()
		};

		let profile_slot = args
			.iter()
			.take_while(|a| matches!(a.as_str(), NO_REMOTE | FOREGROUND | HEADLESS))
			.count();

		if !args.iter().any(|a| JUGGLER_FLAGS.contains(&a.as_str())) {
			args.splice(
				profile_slot..profile_slot,
				[JUGGLER_FLAGS[0].to_string(), AUTO_PORT.to_string()],
			);
		}

		let profile = if args.iter().any(|a| is_profile_flag(a)) {
			ProfilePolicy::FromArguments
		} else if let Some(dir) = &options.user_data_dir {
			ProfilePolicy::UserSupplied(dir.clone())
		} else {
			ProfilePolicy::Temporary
		};

		Ok(Self {
			executable,
			args,
			profile_slot,
			env: options.env.clone(),
			profile,
			output: options.output,
			signals: SignalFlags {
				sigint: options.handle_sigint,
				sigterm: options.handle_sigterm,
				sighup: options.handle_sighup,
			},
			timeout: (options.timeout > 0).then(|| Duration::from_millis(options.timeout)),
			readiness,
		})
	}

	pub fn executable(&self) -> &Path {
		&self.executable
	}

	/// Assembled arguments, without the profile directory.
	pub fn args(&self) -> &[String] {
		&self.args
	}

	/// Full command line for a provisioned profile directory.
	pub fn command_args(&self, profile_dir: Option<&Path>) -> Vec<String> {
		let mut args = self.args.clone();
		if let Some(dir) = profile_dir.filter(|_| self.profile != ProfilePolicy::FromArguments) {
			args.splice(
				self.profile_slot..self.profile_slot,
				[PROFILE_FLAGS[0].to_string(), dir.display().to_string()],
			);
		}
		args
	}

	pub fn env(&self) -> Option<&BTreeMap<String, String>> {
		self.env.as_ref()
	}

	pub fn profile(&self) -> &ProfilePolicy {
		&self.profile
	}

	pub fn output(&self) -> OutputMode {
		self.output
	}

	pub fn signals(&self) -> SignalFlags {
		self.signals
	}

	/// Readiness deadline; `None` waits indefinitely.
	pub fn timeout(&self) -> Option<Duration> {
		self.timeout
	}

	pub fn readiness_pattern(&self) -> &Regex {
		&self.readiness
	}
}

/// Rejects option combinations that cannot be launched.
pub fn validate(options: &LaunchOptions) -> Result<()> {
	if options.devtools {
		return Err(Error::Unsupported(
			"devtools is not supported for this browser; remove the devtools option".to_string(),
		));
	}

	if !options.ignore_default_args.ignores_all() {
		if let Some(arg) = options.args.iter().find(|a| is_profile_flag(a)) {
			return Err(Error::InvalidArgument(format!(
				"pass the profile directory via user_data_dir instead of the '{arg}' argument"
			)));
		}
	}

	Ok(())
}

fn is_profile_flag(arg: &str) -> bool {
	PROFILE_FLAGS
		.iter()
		.any(|flag| arg == *flag || arg.strip_prefix(flag).is_some_and(|rest| rest.starts_with('=')))
}

/// Default arguments: fixed leading flags, the caller's passthrough arguments,
/// and a blank page when the caller named no destination.
pub fn default_args(options: &LaunchOptions) -> Vec<String> {
	let mut args = vec![NO_REMOTE.to_string()];
	if cfg!(target_os = "macos") {
		args.push(FOREGROUND.to_string());
	}
	if options.headless {
		args.push(HEADLESS.to_string());
	}

	args.extend(options.args.iter().cloned());
	if options.args.iter().all(|arg| arg.starts_with('-')) {
		args.push(BLANK_PAGE.to_string());
	}
	args
}
