//! Error types for the launcher runtime.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::process::ProcessExit;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while launching, connecting to, or supervising a browser.
#[derive(Debug, Error)]
pub enum Error {
	/// Profile directory could not be created, validated, or written.
	#[error("Failed to provision profile at {}: {source}", path.display())]
	Provision {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// Browser executable was not found.
	#[error("Browser executable not found at {} (from {origin}). Pass an explicit executable path or set FX_EXECUTABLE_PATH.", path.display())]
	ExecutableNotFound {
		path: PathBuf,
		/// Where the candidate path came from (option, env var, PATH lookup).
		origin: &'static str,
	},

	/// Failed to spawn the browser process.
	#[error("Failed to launch browser: {0}")]
	LaunchFailed(String),

	/// Invalid argument combination in the launch options.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Requested feature is not supported by this launcher.
	#[error("Unsupported option: {0}")]
	Unsupported(String),

	/// Deadline elapsed while waiting for something.
	#[error("Timed out after {ms}ms waiting for {waited_for}")]
	Timeout { waited_for: String, ms: u64 },

	/// Process exited before announcing its endpoint.
	#[error("Browser process exited ({exit}) before it was ready.{}", format_output(output))]
	ExitedBeforeReady { exit: ProcessExit, output: Vec<String> },

	/// Failed to establish a transport connection.
	#[error("Failed to connect to {endpoint}: {reason}")]
	ConnectionFailed { endpoint: String, reason: String },

	/// Transport-level error after the connection was established.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

fn format_output(lines: &[String]) -> String {
	if lines.is_empty() {
		return String::new();
	}
	format!("\n--- last output ---\n{}", lines.join("\n"))
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}

	/// Returns true if the browser executable could not be located.
	pub fn is_missing_executable(&self) -> bool {
		matches!(self, Error::ExecutableNotFound { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timeout_message_names_condition_and_duration() {
		let err = Error::Timeout {
			waited_for: "browser readiness line".to_string(),
			ms: 50,
		};
		assert!(err.is_timeout());
		assert_eq!(
			err.to_string(),
			"Timed out after 50ms waiting for browser readiness line"
		);
	}

	#[test]
	fn test_exited_before_ready_includes_output_tail() {
		let err = Error::ExitedBeforeReady {
			exit: ProcessExit {
				code: Some(1),
				signal: None,
			},
			output: vec!["XPCOMGlueLoad error".to_string()],
		};
		let msg = err.to_string();
		assert!(msg.contains("exit code 1"), "{msg}");
		assert!(msg.contains("XPCOMGlueLoad error"), "{msg}");
	}

	#[test]
	fn test_millis_saturates() {
		assert_eq!(millis(Duration::from_millis(1500)), 1500);
		assert_eq!(millis(Duration::MAX), u64::MAX);
	}

	#[test]
	fn test_missing_executable_names_path() {
		let err = Error::ExecutableNotFound {
			path: PathBuf::from("/nope/firefox"),
			origin: "FX_EXECUTABLE_PATH",
		};
		assert!(err.is_missing_executable());
		assert!(err.to_string().contains("/nope/firefox"));
	}
}
