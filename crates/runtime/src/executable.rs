//! Browser executable resolution
//!
//! Locates the browser binary to launch, in order:
//! 1. An explicit path from the launch options
//! 2. The `FX_EXECUTABLE_PATH` environment variable
//! 3. A `firefox`-family binary on `PATH`
//! 4. Well-known platform install locations
//!
//! Explicit and environment paths are authoritative: if they point at nothing,
//! resolution fails instead of silently falling back.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable overriding the browser executable.
pub const EXECUTABLE_ENV: &str = "FX_EXECUTABLE_PATH";

const PATH_CANDIDATES: &[&str] = &["firefox", "firefox-nightly", "firefox-developer-edition"];

#[cfg(target_os = "macos")]
const COMMON_LOCATIONS: &[&str] = &[
	"/Applications/Firefox.app/Contents/MacOS/firefox",
	"/Applications/Firefox Nightly.app/Contents/MacOS/firefox",
];

#[cfg(windows)]
const COMMON_LOCATIONS: &[&str] = &[
	"C:\\Program Files\\Mozilla Firefox\\firefox.exe",
	"C:\\Program Files (x86)\\Mozilla Firefox\\firefox.exe",
];

#[cfg(not(any(target_os = "macos", windows)))]
const COMMON_LOCATIONS: &[&str] = &["/usr/lib/firefox/firefox", "/usr/bin/firefox", "/snap/bin/firefox"];

/// Resolves the browser executable.
///
/// # Errors
///
/// Returns [`Error::ExecutableNotFound`] naming the path that was tried.
pub fn resolve_executable(explicit: Option<&Path>) -> Result<PathBuf> {
	resolve_with(explicit, std::env::var_os(EXECUTABLE_ENV).map(PathBuf::from), |name| {
		which::which(name).ok()
	})
}

fn resolve_with<F>(explicit: Option<&Path>, env_path: Option<PathBuf>, lookup: F) -> Result<PathBuf>
where
	F: Fn(&str) -> Option<PathBuf>,
{
	if let Some(path) = explicit {
		return existing(path.to_path_buf(), "launch options");
	}

	if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
		return existing(path, EXECUTABLE_ENV);
	}

	for name in PATH_CANDIDATES {
		if let Some(path) = lookup(name) {
			debug!(target = "fx.launch", path = %path.display(), "found browser on PATH");
			return Ok(path);
		}
	}

	COMMON_LOCATIONS
		.iter()
		.map(PathBuf::from)
		.find(|p| p.is_file())
		.ok_or_else(|| Error::ExecutableNotFound {
			path: PathBuf::from(PATH_CANDIDATES[0]),
			origin: "PATH",
		})
}

fn existing(path: PathBuf, origin: &'static str) -> Result<PathBuf> {
	if path.is_file() {
		Ok(path)
	} else {
		Err(Error::ExecutableNotFound { path, origin })
	}
}
