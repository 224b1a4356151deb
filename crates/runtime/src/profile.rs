//! Profile directory provisioning
//!
//! Every launch runs against a profile directory holding a generated `user.js`.
//! When the caller does not supply a directory, a uniquely named temporary one
//! is created and removed again once the browser process has exited.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// File the browser reads preference overrides from at startup.
pub const USER_PREFS_FILE: &str = "user.js";

/// Secondary preference file, written empty for consumers that expect it.
pub const PREFS_FILE: &str = "prefs.js";

const TEMP_PROFILE_PREFIX: &str = "fx_profile-";

/// Immutable ordered preference table written into each profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences(BTreeMap<String, Value>);

impl Preferences {
	pub fn new() -> Self {
		Self::default()
	}

	/// Baseline preferences for automation: no first-run UI, no update checks,
	/// no crash reporter prompts.
	pub fn automation_defaults() -> Self {
		let mut prefs = BTreeMap::new();
		let mut set = |key: &str, value: Value| {
			prefs.insert(key.to_string(), value);
		};

		set("app.update.enabled", Value::Bool(false));
		set("browser.shell.checkDefaultBrowser", Value::Bool(false));
		set("browser.startup.homepage_override.mstone", Value::from("ignore"));
		set("browser.startup.page", Value::from(0));
		set("browser.tabs.warnOnClose", Value::Bool(false));
		set("browser.warnOnQuit", Value::Bool(false));
		set("datareporting.policy.dataSubmissionEnabled", Value::Bool(false));
		set("devtools.jsonview.enabled", Value::Bool(false));
		set("dom.disable_open_during_load", Value::Bool(false));
		set("extensions.update.enabled", Value::Bool(false));
		set("network.http.prompt-temp-redirect", Value::Bool(false));
		set("toolkit.startup.max_resumed_crashes", Value::from(-1));
		set("toolkit.telemetry.enabled", Value::Bool(false));

		Self(prefs)
	}

	/// Returns a copy with `overrides` applied on top. Later keys win.
	pub fn merged<I, K>(&self, overrides: I) -> Self
	where
		I: IntoIterator<Item = (K, Value)>,
		K: Into<String>,
	{
		let mut prefs = self.0.clone();
		prefs.extend(overrides.into_iter().map(|(k, v)| (k.into(), v)));
		Self(prefs)
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Serializes the table as one `user_pref(key, value);` statement per line.
	pub fn to_user_js(&self) -> Result<String> {
		let mut out = String::new();
		for (key, value) in &self.0 {
			let key = serde_json::to_string(key)?;
			let value = serde_json::to_string(value)?;
			// Writing into a String cannot fail.
			let _ = writeln!(out, "user_pref({key}, {value});");
		}
		Ok(out)
	}
}

impl<K: Into<String>> FromIterator<(K, Value)> for Preferences {
	fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}
}

/// A provisioned profile directory.
///
/// Temporary profiles own their directory and delete it on [`Profile::remove`]
/// (or on drop, as a last resort). Caller-owned profiles are never touched.
#[derive(Debug)]
pub struct Profile {
	path: PathBuf,
	temporary: bool,
	temp_dir: Mutex<Option<TempDir>>,
}

impl Profile {
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Whether this directory was auto-created and will be removed on teardown.
	pub fn is_temporary(&self) -> bool {
		self.temporary
	}

	/// Deletes a temporary profile directory. Runs at most once; no-op for
	/// caller-owned directories.
	pub fn remove(&self) -> Result<()> {
		let Some(dir) = self.temp_dir.lock().take() else {
			return Ok(());
		};

		debug!(target = "fx.profile", path = %self.path.display(), "removing temporary profile");
		dir.close().map_err(|source| Error::Provision {
			path: self.path.clone(),
			source,
		})
	}
}

/// Creates profile directories and materializes the preference file into them.
#[derive(Debug, Clone)]
pub struct ProfileProvisioner {
	prefs: Preferences,
}

impl ProfileProvisioner {
	pub fn new(prefs: Preferences) -> Self {
		Self { prefs }
	}

	pub fn preferences(&self) -> &Preferences {
		&self.prefs
	}

	/// Acquires a profile directory and writes the preference files into it.
	///
	/// With `None`, a fresh temporary directory is created. A supplied path must
	/// already exist.
	///
	/// # Errors
	///
	/// Returns [`Error::Provision`] on any filesystem failure. A temporary
	/// directory created before the failure is removed again.
	pub fn acquire(&self, user_supplied: Option<&Path>) -> Result<Profile> {
		let profile = match user_supplied {
			Some(path) => {
				let meta = std::fs::metadata(path).map_err(|source| Error::Provision {
					path: path.to_path_buf(),
					source,
				})?;
				if !meta.is_dir() {
					return Err(Error::Provision {
						path: path.to_path_buf(),
						source: std::io::Error::new(
							std::io::ErrorKind::NotADirectory,
							"profile path is not a directory",
						),
					});
				}
				Profile {
					path: path.to_path_buf(),
					temporary: false,
					temp_dir: Mutex::new(None),
				}
			}
			None => {
				let dir = tempfile::Builder::new()
					.prefix(TEMP_PROFILE_PREFIX)
					.tempdir()
					.map_err(|source| Error::Provision {
						path: std::env::temp_dir(),
						source,
					})?;
				Profile {
					path: dir.path().to_path_buf(),
					temporary: true,
					temp_dir: Mutex::new(Some(dir)),
				}
			}
		};

		if let Err(err) = self.write_prefs(profile.path()) {
			if let Err(cleanup) = profile.remove() {
				warn!(target = "fx.profile", error = %cleanup, "failed to remove profile after write error");
			}
			return Err(err);
		}

		debug!(
			target = "fx.profile",
			path = %profile.path().display(),
			temporary = profile.is_temporary(),
			prefs = self.prefs.len(),
			"profile ready"
		);
		Ok(profile)
	}

	fn write_prefs(&self, dir: &Path) -> Result<()> {
		let user_js = self.prefs.to_user_js()?;
		let write = |name: &str, contents: &str| {
			let path = dir.join(name);
			std::fs::write(&path, contents).map_err(|source| Error::Provision { path, source })
		};
		write(USER_PREFS_FILE, &user_js)?;
		write(PREFS_FILE, "")
	}
}

impl Default for ProfileProvisioner {
	fn default() -> Self {
		Self::new(Preferences::automation_defaults())
	}
}
