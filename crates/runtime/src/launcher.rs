//! Launch orchestration.
//!
//! ```text
//! validate → resolve executable → LaunchSpec → profile → spawn
//!          → signal handlers → readiness → connect → Session / BrowserServer
//! ```
//!
//! Any failure after spawn kills the process and waits (bounded) for the exit
//! hook, which removes a temporary profile, before the error propagates.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::executable::resolve_executable;
use crate::options::LaunchOptions;
use crate::profile::{Profile, ProfileProvisioner};
use crate::readiness::wait_for_ready;
use crate::server::BrowserServer;
use crate::session::Session;
use crate::spec::{self, LaunchSpec, ProfilePolicy};
use crate::transport::{self, Transport};

/// Launches browsers with a fixed base preference table.
#[derive(Debug, Clone, Default)]
pub struct Launcher {
	provisioner: ProfileProvisioner,
}

impl Launcher {
	/// Launcher whose profiles start from `provisioner`'s preferences.
	/// Per-launch `LaunchOptions::prefs` are merged on top.
	pub fn new(provisioner: ProfileProvisioner) -> Self {
		Self { provisioner }
	}

	/// Launches a browser and connects to it.
	///
	/// The returned session owns the process: [`Session::close`] closes the
	/// browser gracefully. The endpoint is not published on the server.
	pub async fn launch(&self, options: LaunchOptions) -> Result<Session> {
		let (server, transport) = self.start(&options).await?;
		server.set_transport(transport.sender());
		Ok(Session::owning(transport, server))
	}

	/// Launches a browser for other clients to connect to.
	///
	/// [`BrowserServer::endpoint`] returns the announced endpoint. A private
	/// connection is kept for the graceful close request.
	pub async fn launch_server(&self, options: LaunchOptions) -> Result<Arc<BrowserServer>> {
		let (server, transport) = self.start(&options).await?;
		let endpoint = transport.endpoint().to_string();

		let (sender, mut receiver) = transport.into_parts();
		server.set_transport(sender);
		tokio::spawn(async move { while receiver.recv().await.is_some() {} });

		server.expose_endpoint(endpoint);
		Ok(server)
	}

	/// Connects to an already running browser. No process is owned.
	pub async fn attach(&self, endpoint: &str) -> Result<Session> {
		let transport = transport::connect(endpoint).await?;
		info!(target = "fx.launch", endpoint, "attached");
		Ok(Session::attached(transport))
	}

	/// Executable that [`launch`](Self::launch) would run for `options`.
	pub fn executable_path(&self, options: &LaunchOptions) -> Result<PathBuf> {
		resolve_executable(options.executable_path.as_deref())
	}

	async fn start(&self, options: &LaunchOptions) -> Result<(Arc<BrowserServer>, Transport)> {
		spec::validate(options)?;
		let executable = self.executable_path(options)?;
		let spec = LaunchSpec::new(options, executable)?;
		let profile = self.provision(&spec, options)?;

		info!(
			target = "fx.launch",
			executable = %spec.executable().display(),
			args = ?spec.args(),
			"launching browser"
		);
		let (server, lines) = BrowserServer::spawn(&spec, profile)?;

		if let Err(e) = server.install_signal_handlers(spec.signals()) {
			server.abort().await;
			return Err(e);
		}

		let endpoint = match wait_for_ready(lines, spec.readiness_pattern(), spec.timeout(), server.exit_receiver()).await
		{
			Ok(endpoint) => endpoint,
			Err(e) => {
				debug!(target = "fx.launch", pid = ?server.pid(), error = %e, "browser never became ready");
				server.abort().await;
				return Err(e);
			}
		};

		let transport = match transport::connect(&endpoint).await {
			Ok(transport) => transport,
			Err(e) => {
				server.abort().await;
				return Err(e);
			}
		};

		info!(target = "fx.launch", pid = ?server.pid(), endpoint = %endpoint, "browser ready");
		Ok((server, transport))
	}

	fn provision(&self, spec: &LaunchSpec, options: &LaunchOptions) -> Result<Option<Profile>> {
		let dir = match spec.profile() {
			ProfilePolicy::FromArguments => return Ok(None),
			ProfilePolicy::Temporary => None,
			ProfilePolicy::UserSupplied(dir) => Some(dir.as_path()),
		};

		let profile = if options.prefs.is_empty() {
			self.provisioner.acquire(dir)?
		} else {
			let prefs = self.provisioner.preferences().merged(options.prefs.clone());
			ProfileProvisioner::new(prefs).acquire(dir)?
		};
		Ok(Some(profile))
	}
}

/// Launches a browser with the default launcher.
pub async fn launch(options: LaunchOptions) -> Result<Session> {
	Launcher::default().launch(options).await
}

/// Launches a browser server with the default launcher.
pub async fn launch_server(options: LaunchOptions) -> Result<Arc<BrowserServer>> {
	Launcher::default().launch_server(options).await
}

/// Connects to a running browser.
pub async fn attach(endpoint: &str) -> Result<Session> {
	Launcher::default().attach(endpoint).await
}

/// Resolves the browser executable for `options`.
pub fn executable_path(options: &LaunchOptions) -> Result<PathBuf> {
	Launcher::default().executable_path(options)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::error::Error;
	use crate::profile::USER_PREFS_FILE;

	#[tokio::test]
	async fn test_devtools_rejected_before_resolution() {
		let options = LaunchOptions::new()
			.devtools(true)
			.executable_path("/definitely/not/a/browser");
		let err = launch(options).await.unwrap_err();
		assert!(matches!(err, Error::Unsupported(_)), "{err:?}");
	}

	#[tokio::test]
	async fn test_missing_executable_is_typed() {
		let options = LaunchOptions::new().executable_path("/definitely/not/a/browser");
		let err = launch_server(options).await.unwrap_err();
		assert!(err.is_missing_executable(), "{err:?}");
		assert!(err.to_string().contains("/definitely/not/a/browser"));
	}

	#[test]
	fn test_provision_merges_prefs_into_user_dir() {
		let dir = tempfile::tempdir().unwrap();
		let options = LaunchOptions::new()
			.user_data_dir(dir.path())
			.pref("browser.custom.flag", json!(true));
		let spec = LaunchSpec::new(&options, PathBuf::from("/bin/true")).unwrap();

		let profile = Launcher::default().provision(&spec, &options).unwrap().unwrap();
		assert_eq!(profile.path(), dir.path());
		assert!(!profile.is_temporary());

		let user_js = std::fs::read_to_string(dir.path().join(USER_PREFS_FILE)).unwrap();
		assert!(user_js.contains(r#"user_pref("browser.custom.flag", true);"#), "{user_js}");
	}

	#[test]
	fn test_profile_from_arguments_is_not_provisioned() {
		let options = LaunchOptions::new()
			.ignore_all_default_args()
			.args(["-profile", "/tmp/elsewhere", "-juggler", "0"]);
		let spec = LaunchSpec::new(&options, PathBuf::from("/bin/true")).unwrap();
		assert!(Launcher::default().provision(&spec, &options).unwrap().is_none());
	}
}
