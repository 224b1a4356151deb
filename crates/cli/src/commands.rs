use anyhow::{Context, Result};
use fx_runtime::LaunchOptions;
use fx_runtime::transport::browser_close_message;
use tracing::info;

use crate::cli::{AttachArgs, Commands, ExecutableArgs, LaunchArgs};

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::LaunchServer(args) => launch_server(args).await,
		Commands::Attach(args) => attach(args).await,
		Commands::ExecutablePath(args) => executable_path(args),
	}
}

/// Prints the endpoint and blocks until the browser exits. SIGINT, SIGTERM and
/// SIGHUP are handled by the launcher.
async fn launch_server(args: LaunchArgs) -> Result<()> {
	let server = fx_runtime::launch_server(args.to_options())
		.await
		.context("failed to launch browser server")?;

	let endpoint = server.endpoint().context("browser server did not expose an endpoint")?;
	println!("{endpoint}");
	info!(target = "fx.cli", pid = ?server.pid(), endpoint, "browser server running");

	let exit = server.wait_for_exit().await;
	info!(target = "fx.cli", exit = %exit, "browser exited");
	Ok(())
}

async fn attach(args: AttachArgs) -> Result<()> {
	let mut session = fx_runtime::attach(&args.endpoint)
		.await
		.with_context(|| format!("failed to attach to {}", args.endpoint))?;

	if args.close {
		session
			.send(&browser_close_message())
			.await
			.context("failed to send close request")?;
		session.close().await.context("failed to disconnect")?;
		return Ok(());
	}

	loop {
		tokio::select! {
			message = session.recv() => match message {
				Some(message) => println!("{message}"),
				None => break,
			},
			_ = tokio::signal::ctrl_c() => {
				session.close().await.context("failed to disconnect")?;
				break;
			}
		}
	}
	Ok(())
}

fn executable_path(args: ExecutableArgs) -> Result<()> {
	let mut options = LaunchOptions::new();
	if let Some(path) = args.executable {
		options = options.executable_path(path);
	}
	let path = fx_runtime::executable_path(&options).context("no browser executable found")?;
	println!("{}", path.display());
	Ok(())
}
