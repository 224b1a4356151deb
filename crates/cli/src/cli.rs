use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use fx_runtime::{LaunchOptions, OutputMode};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "fx")]
#[command(about = "Launch and connect to remote-controllable browsers")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Launch a browser, print its endpoint, and wait until it exits
	LaunchServer(LaunchArgs),

	/// Connect to a running browser and print incoming messages
	Attach(AttachArgs),

	/// Print the browser executable that would be launched
	ExecutablePath(ExecutableArgs),
}

#[derive(Args, Debug, Default)]
pub struct LaunchArgs {
	/// Browser executable (overrides FX_EXECUTABLE_PATH)
	#[arg(long, value_name = "PATH")]
	pub executable: Option<PathBuf>,

	/// Show the browser window
	#[arg(long)]
	pub headful: bool,

	/// Profile directory to use instead of a temporary one
	#[arg(long, value_name = "DIR")]
	pub user_data_dir: Option<PathBuf>,

	/// Readiness timeout in milliseconds (0 waits forever)
	#[arg(long, value_name = "MS")]
	pub timeout: Option<u64>,

	/// Forward browser stdout/stderr to this process
	#[arg(long, conflicts_with = "log_output")]
	pub dumpio: bool,

	/// Log browser output through the logger instead (visible with -v)
	#[arg(long)]
	pub log_output: bool,

	/// Extra preference as KEY=VALUE; VALUE is parsed as JSON, else kept as a string
	#[arg(long = "pref", value_name = "KEY=VALUE", value_parser = parse_pref)]
	pub prefs: Vec<(String, Value)>,

	/// Pass only the trailing arguments to the browser
	#[arg(long)]
	pub ignore_default_args: bool,

	/// Arguments passed through to the browser
	#[arg(last = true, value_name = "ARGS")]
	pub args: Vec<String>,
}

impl LaunchArgs {
	pub fn to_options(&self) -> LaunchOptions {
		let mut options = LaunchOptions::new().headless(!self.headful).args(self.args.iter().cloned());

		if let Some(path) = &self.executable {
			options = options.executable_path(path);
		}
		if let Some(dir) = &self.user_data_dir {
			options = options.user_data_dir(dir);
		}
		if let Some(timeout) = self.timeout {
			options = options.timeout(timeout);
		}
		if self.dumpio {
			options = options.output(OutputMode::Forward);
		} else if self.log_output {
			options = options.output(OutputMode::Log);
		}
		if self.ignore_default_args {
			options = options.ignore_all_default_args();
		}
		for (key, value) in &self.prefs {
			options = options.pref(key.clone(), value.clone());
		}
		options
	}
}

#[derive(Args, Debug)]
pub struct AttachArgs {
	/// WebSocket endpoint, e.g. ws://127.0.0.1:41235
	pub endpoint: String,

	/// Ask the browser to close, then disconnect
	#[arg(long)]
	pub close: bool,
}

#[derive(Args, Debug, Default)]
pub struct ExecutableArgs {
	/// Browser executable to check instead of resolving one
	#[arg(long, value_name = "PATH")]
	pub executable: Option<PathBuf>,
}

fn parse_pref(raw: &str) -> Result<(String, Value), String> {
	let (key, value) = raw
		.split_once('=')
		.ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
	if key.is_empty() {
		return Err("preference key must not be empty".to_string());
	}
	let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
	Ok((key.to_string(), value))
}
