use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Launcher events are logged under `fx.*` targets; dependencies stay at warn.
const PROJECT_TARGET: &str = "fx";

fn default_directives(verbosity: u8) -> String {
	// 0 = warnings only
	// 1 (-v) = launch lifecycle and --log-output browser lines
	// 2+ (-vv) = close handshake and transport frames too
	match verbosity {
		0 => "warn".to_string(),
		1 => format!("warn,{PROJECT_TARGET}=info"),
		_ => format!("warn,{PROJECT_TARGET}=debug"),
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
