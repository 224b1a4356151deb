//! Readiness detection on the browser's stdout.
//!
//! The browser announces its endpoint with a single line such as
//! `Juggler listening on ws://127.0.0.1:41235`. Lines are tested as they
//! arrive; the scan stops at the first match.

use std::collections::VecDeque;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{Error, Result, millis};
use crate::process::{ProcessExit, wait_for_exit};

/// Lines of recent output kept for the "exited before ready" error.
const OUTPUT_TAIL: usize = 32;

/// Waits for a line matching `pattern` and returns the captured endpoint.
///
/// Capture group 1 is returned when present, otherwise the whole match. Takes
/// the line receiver by value: dropping it on return tells the drain task to
/// stop forwarding lines.
///
/// # Errors
///
/// - [`Error::Timeout`] if `timeout` elapses first
/// - [`Error::ExitedBeforeReady`] if the process exits or closes stdout first
pub async fn wait_for_ready(
	mut lines: mpsc::UnboundedReceiver<String>,
	pattern: &Regex,
	timeout: Option<Duration>,
	mut exit: watch::Receiver<Option<ProcessExit>>,
) -> Result<String> {
	let scan = async {
		let mut tail = VecDeque::with_capacity(OUTPUT_TAIL);

		loop {
			tokio::select! {
				biased;

				line = lines.recv() => match line {
					Some(line) => {
						if let Some(endpoint) = match_endpoint(pattern, &line) {
							debug!(target = "fx.launch", endpoint = %endpoint, "browser ready");
							return Ok(endpoint);
						}
						remember(&mut tail, line);
					}
					None => {
						let status = wait_for_exit(&mut exit).await;
						return Err(exited(status, tail));
					}
				},
				status = wait_for_exit(&mut exit) => {
					// The process may have printed the line just before exiting.
					while let Ok(line) = lines.try_recv() {
						if let Some(endpoint) = match_endpoint(pattern, &line) {
							return Ok(endpoint);
						}
						remember(&mut tail, line);
					}
					return Err(exited(status, tail));
				}
			}
		}
	};

	match timeout {
		Some(limit) => tokio::time::timeout(limit, scan).await.map_err(|_| Error::Timeout {
			waited_for: format!("the browser to print a line matching /{}/", pattern.as_str()),
			ms: millis(limit),
		})?,
		None => scan.await,
	}
}

fn match_endpoint(pattern: &Regex, line: &str) -> Option<String> {
	let caps = pattern.captures(line)?;
	caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str().to_string())
}

fn remember(tail: &mut VecDeque<String>, line: String) {
	if tail.len() == OUTPUT_TAIL {
		tail.pop_front();
	}
	tail.push_back(line);
}

fn exited(exit: ProcessExit, tail: VecDeque<String>) -> Error {
	Error::ExitedBeforeReady {
		exit,
		output: tail.into(),
	}
}
