//! WebSocket transport to a launched (or already running) browser.
//!
//! The transport carries JSON text frames. It is split into a cloneable
//! [`TransportSender`] and a [`TransportReceiver`] fed by a background read
//! loop, so the supervisor can reuse the same channel for the graceful close
//! request while the protocol client owns the receiving side.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Message id used for the graceful `Browser.close` request.
///
/// Replies carrying this id are dropped by the read loop and never reach the
/// protocol client.
pub const BROWSER_CLOSE_MESSAGE_ID: i64 = -9999;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the graceful close request.
pub fn browser_close_message() -> Value {
	serde_json::json!({
		"id": BROWSER_CLOSE_MESSAGE_ID,
		"method": "Browser.close",
		"params": {},
	})
}

/// Connects to a browser endpoint.
///
/// Pure construction: no protocol handshake beyond the WebSocket upgrade.
///
/// # Errors
///
/// Returns [`Error::ConnectionFailed`] if the endpoint cannot be reached.
pub async fn connect(endpoint: &str) -> Result<Transport> {
	let (stream, _response) = connect_async(endpoint)
		.await
		.map_err(|e| Error::ConnectionFailed {
			endpoint: endpoint.to_string(),
			reason: e.to_string(),
		})?;
	debug!(target = "fx.transport", endpoint, "connected");

	let (sink, stream) = stream.split();
	let (tx, rx) = mpsc::unbounded_channel();
	let task = tokio::spawn(read_loop(stream, tx, endpoint.to_string()));

	Ok(Transport {
		sender: TransportSender {
			sink: Arc::new(Mutex::new(sink)),
			endpoint: Arc::from(endpoint),
		},
		receiver: TransportReceiver { rx, task },
	})
}

async fn read_loop(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<Value>, endpoint: String) {
	while let Some(frame) = stream.next().await {
		let text = match frame {
			Ok(Message::Text(text)) => text,
			Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
				Ok(text) => text,
				Err(_) => {
					warn!(target = "fx.transport", endpoint = %endpoint, "dropping non-UTF-8 binary frame");
					continue;
				}
			},
			Ok(Message::Close(frame)) => {
				debug!(target = "fx.transport", endpoint = %endpoint, frame = ?frame, "peer closed connection");
				break;
			}
			Ok(_) => continue,
			Err(e) => {
				debug!(target = "fx.transport", endpoint = %endpoint, error = %e, "read failed");
				break;
			}
		};

		let message: Value = match serde_json::from_str(&text) {
			Ok(message) => message,
			Err(e) => {
				warn!(target = "fx.transport", endpoint = %endpoint, error = %e, "dropping malformed message");
				continue;
			}
		};

		if is_close_reply(&message) {
			trace!(target = "fx.transport", "dropping reply to browser close request");
			continue;
		}

		if tx.send(message).is_err() {
			break;
		}
	}
}

fn is_close_reply(message: &Value) -> bool {
	message.get("id").and_then(Value::as_i64) == Some(BROWSER_CLOSE_MESSAGE_ID)
}

/// A connected transport.
#[derive(Debug)]
pub struct Transport {
	sender: TransportSender,
	receiver: TransportReceiver,
}

impl Transport {
	pub fn endpoint(&self) -> &str {
		self.sender.endpoint()
	}

	/// A clone of the sending half.
	pub fn sender(&self) -> TransportSender {
		self.sender.clone()
	}

	pub fn into_parts(self) -> (TransportSender, TransportReceiver) {
		(self.sender, self.receiver)
	}

	pub async fn send(&self, message: &Value) -> Result<()> {
		self.sender.send(message).await
	}

	pub async fn recv(&mut self) -> Option<Value> {
		self.receiver.recv().await
	}
}

/// Sending half of a transport. Cheap to clone.
#[derive(Clone)]
pub struct TransportSender {
	sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
	endpoint: Arc<str>,
}

impl std::fmt::Debug for TransportSender {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportSender").field("endpoint", &self.endpoint).finish()
	}
}

impl TransportSender {
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Sends one JSON message as a text frame.
	pub async fn send(&self, message: &Value) -> Result<()> {
		let text = serde_json::to_string(message)?;
		self.sink
			.lock()
			.await
			.send(Message::Text(text))
			.await
			.map_err(|e| Error::TransportError(e.to_string()))
	}

	/// Sends a close frame and shuts the sink down.
	pub async fn close(&self) -> Result<()> {
		let mut sink = self.sink.lock().await;
		match sink.close().await {
			Ok(()) => Ok(()),
			Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed | tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
			Err(e) => Err(Error::TransportError(e.to_string())),
		}
	}
}

/// Receiving half of a transport.
#[derive(Debug)]
pub struct TransportReceiver {
	rx: mpsc::UnboundedReceiver<Value>,
	task: JoinHandle<()>,
}

impl TransportReceiver {
	/// Next message from the browser; `None` once the connection is closed.
	pub async fn recv(&mut self) -> Option<Value> {
		self.rx.recv().await
	}
}

impl Drop for TransportReceiver {
	fn drop(&mut self) {
		self.task.abort();
	}
}
