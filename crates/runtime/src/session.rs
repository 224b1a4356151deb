//! Connected sessions handed to the protocol client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::server::BrowserServer;
use crate::transport::{Transport, TransportSender};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shuts down whatever a [`Session`] is connected to.
pub trait Closer: Send + Sync {
	fn close(&self) -> BoxFuture<'_, Result<()>>;
}

/// Launched browsers close gracefully and wait for the process to exit.
impl Closer for BrowserServer {
	fn close(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(BrowserServer::close(self))
	}
}

/// Attached browsers only lose the connection.
impl Closer for TransportSender {
	fn close(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(TransportSender::close(self))
	}
}

/// A transport plus the behavior of closing it.
///
/// Sessions from [`launch`](crate::launch) own their browser process and expose
/// it through [`Session::server`]; sessions from [`attach`](crate::attach) do
/// not.
pub struct Session {
	transport: Transport,
	closer: Arc<dyn Closer>,
	server: Option<Arc<BrowserServer>>,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("endpoint", &self.transport.endpoint())
			.field("server", &self.server)
			.finish_non_exhaustive()
	}
}

impl Session {
	/// Session over a connection to a browser this process does not own.
	pub fn attached(transport: Transport) -> Self {
		let closer = Arc::new(transport.sender());
		Self {
			transport,
			closer,
			server: None,
		}
	}

	/// Session that owns `server`; closing it shuts the browser down.
	pub fn owning(transport: Transport, server: Arc<BrowserServer>) -> Self {
		Self {
			transport,
			closer: Arc::clone(&server) as Arc<dyn Closer>,
			server: Some(server),
		}
	}

	pub fn endpoint(&self) -> &str {
		self.transport.endpoint()
	}

	/// The owned browser process, if this session launched one.
	pub fn server(&self) -> Option<&Arc<BrowserServer>> {
		self.server.as_ref()
	}

	pub fn transport(&self) -> &Transport {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut Transport {
		&mut self.transport
	}

	pub fn into_transport(self) -> Transport {
		self.transport
	}

	pub async fn send(&self, message: &Value) -> Result<()> {
		self.transport.send(message).await
	}

	pub async fn recv(&mut self) -> Option<Value> {
		self.transport.recv().await
	}

	/// Closes the browser (launched) or the connection (attached).
	pub async fn close(&self) -> Result<()> {
		self.closer.close().await
	}
}
