//! fx runtime - browser launcher, supervision, and transport
//!
//! This crate starts a remote-controllable browser and hands back a live
//! connection to it:
//!
//! - **Profiles**: Temporary or caller-owned profile directories seeded with
//!   automation preferences
//! - **Process launch**: Argument assembly, spawning, output draining
//! - **Readiness**: Waiting for the browser to announce its endpoint
//! - **Supervision**: Graceful close, forced kill, exit notification, signal
//!   forwarding
//! - **Transport**: JSON over WebSocket
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ protocol     │  External client (consumes Session)
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │  fx-runtime  │  This crate
//! │  ┌─────────┐ │
//! │  │Launcher │ │  Orchestration
//! │  └─────────┘ │
//! │  ┌─────────┐ │
//! │  │ Server  │ │  Process lifecycle + signals
//! │  └─────────┘ │
//! │  ┌─────────┐ │
//! │  │Transport│ │  WebSocket, close-reply filtering
//! │  └─────────┘ │
//! └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut session = fx_runtime::launch(LaunchOptions::new().timeout(10_000)).await?;
//! session.send(&json!({"id": 1, "method": "Browser.enable", "params": {}})).await?;
//! let reply = session.recv().await;
//! session.close().await?;
//! ```

pub mod error;
pub mod executable;
pub mod launcher;
pub mod options;
pub mod process;
pub mod profile;
pub mod readiness;
pub mod server;
pub mod session;
pub mod signals;
pub mod spec;
pub mod transport;

pub use error::{Error, Result};
pub use executable::{EXECUTABLE_ENV, resolve_executable};
pub use launcher::{Launcher, attach, executable_path, launch, launch_server};
pub use options::{IgnoreDefaultArgs, LaunchOptions, OutputMode};
pub use process::ProcessExit;
pub use profile::{Preferences, Profile, ProfileProvisioner};
pub use server::{BrowserServer, ServerState};
pub use session::{Closer, Session};
pub use signals::SignalFlags;
pub use spec::LaunchSpec;
pub use transport::{BROWSER_CLOSE_MESSAGE_ID, Transport, TransportReceiver, TransportSender};
