//! `cape-core`: the wire protocol codec, session state machine, worker
//! dispatch, authentication/session lifecycle, sandboxed path
//! resolution, and the credential store behind the `cape` file server.

pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod hash;
pub mod pool;
pub mod protocol;
pub mod sandbox;
pub mod server;
pub mod session;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub use config::ServerConfig;
pub use credentials::CredentialStore;
pub use server::Server;

/// Boots the credential store against `config.home` and runs the
/// acceptor loop until `shutdown` is flipped. This is the single entry
/// point the server binary calls.
pub fn run(config: ServerConfig, shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
	let credentials = CredentialStore::boot(&config.home)?;
	let server = Server::new(config, credentials, shutdown);
	server.run()
}
