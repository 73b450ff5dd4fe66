//! TCP acceptor loop: binds the listener, hands each connection to the
//! thread pool, and decodes/dispatches/encodes one request per
//! connection. Graceful shutdown is cooperative — the acceptor polls an
//! `AtomicBool` between timeout-bounded `accept()` calls rather than
//! being interrupted mid-syscall.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::controller::Controller;
use crate::credentials::CredentialStore;
use crate::pool::ThreadPool;
use crate::protocol::{self, DecodeLimits};
use crate::session::SessionTable;

/// How often the accept loop wakes up to re-check the shutdown flag
/// when no connection has arrived.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Server {
	config: ServerConfig,
	credentials: Arc<CredentialStore>,
	sessions: Arc<SessionTable>,
	shutdown: Arc<AtomicBool>,
}

impl Server {
	pub fn new(config: ServerConfig, credentials: CredentialStore, shutdown: Arc<AtomicBool>) -> Self {
		Server { config, credentials: Arc::new(credentials), sessions: Arc::new(SessionTable::new()), shutdown }
	}

	/// Binds the listener and runs the accept loop until `shutdown` is
	/// set. Returns once the thread pool has drained every in-flight
	/// connection.
	pub fn run(&self) -> anyhow::Result<()> {
		let listener = TcpListener::bind(("0.0.0.0", self.config.port))?;
		listener.set_nonblocking(true)?;
		log::info!("listening on port {}", self.config.port);

		let pool = ThreadPool::new(self.config.threads, self.config.queue_depth);

		while !self.shutdown.load(Ordering::Relaxed) {
			match listener.accept() {
				Ok((stream, peer)) => {
					log::debug!("accepted connection from {peer}");
					let credentials = Arc::clone(&self.credentials);
					let sessions = Arc::clone(&self.sessions);
					let home = self.config.home.clone();
					let timeout_secs = self.config.timeout_secs;
					pool.submit(move || {
						if let Err(err) = handle_connection(stream, &credentials, &sessions, &home, timeout_secs) {
							log::warn!("connection from {peer} ended with an I/O error: {err}");
						}
					});
				}
				Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
					std::thread::sleep(ACCEPT_POLL_INTERVAL);
				}
				Err(err) => {
					log::warn!("accept() failed: {err}");
				}
			}
		}

		log::info!("shutdown signaled, draining thread pool");
		pool.shutdown();
		Ok(())
	}
}

fn handle_connection(
	mut stream: TcpStream,
	credentials: &CredentialStore,
	sessions: &SessionTable,
	home: &std::path::Path,
	timeout_secs: u64,
) -> io::Result<()> {
	stream.set_read_timeout(Some(Duration::from_secs(timeout_secs)))?;

	let limits = DecodeLimits::default();
	let controller = Controller { credentials, sessions, home, session_timeout_secs: timeout_secs };

	match protocol::decode(&mut stream, &limits) {
		Ok(request) => {
			let response = controller.handle(request);
			protocol::encode_response(&mut stream, response.code, response.session_echo, response.content.as_deref())
		}
		Err(code) => protocol::encode_response(&mut stream, code, None, None),
	}
}
