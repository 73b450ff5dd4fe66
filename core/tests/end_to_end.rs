//! Drives the acceptor loop over a real `TcpListener` bound to an
//! ephemeral port against a throwaway home directory, covering the
//! scenarios a client of this protocol actually exercises.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cape_core::config::ServerConfig;
use cape_core::credentials::CredentialStore;
use cape_core::error::ResultCode;
use cape_core::protocol::{self, Opcode, PayloadVariant, StdSubPayload, UserSubPayload, WirePayload};
use cape_core::server::Server;

struct Harness {
	port: u16,
	home: Option<tempfile::TempDir>,
	shutdown: Arc<AtomicBool>,
	handle: Option<std::thread::JoinHandle<()>>,
}

impl Harness {
	fn start(timeout_secs: u64) -> Self {
		let home = tempfile::tempdir().unwrap();
		let credentials = CredentialStore::boot(home.path()).unwrap();

		let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		let shutdown = Arc::new(AtomicBool::new(false));
		let config = ServerConfig::new(port, timeout_secs, home.path().to_path_buf(), 4, 16);
		let server = Server::new(config, credentials, Arc::clone(&shutdown));
		let handle = std::thread::spawn(move || {
			server.run().unwrap();
		});
		std::thread::sleep(Duration::from_millis(150));

		Harness { port, home: Some(home), shutdown, handle: Some(handle) }
	}

	fn home_path(&self) -> &std::path::Path {
		self.home.as_ref().unwrap().path()
	}

	/// Stops the server but hands the home directory back instead of
	/// letting `Drop` remove it, so the caller can mutate it afterward.
	fn stop_keeping_home(mut self) -> tempfile::TempDir {
		self.shutdown.store(true, Ordering::Relaxed);
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
		self.home.take().unwrap()
	}

	fn send(&self, request: &WirePayload) -> (u8, Option<u32>, Vec<u8>) {
		let mut stream = TcpStream::connect(("127.0.0.1", self.port)).unwrap();
		stream.write_all(&protocol::encode_request(request)).unwrap();

		let mut code = [0u8; 1];
		stream.read_exact(&mut code).unwrap();
		let mut len_bytes = [0u8; 8];
		stream.read_exact(&mut len_bytes).unwrap();
		let payload_len = u64::from_le_bytes(len_bytes) as usize;

		let session_echo = if request.session_id == 0 && code[0] == ResultCode::Success.as_u8() {
			let mut echo = [0u8; 4];
			stream.read_exact(&mut echo).unwrap();
			Some(u32::from_le_bytes(echo))
		} else {
			None
		};
		let remaining = payload_len - if session_echo.is_some() { 4 } else { 0 };
		let mut content = vec![0u8; remaining];
		stream.read_exact(&mut content).unwrap();

		(code[0], session_echo, content)
	}
}

impl Drop for Harness {
	fn drop(&mut self) {
		self.shutdown.store(true, Ordering::Relaxed);
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
		// `self.home`, if still present, is dropped right after this and
		// removes the directory from disk.
	}
}

fn local(username: &str, password: &[u8], session_id: u32) -> WirePayload {
	WirePayload {
		opcode: Opcode::Local,
		user_flag: 0,
		username: username.to_string(),
		password: password.to_vec(),
		permission: 0,
		session_id,
		variant: PayloadVariant::None,
	}
}

fn std_request(opcode: Opcode, username: &str, password: &[u8], session_id: u32, path: &str, stream: Option<Vec<u8>>) -> WirePayload {
	WirePayload {
		opcode,
		user_flag: 0,
		username: username.to_string(),
		password: password.to_vec(),
		permission: 0,
		session_id,
		variant: PayloadVariant::Std(StdSubPayload { path: path.to_string(), stream }),
	}
}

#[test]
fn fresh_boot_seeds_the_exact_documented_admin_record() {
	let harness = Harness::start(5);
	let db_path = harness.home_path().join(".cape").join(".cape.db");
	let hash_path = harness.home_path().join(".cape").join(".cape.hash");

	let db_bytes = std::fs::read(&db_path).unwrap();
	assert_eq!(&db_bytes[0..4], &[0xBA, 0xFA, 0xAA, 0xFF]);
	assert_eq!(
		&db_bytes[4..],
		b"admin:3:5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8\n".as_slice()
	);

	let hash_bytes = std::fs::read(&hash_path).unwrap();
	let digest = cape_core::hash::sha256(&db_bytes);
	assert_eq!(&hash_bytes[5..], digest.as_slice());
}

#[test]
fn login_session_refresh_and_expiry() {
	let harness = Harness::start(1);

	let (code, echo, _) = harness.send(&local("admin", b"password", 0));
	assert_eq!(code, ResultCode::Success.as_u8());
	let session_id = echo.expect("a fresh session id must be echoed");

	let (code, echo, _) = harness.send(&local("admin", b"password", session_id));
	assert_eq!(code, ResultCode::Success.as_u8());
	assert!(echo.is_none());

	std::thread::sleep(Duration::from_secs(2));
	let (code, _, _) = harness.send(&local("admin", b"password", session_id));
	assert_eq!(code, ResultCode::SessionError.as_u8());
}

#[test]
fn mkdir_rejects_path_escape() {
	let harness = Harness::start(5);
	let (code, _, _) = harness.send(&std_request(Opcode::Mkdir, "admin", b"password", 0, "../evil", None));
	assert_eq!(code, ResultCode::ResolveError.as_u8());
}

#[test]
fn put_then_get_then_conflicting_put() {
	let harness = Harness::start(5);

	let (code, _, _) = harness.send(&std_request(Opcode::PutFile, "admin", b"password", 0, "notes.txt", Some(b"hello".to_vec())));
	assert_eq!(code, ResultCode::Success.as_u8());

	let (code, _, content) = harness.send(&std_request(Opcode::GetFile, "admin", b"password", 0, "notes.txt", None));
	assert_eq!(code, ResultCode::Success.as_u8());
	assert_eq!(content, b"hello");

	let (code, _, _) = harness.send(&std_request(Opcode::PutFile, "admin", b"password", 0, "notes.txt", Some(b"world".to_vec())));
	assert_eq!(code, ResultCode::FileExists.as_u8());
}

#[test]
fn permission_gate_restricts_bob_to_read_only() {
	let harness = Harness::start(5);

	let create_bob = WirePayload {
		opcode: Opcode::UserOp,
		user_flag: 1,
		username: "admin".to_string(),
		password: b"password".to_vec(),
		permission: cape_core::credentials::Permission::Read.as_u8(),
		session_id: 0,
		variant: PayloadVariant::User(UserSubPayload { new_username: "bob".to_string(), new_password: b"bobpass1".to_vec() }),
	};
	let (code, _, _) = harness.send(&create_bob);
	assert_eq!(code, ResultCode::Success.as_u8());

	let (code, _, _) = harness.send(&std_request(Opcode::PutFile, "admin", b"password", 0, "shared.txt", Some(b"seed".to_vec())));
	assert_eq!(code, ResultCode::Success.as_u8());

	let (code, _, content) = harness.send(&std_request(Opcode::GetFile, "bob", b"bobpass1", 0, "shared.txt", None));
	assert_eq!(code, ResultCode::Success.as_u8());
	assert_eq!(content, b"seed");

	let (code, _, _) = harness.send(&std_request(Opcode::PutFile, "bob", b"bobpass1", 0, "bobfile.txt", Some(b"x".to_vec())));
	assert_eq!(code, ResultCode::PermissionError.as_u8());

	let delete_anyone = WirePayload {
		opcode: Opcode::UserOp,
		user_flag: 2,
		username: "bob".to_string(),
		password: b"bobpass1".to_vec(),
		permission: 0,
		session_id: 0,
		variant: PayloadVariant::User(UserSubPayload { new_username: "admin".to_string(), new_password: Vec::new() }),
	};
	let (code, _, _) = harness.send(&delete_anyone);
	assert_eq!(code, ResultCode::PermissionError.as_u8());
}

#[test]
fn integrity_tamper_is_detected_on_restart() {
	let harness = Harness::start(5);
	let home = harness.stop_keeping_home();
	let db_path = home.path().join(".cape").join(".cape.db");

	let mut bytes = std::fs::read(&db_path).unwrap();
	bytes.push(b'!');
	std::fs::write(&db_path, &bytes).unwrap();

	let result = CredentialStore::boot(home.path());
	assert!(result.is_err());
}
