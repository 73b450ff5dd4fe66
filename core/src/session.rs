//! Session table: a concurrent map from session id to last-activity time.
//!
//! Session ids are security tokens, so they're drawn from an OS-seeded
//! CSPRNG (`rand::rngs::OsRng`) rather than the source's weak
//! `rand() & 0xff` concatenation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::ResultCode;

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

pub struct SessionTable {
	sessions: Mutex<HashMap<u32, u64>>,
}

impl SessionTable {
	pub fn new() -> Self {
		SessionTable { sessions: Mutex::new(HashMap::new()) }
	}

	/// Draws a random nonzero id not already present, inserts it with the
	/// current time, and returns it. `0` is reserved to mean "no session
	/// yet" on the wire and is never issued.
	pub fn issue(&self) -> u32 {
		let mut sessions = self.sessions.lock().unwrap();
		loop {
			let candidate = OsRng.next_u32();
			if candidate != 0 && !sessions.contains_key(&candidate) {
				sessions.insert(candidate, now_secs());
				return candidate;
			}
		}
	}

	/// Validates `id` against `timeout` seconds of inactivity. On success
	/// refreshes `last_activity` to now. On expiry, removes the entry.
	pub fn validate_and_refresh(&self, id: u32, timeout_secs: u64) -> Result<(), ResultCode> {
		let mut sessions = self.sessions.lock().unwrap();
		let last_activity = *sessions.get(&id).ok_or(ResultCode::SessionError)?;
		let now = now_secs();
		if now.saturating_sub(last_activity) > timeout_secs {
			sessions.remove(&id);
			return Err(ResultCode::SessionError);
		}
		sessions.insert(id, now);
		Ok(())
	}

	pub fn revoke(&self, id: u32) {
		self.sessions.lock().unwrap().remove(&id);
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.sessions.lock().unwrap().len()
	}
}

impl Default for SessionTable {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn issued_ids_are_nonzero_and_unique() {
		let table = SessionTable::new();
		let mut seen = std::collections::HashSet::new();
		for _ in 0..256 {
			let id = table.issue();
			assert_ne!(id, 0);
			assert!(seen.insert(id));
		}
		assert_eq!(table.len(), 256);
	}

	#[test]
	fn validate_refreshes_live_session() {
		let table = SessionTable::new();
		let id = table.issue();
		assert!(table.validate_and_refresh(id, 60).is_ok());
	}

	#[test]
	fn validate_rejects_unknown_session() {
		let table = SessionTable::new();
		assert_eq!(table.validate_and_refresh(42, 60).unwrap_err(), ResultCode::SessionError);
	}

	#[test]
	fn validate_expires_stale_session_and_removes_it() {
		let table = SessionTable::new();
		let id = table.issue();
		table.sessions.lock().unwrap().insert(id, now_secs() - 1000);
		assert_eq!(table.validate_and_refresh(id, 5).unwrap_err(), ResultCode::SessionError);
		assert_eq!(table.validate_and_refresh(id, 5).unwrap_err(), ResultCode::SessionError);
	}

	#[test]
	fn revoke_removes_session() {
		let table = SessionTable::new();
		let id = table.issue();
		table.revoke(id);
		assert_eq!(table.validate_and_refresh(id, 60).unwrap_err(), ResultCode::SessionError);
	}
}
