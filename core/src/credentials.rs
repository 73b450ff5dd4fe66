//! On-disk user credential store: `{home}/.cape/.cape.db` plus its
//! integrity sidecar `{home}/.cape/.cape.hash`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::ResultCode;
use crate::hash::{self, DIGEST_LEN};

/// Magic bytes marking both `.cape.db` and `.cape.hash`, little-endian.
pub const MAGIC_BYTES: u32 = 0xFFAA_FABA;

const DB_DIR: &str = ".cape";
const DB_NAME: &str = ".cape.db";
const HASH_NAME: &str = ".cape.hash";
const DEFAULT_USER: &str = "admin";
const DEFAULT_HASH_HEX: &str = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 20;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Permission {
	Read = 1,
	ReadWrite = 2,
	Admin = 3,
}

impl Permission {
	pub fn from_u8(value: u8) -> Option<Self> {
		match value {
			1 => Some(Permission::Read),
			2 => Some(Permission::ReadWrite),
			3 => Some(Permission::Admin),
			_ => None,
		}
	}

	pub fn as_u8(self) -> u8 {
		self as u8
	}
}

#[derive(Debug, Clone)]
pub struct UserAccount {
	pub username: String,
	pub password_hash: [u8; DIGEST_LEN],
	pub permission: Permission,
}

struct Inner {
	users: HashMap<String, UserAccount>,
	home: PathBuf,
}

/// Shared, internally-synchronized user database. Reads (authenticate)
/// take a read lock; writes (create/delete) take the write lock and
/// persist atomically before releasing it.
pub struct CredentialStore {
	inner: RwLock<Inner>,
}

impl CredentialStore {
	/// Runs the boot procedure against `{home}/.cape/`: creates the
	/// directory and seeds the default admin if neither db file exists,
	/// or verifies the integrity hash if both do. A hash mismatch is a
	/// fatal startup error.
	pub fn boot(home: &Path) -> anyhow::Result<Self> {
		let db_dir = home.join(DB_DIR);
		if !db_dir.exists() {
			fs::create_dir_all(&db_dir)?;
			log::info!("created credential store directory at {}", db_dir.display());
		}

		let db_path = db_dir.join(DB_NAME);
		let hash_path = db_dir.join(HASH_NAME);

		let db_bytes = if !db_path.exists() && !hash_path.exists() {
			let bytes = seed_default_db();
			write_db_file(&db_path, &bytes)?;
			write_hash_file(&hash_path, &bytes)?;
			log::info!("seeded default admin account at {}", db_path.display());
			bytes
		} else {
			let bytes = fs::read(&db_path)?;
			let stored = read_hash_file(&hash_path)?;
			let computed = hash::sha256(&bytes);
			if computed != stored {
				anyhow::bail!(
					"credential store integrity check failed: {} does not match {}",
					db_path.display(),
					hash_path.display()
				);
			}
			bytes
		};

		let users = parse_db(&db_bytes)?;
		if !users.values().any(|u| u.permission == Permission::Admin) {
			anyhow::bail!("credential store contains no ADMIN user");
		}

		Ok(CredentialStore {
			inner: RwLock::new(Inner { users, home: db_dir }),
		})
	}

	/// Authenticates a username/password pair. The same error is returned
	/// whether the user is unknown or the password is wrong, so a caller
	/// cannot distinguish the two.
	pub fn authenticate(&self, username: &str, password: &[u8]) -> Result<UserAccount, ResultCode> {
		let inner = self.inner.read().unwrap();
		let user = inner.users.get(username).ok_or(ResultCode::UserAuth)?;
		let candidate = hash::sha256(password);
		if hash::constant_time_eq(&candidate, &user.password_hash) {
			Ok(user.clone())
		} else {
			Err(ResultCode::UserAuth)
		}
	}

	pub fn create_user(
		&self,
		caller_perm: Permission,
		new_username: &str,
		new_password: &[u8],
		new_perm: Permission,
	) -> Result<(), ResultCode> {
		if new_perm > caller_perm {
			return Err(ResultCode::PermissionError);
		}
		if !(USERNAME_MIN..=USERNAME_MAX).contains(&new_username.len())
			|| !(PASSWORD_MIN..=PASSWORD_MAX).contains(&new_password.len())
			|| !new_username.bytes().all(|b| b.is_ascii_graphic())
		{
			return Err(ResultCode::CredRuleError);
		}

		let mut inner = self.inner.write().unwrap();
		if inner.users.contains_key(new_username) {
			return Err(ResultCode::UserExists);
		}
		inner.users.insert(
			new_username.to_string(),
			UserAccount {
				username: new_username.to_string(),
				password_hash: hash::sha256(new_password),
				permission: new_perm,
			},
		);
		persist(&inner).map_err(|_| ResultCode::IoError)
	}

	pub fn delete_user(&self, caller_perm: Permission, target_username: &str) -> Result<(), ResultCode> {
		if caller_perm != Permission::Admin {
			return Err(ResultCode::PermissionError);
		}
		let mut inner = self.inner.write().unwrap();
		if !inner.users.contains_key(target_username) {
			return Err(ResultCode::UserNoExist);
		}
		let remaining_admins = inner
			.users
			.values()
			.filter(|u| u.permission == Permission::Admin && u.username != target_username)
			.count();
		let target_is_admin = inner.users[target_username].permission == Permission::Admin;
		if target_is_admin && remaining_admins == 0 {
			return Err(ResultCode::Failure);
		}
		inner.users.remove(target_username);
		persist(&inner).map_err(|_| ResultCode::IoError)
	}
}

fn seed_default_db() -> Vec<u8> {
	let mut bytes = Vec::new();
	bytes.extend_from_slice(&MAGIC_BYTES.to_le_bytes());
	bytes.extend_from_slice(
		format!("{}:{}:{}\n", DEFAULT_USER, Permission::Admin.as_u8(), DEFAULT_HASH_HEX).as_bytes(),
	);
	bytes
}

fn write_db_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
	atomic_write(path, bytes)
}

fn write_hash_file(path: &Path, db_bytes: &[u8]) -> anyhow::Result<()> {
	let digest = hash::sha256(db_bytes);
	let mut bytes = Vec::with_capacity(4 + 1 + DIGEST_LEN);
	bytes.extend_from_slice(&MAGIC_BYTES.to_le_bytes());
	bytes.push(b'\n');
	bytes.extend_from_slice(&digest);
	atomic_write(path, &bytes)
}

fn read_hash_file(path: &Path) -> anyhow::Result<[u8; DIGEST_LEN]> {
	let bytes = fs::read(path)?;
	if bytes.len() != 4 + 1 + DIGEST_LEN {
		anyhow::bail!("malformed .cape.hash: unexpected length {}", bytes.len());
	}
	let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
	if magic != MAGIC_BYTES {
		anyhow::bail!("malformed .cape.hash: bad magic bytes");
	}
	let mut digest = [0u8; DIGEST_LEN];
	digest.copy_from_slice(&bytes[5..5 + DIGEST_LEN]);
	Ok(digest)
}

fn parse_db(bytes: &[u8]) -> anyhow::Result<HashMap<String, UserAccount>> {
	if bytes.len() < 4 {
		anyhow::bail!("malformed .cape.db: too short");
	}
	let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
	if magic != MAGIC_BYTES {
		anyhow::bail!("malformed .cape.db: bad magic bytes");
	}
	let text = std::str::from_utf8(&bytes[4..])?;
	let mut users = HashMap::new();
	for line in text.lines() {
		if line.is_empty() {
			continue;
		}
		let mut parts = line.splitn(3, ':');
		let username = parts.next().ok_or_else(|| anyhow::anyhow!("malformed record"))?;
		let perm_str = parts.next().ok_or_else(|| anyhow::anyhow!("malformed record"))?;
		let hex_hash = parts.next().ok_or_else(|| anyhow::anyhow!("malformed record"))?;
		let perm_value: u8 = perm_str.parse()?;
		let permission = Permission::from_u8(perm_value)
			.ok_or_else(|| anyhow::anyhow!("unknown permission byte {perm_value}"))?;
		let decoded = hash::hex_decode(hex_hash).ok_or_else(|| anyhow::anyhow!("bad hex hash"))?;
		if decoded.len() != DIGEST_LEN {
			anyhow::bail!("hash for {username} is not 32 bytes");
		}
		let mut password_hash = [0u8; DIGEST_LEN];
		password_hash.copy_from_slice(&decoded);
		users.insert(
			username.to_string(),
			UserAccount { username: username.to_string(), password_hash, permission },
		);
	}
	Ok(users)
}

fn serialize_db(users: &HashMap<String, UserAccount>) -> Vec<u8> {
	let mut bytes = Vec::new();
	bytes.extend_from_slice(&MAGIC_BYTES.to_le_bytes());
	let mut usernames: Vec<&String> = users.keys().collect();
	usernames.sort();
	for username in usernames {
		let user = &users[username];
		let hex = hash::hex_encode(&user.password_hash);
		bytes.extend_from_slice(
			format!("{}:{}:{}\n", user.username, user.permission.as_u8(), std::str::from_utf8(&hex).unwrap())
				.as_bytes(),
		);
	}
	bytes
}

fn persist(inner: &Inner) -> anyhow::Result<()> {
	let db_bytes = serialize_db(&inner.users);
	atomic_write(&inner.home.join(DB_NAME), &db_bytes)?;
	write_hash_file(&inner.home.join(HASH_NAME), &db_bytes)?;
	Ok(())
}

/// Writes to a sibling temp file and renames over the target, so a crash
/// mid-write never leaves a half-written db file in place.
fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
	let dir = path.parent().ok_or_else(|| anyhow::anyhow!("no parent directory"))?;
	let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
	tmp.write_all(bytes)?;
	tmp.as_file().sync_all()?;
	tmp.persist(path)?;
	Ok(())
}
