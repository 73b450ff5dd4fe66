//! Per-request orchestration: authenticate, establish/refresh session,
//! check permissions, dispatch to the filesystem or user operation, and
//! build a response. Never unwinds — every path returns a `Response`.

use std::fs;
use std::path::Path;

use crate::credentials::{CredentialStore, Permission};
use crate::error::ResultCode;
use crate::protocol::{Opcode, PayloadVariant, StdSubPayload, UserFlag, WirePayload};
use crate::session::SessionTable;

/// The controller's answer to a request. `session_echo` is `Some` only
/// when the request arrived with `session_id == 0` and a fresh session
/// was just issued; the codec writes those bytes first in the response
/// payload.
pub struct Response {
	pub code: ResultCode,
	pub session_echo: Option<u32>,
	pub content: Option<Vec<u8>>,
}

impl Response {
	fn failure(code: ResultCode) -> Self {
		Response { code, session_echo: None, content: None }
	}
}

pub struct Controller<'a> {
	pub credentials: &'a CredentialStore,
	pub sessions: &'a SessionTable,
	pub home: &'a Path,
	pub session_timeout_secs: u64,
}

impl<'a> Controller<'a> {
	pub fn handle(&self, request: WirePayload) -> Response {
		let user = match self.credentials.authenticate(&request.username, &request.password) {
			Ok(user) => user,
			Err(code) => return Response::failure(code),
		};

		let session_echo = if request.session_id == 0 {
			Some(self.sessions.issue())
		} else {
			match self.sessions.validate_and_refresh(request.session_id, self.session_timeout_secs) {
				Ok(()) => None,
				Err(code) => return Response::failure(code),
			}
		};

		let (code, content) = match request.opcode {
			Opcode::Local => (ResultCode::Success, None),
			Opcode::UserOp => self.dispatch_user_op(user.permission, &request),
			Opcode::DelFile => self.dispatch_gated(user.permission, Permission::ReadWrite, &request, Self::do_del_file),
			Opcode::Mkdir => self.dispatch_gated(user.permission, Permission::ReadWrite, &request, Self::do_mkdir),
			Opcode::PutFile => self.dispatch_gated(user.permission, Permission::ReadWrite, &request, Self::do_put_file),
			Opcode::ListDir => self.dispatch_gated(user.permission, Permission::Read, &request, Self::do_list_dir),
			Opcode::GetFile => self.dispatch_gated(user.permission, Permission::Read, &request, Self::do_get_file),
		};

		Response { code, session_echo, content }
	}

	fn dispatch_gated(
		&self,
		caller_perm: Permission,
		required: Permission,
		request: &WirePayload,
		op: fn(&Self, &StdSubPayload) -> (ResultCode, Option<Vec<u8>>),
	) -> (ResultCode, Option<Vec<u8>>) {
		if caller_perm < required {
			return (ResultCode::PermissionError, None);
		}
		let std_payload = match &request.variant {
			PayloadVariant::Std(std_payload) => std_payload,
			_ => return (ResultCode::Failure, None),
		};
		op(self, std_payload)
	}

	fn dispatch_user_op(&self, caller_perm: Permission, request: &WirePayload) -> (ResultCode, Option<Vec<u8>>) {
		let user_sub = match &request.variant {
			PayloadVariant::User(user_sub) => user_sub,
			_ => return (ResultCode::Failure, None),
		};
		let flag = match request.user_flag {
			1 => UserFlag::Create,
			2 => UserFlag::Delete,
			_ => return (ResultCode::Failure, None),
		};

		match flag {
			UserFlag::Create => {
				let new_perm = match Permission::from_u8(request.permission) {
					Some(p) => p,
					None => return (ResultCode::CredRuleError, None),
				};
				if new_perm > caller_perm {
					return (ResultCode::PermissionError, None);
				}
				let result = self.credentials.create_user(
					caller_perm,
					&user_sub.new_username,
					&user_sub.new_password,
					new_perm,
				);
				(result.err().unwrap_or(ResultCode::Success), None)
			}
			UserFlag::Delete => {
				if caller_perm != Permission::Admin {
					return (ResultCode::PermissionError, None);
				}
				let result = self.credentials.delete_user(caller_perm, &user_sub.new_username);
				(result.err().unwrap_or(ResultCode::Success), None)
			}
		}
	}

	fn do_get_file(&self, std_payload: &StdSubPayload) -> (ResultCode, Option<Vec<u8>>) {
		let path = std_payload.path.as_str();
		let verified = match crate::sandbox::resolve_existing(self.home, path) {
			Ok(p) => p,
			Err(code) => return (code, None),
		};
		let metadata = match fs::metadata(verified.as_path()) {
			Ok(m) => m,
			Err(_) => return (ResultCode::IoError, None),
		};
		if metadata.is_dir() {
			return (ResultCode::PathNotFile, None);
		}
		match fs::read(verified.as_path()) {
			Ok(bytes) if bytes.is_empty() => (ResultCode::FileEmpty, None),
			Ok(bytes) => (ResultCode::Success, Some(bytes)),
			Err(_) => (ResultCode::IoError, None),
		}
	}

	fn do_list_dir(&self, std_payload: &StdSubPayload) -> (ResultCode, Option<Vec<u8>>) {
		let path = std_payload.path.as_str();
		let verified = match crate::sandbox::resolve_existing(self.home, path) {
			Ok(p) => p,
			Err(code) => return (code, None),
		};
		let metadata = match fs::metadata(verified.as_path()) {
			Ok(m) => m,
			Err(_) => return (ResultCode::IoError, None),
		};
		if !metadata.is_dir() {
			return (ResultCode::PathNotDir, None);
		}
		let entries = match fs::read_dir(verified.as_path()) {
			Ok(entries) => entries,
			Err(_) => return (ResultCode::IoError, None),
		};

		let mut lines: Vec<(String, String)> = Vec::new();
		for entry in entries {
			let entry = match entry {
				Ok(e) => e,
				Err(_) => return (ResultCode::IoError, None),
			};
			let file_type = match entry.file_type() {
				Ok(t) => t,
				Err(_) => continue,
			};
			let marker = if file_type.is_file() {
				"F"
			} else if file_type.is_dir() {
				"D"
			} else {
				continue;
			};
			lines.push((marker.to_string(), entry.file_name().to_string_lossy().into_owned()));
		}

		if lines.is_empty() {
			return (ResultCode::DirEmpty, None);
		}
		lines.sort_by(|a, b| a.1.cmp(&b.1));
		let mut content = String::new();
		for (marker, name) in lines {
			content.push_str(&marker);
			content.push(' ');
			content.push_str(&name);
			content.push('\n');
		}
		(ResultCode::Success, Some(content.into_bytes()))
	}

	fn do_put_file(&self, std_payload: &StdSubPayload) -> (ResultCode, Option<Vec<u8>>) {
		let path = std_payload.path.as_str();
		if crate::sandbox::exists_inside(self.home, path) {
			return (ResultCode::FileExists, None);
		}
		let verified = match crate::sandbox::resolve_for_create(self.home, path) {
			Ok(p) => p,
			Err(code) => return (code, None),
		};
		let stream = match &std_payload.stream {
			Some(bytes) => bytes,
			None => return (ResultCode::Failure, None),
		};
		match fs::write(verified.as_path(), stream) {
			Ok(()) => (ResultCode::Success, None),
			Err(_) => (ResultCode::IoError, None),
		}
	}

	fn do_mkdir(&self, std_payload: &StdSubPayload) -> (ResultCode, Option<Vec<u8>>) {
		let path = std_payload.path.as_str();
		let verified = match crate::sandbox::resolve_for_create(self.home, path) {
			Ok(p) => p,
			Err(code) => return (code, None),
		};
		match fs::create_dir(verified.as_path()) {
			Ok(()) => (ResultCode::Success, None),
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => (ResultCode::DirExists, None),
			Err(_) => (ResultCode::IoError, None),
		}
	}

	fn do_del_file(&self, std_payload: &StdSubPayload) -> (ResultCode, Option<Vec<u8>>) {
		let path = std_payload.path.as_str();
		let verified = match crate::sandbox::resolve_existing(self.home, path) {
			Ok(p) => p,
			Err(code) => return (code, None),
		};
		let metadata = match fs::metadata(verified.as_path()) {
			Ok(m) => m,
			Err(_) => return (ResultCode::IoError, None),
		};
		if metadata.is_dir() {
			let mut entries = match fs::read_dir(verified.as_path()) {
				Ok(e) => e,
				Err(_) => return (ResultCode::IoError, None),
			};
			if entries.next().is_some() {
				return (ResultCode::DirNotEmpty, None);
			}
			match fs::remove_dir(verified.as_path()) {
				Ok(()) => (ResultCode::Success, None),
				Err(_) => (ResultCode::IoError, None),
			}
		} else {
			match fs::remove_file(verified.as_path()) {
				Ok(()) => (ResultCode::Success, None),
				Err(_) => (ResultCode::IoError, None),
			}
		}
	}
}
