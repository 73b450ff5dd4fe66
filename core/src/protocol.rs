//! Wire codec: decodes inbound request frames and encodes response
//! frames. All integers are little-endian.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ResultCode;

pub const DEFAULT_MAX_USERNAME: usize = 20;
pub const DEFAULT_MAX_PASSWORD: usize = 32;
pub const DEFAULT_MAX_PATH: usize = 4096;
pub const DEFAULT_MAX_STREAM: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
	Local,
	UserOp,
	DelFile,
	ListDir,
	GetFile,
	Mkdir,
	PutFile,
}

impl Opcode {
	fn from_u8(value: u8) -> Option<Self> {
		Some(match value {
			0x01 => Opcode::Local,
			0x02 => Opcode::UserOp,
			0x03 => Opcode::DelFile,
			0x04 => Opcode::ListDir,
			0x05 => Opcode::GetFile,
			0x06 => Opcode::Mkdir,
			0x07 => Opcode::PutFile,
			_ => return None,
		})
	}

	fn as_u8(self) -> u8 {
		match self {
			Opcode::Local => 0x01,
			Opcode::UserOp => 0x02,
			Opcode::DelFile => 0x03,
			Opcode::ListDir => 0x04,
			Opcode::GetFile => 0x05,
			Opcode::Mkdir => 0x06,
			Opcode::PutFile => 0x07,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFlag {
	Create,
	Delete,
}

/// Sub-payload carried by `USER_OP` requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSubPayload {
	pub new_username: String,
	pub new_password: Vec<u8>,
}

/// Sub-payload carried by DEL/LIST/GET/MKDIR/PUT requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdSubPayload {
	pub path: String,
	/// Present only for PUT.
	pub stream: Option<Vec<u8>>,
}

/// Tagged union over the two sub-payload shapes, or none (LOCAL).
/// Represented as a Rust enum rather than a pointer-to-either, which
/// eliminates the null-branch handling the source's C union required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadVariant {
	None,
	User(UserSubPayload),
	Std(StdSubPayload),
}

/// A fully decoded request frame. Owns every buffer for the lifetime of
/// the request; nothing is shared across worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePayload {
	pub opcode: Opcode,
	/// Raw `user_flag` byte from the header; meaningful only for `UserOp`.
	pub user_flag: u8,
	pub username: String,
	pub password: Vec<u8>,
	/// Raw `permission` byte from the header; meaningful only for
	/// `UserOp` + `Create`.
	pub permission: u8,
	pub session_id: u32,
	pub variant: PayloadVariant,
}

pub struct DecodeLimits {
	pub max_username: usize,
	pub max_password: usize,
	pub max_path: usize,
	pub max_stream: u64,
}

impl Default for DecodeLimits {
	fn default() -> Self {
		DecodeLimits {
			max_username: DEFAULT_MAX_USERNAME,
			max_password: DEFAULT_MAX_PASSWORD,
			max_path: DEFAULT_MAX_PATH,
			max_stream: DEFAULT_MAX_STREAM,
		}
	}
}

fn closed_or_io(err: io::Error) -> ResultCode {
	match err.kind() {
		io::ErrorKind::UnexpectedEof => ResultCode::SockClosed,
		// A blocking socket's read-timeout deadline surfaces as WouldBlock
		// (non-blocking sockets) or TimedOut (platform-dependent on blocking
		// ones); either way the per-session read deadline has been hit and
		// the connection is done.
		io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ResultCode::SockClosed,
		_ => ResultCode::IoError,
	}
}

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, ResultCode> {
	let mut buf = vec![0u8; len];
	reader.read_exact(&mut buf).map_err(closed_or_io)?;
	Ok(buf)
}

/// Reads the `payload_len`-sized sub-payload buffer, rejecting the frame
/// before allocating anything if the declared length exceeds `max`. Any
/// client, authenticated or not, controls this 8-byte header field, so it
/// must be checked against a derived maximum before it ever sizes an
/// allocation — an unchecked `payload_len` lets a single frame force a
/// multi-gigabyte `Vec` allocation, which aborts the process on failure
/// rather than producing a catchable error.
fn read_sub_payload<R: Read>(reader: &mut R, payload_len: u64, max: u64) -> Result<Vec<u8>, ResultCode> {
	if payload_len > max {
		return Err(ResultCode::Failure);
	}
	read_bytes(reader, payload_len as usize)
}

fn read_utf8<R: Read>(reader: &mut R, len: usize) -> Result<String, ResultCode> {
	let bytes = read_bytes(reader, len)?;
	String::from_utf8(bytes).map_err(|_| ResultCode::Failure)
}

/// Decodes one full request frame. Performs exactly one read pass; never
/// partially commits state on error.
pub fn decode<R: Read>(reader: &mut R, limits: &DecodeLimits) -> Result<WirePayload, ResultCode> {
	let opcode_byte = reader.read_u8().map_err(closed_or_io)?;
	let user_flag = reader.read_u8().map_err(closed_or_io)?;
	let _reserved = reader.read_u16::<LittleEndian>().map_err(closed_or_io)?;
	let username_len = reader.read_u16::<LittleEndian>().map_err(closed_or_io)? as usize;
	let password_len = reader.read_u8().map_err(closed_or_io)? as usize;
	let permission = reader.read_u8().map_err(closed_or_io)?;
	let session_id = reader.read_u32::<LittleEndian>().map_err(closed_or_io)?;
	let payload_len = reader.read_u64::<LittleEndian>().map_err(closed_or_io)?;

	if username_len > limits.max_username || password_len > limits.max_password {
		return Err(ResultCode::CredRuleError);
	}

	let username = read_utf8(reader, username_len)?;
	let password = read_bytes(reader, password_len)?;

	let opcode = Opcode::from_u8(opcode_byte).ok_or(ResultCode::Failure)?;

	let variant = match opcode {
		Opcode::Local => PayloadVariant::None,
		Opcode::UserOp => {
			let max_sub = 2 + 1 + limits.max_username as u64 + limits.max_password as u64;
			let mut sub = io::Cursor::new(read_sub_payload(reader, payload_len, max_sub)?);
			let new_username_len = sub.read_u16::<LittleEndian>().map_err(closed_or_io)? as usize;
			let new_password_len = sub.read_u8().map_err(closed_or_io)? as usize;
			if new_username_len > limits.max_username || new_password_len > limits.max_password {
				return Err(ResultCode::CredRuleError);
			}
			let new_username = read_utf8(&mut sub, new_username_len)?;
			let new_password = read_bytes(&mut sub, new_password_len)?;
			PayloadVariant::User(UserSubPayload { new_username, new_password })
		}
		Opcode::DelFile | Opcode::ListDir | Opcode::GetFile | Opcode::Mkdir | Opcode::PutFile => {
			let stream_budget = if opcode == Opcode::PutFile { 8 + limits.max_stream } else { 0 };
			let max_sub = 2 + limits.max_path as u64 + stream_budget;
			let mut sub = io::Cursor::new(read_sub_payload(reader, payload_len, max_sub)?);
			let path_len = sub.read_u16::<LittleEndian>().map_err(closed_or_io)? as usize;
			if path_len > limits.max_path {
				return Err(ResultCode::ResolveError);
			}
			let path = read_utf8(&mut sub, path_len)?;
			let stream = if opcode == Opcode::PutFile {
				let stream_len = sub.read_u64::<LittleEndian>().map_err(closed_or_io)?;
				if stream_len > limits.max_stream {
					return Err(ResultCode::Failure);
				}
				Some(read_bytes(&mut sub, stream_len as usize)?)
			} else {
				None
			};
			PayloadVariant::Std(StdSubPayload { path, stream })
		}
	};

	Ok(WirePayload { opcode, user_flag, username, password, permission, session_id, variant })
}

/// Encodes a request frame. Only used by tests and by any client-side
/// tooling built against this codec; `encode` never produces a frame
/// `decode` would reject.
pub fn encode_request(payload: &WirePayload) -> Vec<u8> {
	let mut sub = Vec::new();
	match &payload.variant {
		PayloadVariant::None => {}
		PayloadVariant::User(user) => {
			sub.write_u16::<LittleEndian>(user.new_username.len() as u16).unwrap();
			sub.write_u8(user.new_password.len() as u8).unwrap();
			sub.extend_from_slice(user.new_username.as_bytes());
			sub.extend_from_slice(&user.new_password);
		}
		PayloadVariant::Std(std_payload) => {
			sub.write_u16::<LittleEndian>(std_payload.path.len() as u16).unwrap();
			sub.extend_from_slice(std_payload.path.as_bytes());
			if let Some(stream) = &std_payload.stream {
				sub.write_u64::<LittleEndian>(stream.len() as u64).unwrap();
				sub.extend_from_slice(stream);
			}
		}
	}

	let mut out = Vec::new();
	out.write_u8(payload.opcode.as_u8()).unwrap();
	out.write_u8(payload.user_flag).unwrap();
	out.write_u16::<LittleEndian>(0).unwrap();
	out.write_u16::<LittleEndian>(payload.username.len() as u16).unwrap();
	out.write_u8(payload.password.len() as u8).unwrap();
	out.write_u8(payload.permission).unwrap();
	out.write_u32::<LittleEndian>(payload.session_id).unwrap();
	out.write_u64::<LittleEndian>(sub.len() as u64).unwrap();
	out.extend_from_slice(payload.username.as_bytes());
	out.extend_from_slice(&payload.password);
	out.extend_from_slice(&sub);
	out
}

/// Encodes a response frame. When `session_echo` is `Some`, those 4
/// bytes are written first in the payload, ahead of any op-specific
/// content — this is the channel a brand-new session id is handed back
/// to the client on.
pub fn encode_response<W: Write>(
	writer: &mut W,
	code: ResultCode,
	session_echo: Option<u32>,
	content: Option<&[u8]>,
) -> io::Result<()> {
	let echo_len = if session_echo.is_some() { 4 } else { 0 };
	let content_len = content.map(|c| c.len()).unwrap_or(0);
	writer.write_u8(code.as_u8())?;
	writer.write_u64::<LittleEndian>((echo_len + content_len) as u64)?;
	if let Some(session_id) = session_echo {
		writer.write_u32::<LittleEndian>(session_id)?;
	}
	if let Some(bytes) = content {
		writer.write_all(bytes)?;
	}
	Ok(())
}
