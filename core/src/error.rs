//! Result codes shared by the wire protocol and the controller.
//!
//! A `ResultCode` is a value, never an exception: every request-handling
//! path returns one instead of unwinding, per the three-layer error model
//! (leaf -> controller -> acceptor).

use std::fmt;

/// Wire-level result code. The numeric value is exactly what travels in
/// the first byte of a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
	Success = 1,
	SessionError = 2,
	PermissionError = 3,
	UserExists = 4,
	FileExists = 5,
	CredRuleError = 6,
	UserAuth = 7,
	DirNotEmpty = 8,
	ResolveError = 9,
	PathNotDir = 10,
	PathNotFile = 11,
	DirExists = 12,
	SockClosed = 13,
	UserNoExist = 14,
	FileEmpty = 15,
	DirEmpty = 16,
	IoError = 254,
	Failure = 255,
}

impl ResultCode {
	/// Human-readable message, deterministically derived from the code.
	/// Never transmitted on the wire; clients derive it from the same table.
	pub fn message(self) -> &'static str {
		match self {
			ResultCode::Success => "Server action was successful",
			ResultCode::SessionError => "Provided Session ID was invalid or expired",
			ResultCode::PermissionError => {
				"User associated with provided Session ID has insufficient permissions to perform the action"
			}
			ResultCode::UserExists => "User could not be created because it already exists",
			ResultCode::FileExists => "File could not be created because it already exists",
			ResultCode::CredRuleError => {
				"Username must be between 3 and 20 characters and password must be between 6 and 32 characters"
			}
			ResultCode::UserAuth => "Either username or password is incorrect",
			ResultCode::DirNotEmpty => "Directory is not empty, cannot remove",
			ResultCode::ResolveError => {
				"Path could not be resolved. This could be because it does not exist, or the path does not resolve within the home directory of the server"
			}
			ResultCode::PathNotDir => "Path provided is not of type directory.",
			ResultCode::PathNotFile => "Path provided is not of type regular file.",
			ResultCode::DirExists => "Directory could not be created because it already exists",
			ResultCode::SockClosed => "Network socket is closed, cannot read or send anymore data",
			ResultCode::UserNoExist => "User could not be removed because they do not exist",
			ResultCode::FileEmpty => "File requested exists but it is empty",
			ResultCode::DirEmpty => "Directory requested exists but it is empty",
			ResultCode::IoError => {
				"I/O error occurred during the action. This could be due to permissions, file not existing, or error while writing and reading."
			}
			ResultCode::Failure => "Server action failed",
		}
	}

	pub fn as_u8(self) -> u8 {
		self as u8
	}

	pub fn from_u8(value: u8) -> Option<Self> {
		Some(match value {
			1 => ResultCode::Success,
			2 => ResultCode::SessionError,
			3 => ResultCode::PermissionError,
			4 => ResultCode::UserExists,
			5 => ResultCode::FileExists,
			6 => ResultCode::CredRuleError,
			7 => ResultCode::UserAuth,
			8 => ResultCode::DirNotEmpty,
			9 => ResultCode::ResolveError,
			10 => ResultCode::PathNotDir,
			11 => ResultCode::PathNotFile,
			12 => ResultCode::DirExists,
			13 => ResultCode::SockClosed,
			14 => ResultCode::UserNoExist,
			15 => ResultCode::FileEmpty,
			16 => ResultCode::DirEmpty,
			254 => ResultCode::IoError,
			255 => ResultCode::Failure,
			_ => return None,
		})
	}

	pub fn is_success(self) -> bool {
		matches!(self, ResultCode::Success)
	}
}

impl fmt::Display for ResultCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message())
	}
}

impl std::error::Error for ResultCode {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_every_documented_code() {
		let codes = [
			ResultCode::Success,
			ResultCode::SessionError,
			ResultCode::PermissionError,
			ResultCode::UserExists,
			ResultCode::FileExists,
			ResultCode::CredRuleError,
			ResultCode::UserAuth,
			ResultCode::DirNotEmpty,
			ResultCode::ResolveError,
			ResultCode::PathNotDir,
			ResultCode::PathNotFile,
			ResultCode::DirExists,
			ResultCode::SockClosed,
			ResultCode::UserNoExist,
			ResultCode::FileEmpty,
			ResultCode::DirEmpty,
			ResultCode::IoError,
			ResultCode::Failure,
		];
		for code in codes {
			assert_eq!(ResultCode::from_u8(code.as_u8()), Some(code));
		}
	}

	#[test]
	fn unknown_byte_has_no_code() {
		assert_eq!(ResultCode::from_u8(0), None);
		assert_eq!(ResultCode::from_u8(200), None);
	}
}
