//! SHA-256 primitive plus the hex and constant-time comparison helpers the
//! credential store and wire codec build on.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const DIGEST_LEN: usize = 32;

/// SHA-256 over a byte slice.
pub fn sha256(bytes: &[u8]) -> [u8; DIGEST_LEN] {
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	hasher.finalize().into()
}

/// Lowercase hex encoding of a 32-byte digest.
pub fn hex_encode(digest: &[u8; DIGEST_LEN]) -> [u8; 64] {
	let mut out = [0u8; 64];
	for (i, byte) in digest.iter().enumerate() {
		let hi = byte >> 4;
		let lo = byte & 0x0f;
		out[i * 2] = hex_digit(hi);
		out[i * 2 + 1] = hex_digit(lo);
	}
	out
}

fn hex_digit(nibble: u8) -> u8 {
	match nibble {
		0..=9 => b'0' + nibble,
		_ => b'a' + (nibble - 10),
	}
}

/// Decode a hex string into a byte array. Fails on odd length or any
/// non-hex-digit byte, never on wrong target length (caller checks that).
pub fn hex_decode(input: &str) -> Option<Vec<u8>> {
	let bytes = input.as_bytes();
	if bytes.len() % 2 != 0 {
		return None;
	}
	let mut out = Vec::with_capacity(bytes.len() / 2);
	let mut i = 0;
	while i < bytes.len() {
		let hi = hex_value(bytes[i])?;
		let lo = hex_value(bytes[i + 1])?;
		out.push((hi << 4) | lo);
		i += 2;
	}
	Some(out)
}

fn hex_value(c: u8) -> Option<u8> {
	match c {
		b'0'..=b'9' => Some(c - b'0'),
		b'a'..=b'f' => Some(c - b'a' + 10),
		b'A'..=b'F' => Some(c - b'A' + 10),
		_ => None,
	}
}

/// Constant-time comparison. The source compares password hashes with an
/// early-exit byte loop, a timing side channel; this closes it.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	a.ct_eq(b).into()
}
