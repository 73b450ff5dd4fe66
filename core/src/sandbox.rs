//! Path sandbox: confines client-supplied relative paths to the server's
//! home directory. Immune to `..` traversal, absolute paths, and symlinks
//! whose target escapes home, because every check happens on the
//! canonicalized (symlink-resolved) form.

use std::path::{Path, PathBuf};

use crate::error::ResultCode;

/// An absolute path proven to lie inside the server's home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPath {
	absolute: PathBuf,
}

impl VerifiedPath {
	pub fn as_path(&self) -> &Path {
		&self.absolute
	}
}

impl AsRef<Path> for VerifiedPath {
	fn as_ref(&self) -> &Path {
		&self.absolute
	}
}

fn canonical_home(home: &Path) -> Result<PathBuf, ResultCode> {
	home.canonicalize().map_err(|_| ResultCode::ResolveError)
}

fn is_inside(home: &Path, candidate: &Path) -> bool {
	candidate.starts_with(home)
}

/// Resolves `home/rel` and requires the target to already exist on disk.
/// Used by GET, LIST, DELETE.
pub fn resolve_existing(home: &Path, rel: &str) -> Result<VerifiedPath, ResultCode> {
	if rel.contains('\0') {
		return Err(ResultCode::ResolveError);
	}
	let home = canonical_home(home)?;
	let candidate = home.join(strip_leading_separators(rel));
	let canonical = candidate.canonicalize().map_err(|_| ResultCode::ResolveError)?;
	if !is_inside(&home, &canonical) {
		return Err(ResultCode::ResolveError);
	}
	Ok(VerifiedPath { absolute: canonical })
}

/// Resolves `home/rel` for a target that doesn't need to exist yet, but
/// whose parent directory must already exist inside `home`. Used by PUT
/// and MKDIR.
pub fn resolve_for_create(home: &Path, rel: &str) -> Result<VerifiedPath, ResultCode> {
	if rel.contains('\0') {
		return Err(ResultCode::ResolveError);
	}
	let home = canonical_home(home)?;
	let relative = strip_leading_separators(rel);
	let candidate = home.join(relative);

	let file_name = candidate.file_name().ok_or(ResultCode::ResolveError)?.to_owned();
	let parent = candidate.parent().ok_or(ResultCode::ResolveError)?;
	let canonical_parent = parent.canonicalize().map_err(|_| ResultCode::ResolveError)?;
	if !is_inside(&home, &canonical_parent) {
		return Err(ResultCode::ResolveError);
	}

	let target = canonical_parent.join(&file_name);
	if !is_inside(&home, &target) {
		return Err(ResultCode::ResolveError);
	}
	Ok(VerifiedPath { absolute: target })
}

/// Returns whether `resolve_existing` would succeed, without constructing
/// a `VerifiedPath` — used by PUT's exists-check and MKDIR's exists-check.
pub fn exists_inside(home: &Path, rel: &str) -> bool {
	resolve_existing(home, rel).is_ok()
}

fn strip_leading_separators(rel: &str) -> &str {
	rel.trim_start_matches(['/', '\\'])
}
