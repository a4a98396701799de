// ABOUTME: Static admin token file, created owner-only on first run

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use super::token::generate_token;

/// Read the admin token at `path`, generating and persisting one if the
/// file does not exist yet.
///
/// The token is written in full to an owner-only temp file and then linked
/// into place without clobbering, so a process racing on first run either
/// wins or reads the complete winning token. It never sees an empty file.
pub fn load_or_create_admin_token(path: &Path) -> io::Result<String> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let token = generate_token();
    let mut staged = NamedTempFile::new_in(parent)?;
    writeln!(staged, "{token}")?;
    staged.as_file().sync_all()?;

    match staged.persist_noclobber(path) {
        Ok(_) => {
            info!(path = %path.display(), "Created admin token");
            Ok(token)
        }
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => read_admin_token(path),
        Err(e) => Err(e.error),
    }
}

pub fn read_admin_token(path: &Path) -> io::Result<String> {
    let token = fs::read_to_string(path)?.trim().to_string();
    if token.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("admin token file is empty: {}", path.display()),
        ));
    }
    Ok(token)
}
