//! Where the renderer's socket lives, and clearing out stale ones

use crate::error::{Result, SessionError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

/// Pick the socket path from the process environment.
///
/// First existing directory wins: `$XDG_RUNTIME_DIR/platyplaty.sock`,
/// `$TEMPDIR/platyplaty-<uid>.sock`, `$TMPDIR/platyplaty-<uid>.sock`,
/// `/tmp/platyplaty-<uid>.sock`.
pub fn compute_socket_path() -> Result<PathBuf> {
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    compute_socket_path_with(|var| std::env::var(var).ok(), uid)
}

/// [`compute_socket_path`] with the environment lookup and uid supplied.
pub fn compute_socket_path_with<F>(lookup: F, uid: u32) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let candidates = candidate_paths(&lookup, uid);
    for (socket, dir) in &candidates {
        if dir.is_dir() {
            return Ok(socket.clone());
        }
    }

    let checked: Vec<String> = candidates
        .iter()
        .map(|(_, dir)| dir.display().to_string())
        .collect();
    Err(SessionError::SocketPath(format!(
        "No valid socket directory found. Checked: {}",
        checked.join(", ")
    )))
}

fn candidate_paths<F>(lookup: &F, uid: u32) -> Vec<(PathBuf, PathBuf)>
where
    F: Fn(&str) -> Option<String>,
{
    let mut candidates = Vec::with_capacity(4);

    if let Some(xdg) = lookup("XDG_RUNTIME_DIR").filter(|v| !v.is_empty()) {
        let dir = PathBuf::from(xdg);
        candidates.push((dir.join("platyplaty.sock"), dir));
    }

    let per_user = format!("platyplaty-{uid}.sock");
    for var in ["TEMPDIR", "TMPDIR"] {
        if let Some(val) = lookup(var).filter(|v| !v.is_empty()) {
            let dir = PathBuf::from(val);
            candidates.push((dir.join(&per_user), dir));
        }
    }

    let tmp = PathBuf::from("/tmp");
    candidates.push((tmp.join(&per_user), tmp));
    candidates
}

/// Make sure nothing is listening on `path` before a renderer binds it.
///
/// A live listener means another instance owns the socket. A socket file
/// nobody listens on is left over from a dead process and gets removed.
pub async fn check_stale_socket(path: &Path) -> Result<()> {
    match UnixStream::connect(path).await {
        Ok(_) => Err(SessionError::AlreadyRunning),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
            tracing::info!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)?;
            Ok(())
        }
        Err(e) => Err(SessionError::SocketPath(format!(
            "Unexpected error checking socket: {e}. \
             Cannot determine if another instance is running."
        ))),
    }
}
