//! Active-session pointer
//!
//! A single-value file recording the "currently active" session id. Only the
//! process boundary (CLI handlers) reads or writes it, once per invocation;
//! the core APIs always take the session id as an explicit parameter so they
//! stay testable without filesystem state.

use sdk::errors::EngineError;
use std::fs;
use std::path::Path;

/// Read the active session id, if one is recorded.
pub fn read_active(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let id = contents.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Record `session_id` as the active session.
pub fn write_active(path: &Path, session_id: &str) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, session_id)?;
    Ok(())
}

/// Drop the active-session pointer (the session's history is untouched).
pub fn clear_active(path: &Path) -> Result<(), EngineError> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pointer_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active_session");

        assert_eq!(read_active(&path), None);

        write_active(&path, "studio-chat").unwrap();
        assert_eq!(read_active(&path), Some("studio-chat".to_string()));

        clear_active(&path).unwrap();
        assert_eq!(read_active(&path), None);
        // Clearing twice is fine
        clear_active(&path).unwrap();
    }

    #[test]
    fn test_whitespace_only_pointer_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active_session");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(read_active(&path), None);
    }
}
