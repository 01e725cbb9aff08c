use std::path::{Path, PathBuf};

use picoclaw_core::error::{PicoclawError, Result};
use tracing::debug;

/// A per-skill filesystem directory (spec.md §3 "Workspace"). Created
/// lazily on first use; a skill must not read or write outside its
/// workspace except via the explicit cross-skill channel (the RFC cache
/// under the composer's `memory/`).
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Resolve `path` once to an absolute path and bind the workspace to
    /// it. Does not touch the filesystem — call [`Workspace::init`] to
    /// create the directory and identity files.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { root: path.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    /// Idempotent: creates `memory/` and writes `IDENTITY.md`/`HEARTBEAT.md`
    /// only if missing, never clobbering existing content (spec.md §8 "A
    /// skill's second `setWorkspace(p)` with the same `p` is a no-op").
    pub fn init(&self, skill_name: &str, identity_text: &str) -> Result<()> {
        std::fs::create_dir_all(self.memory_dir())
            .map_err(|e| PicoclawError::Workspace(format!("create {}: {e}", self.memory_dir().display())))?;

        let identity_path = self.root.join("IDENTITY.md");
        if !identity_path.exists() {
            std::fs::write(&identity_path, identity_text)
                .map_err(|e| PicoclawError::Workspace(format!("write IDENTITY.md: {e}")))?;
        }

        let heartbeat_path = self.root.join("HEARTBEAT.md");
        if !heartbeat_path.exists() {
            std::fs::write(&heartbeat_path, format!("# {skill_name} heartbeat marker\n"))
                .map_err(|e| PicoclawError::Workspace(format!("write HEARTBEAT.md: {e}")))?;
        }

        debug!(skill = skill_name, root = %self.root.display(), "workspace initialized");
        Ok(())
    }

    /// Resolve `relative` against the workspace root, rejecting any path
    /// that would escape it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let candidate = self.root.join(relative);
        let root_abs = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let joined = candidate
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| candidate.clone());
        let parent_abs = joined.canonicalize().unwrap_or(joined);
        if !parent_abs.starts_with(&root_abs) {
            return Err(PicoclawError::Workspace(format!(
                "path escapes workspace: {relative}"
            )));
        }
        Ok(candidate)
    }

    pub fn memory_path(&self, filename: &str) -> PathBuf {
        self.memory_dir().join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_creates_memory_dir_and_identity_files() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("task"));
        ws.init("task", "You are the task skill.").unwrap();

        assert!(ws.memory_dir().is_dir());
        assert!(ws.root().join("IDENTITY.md").exists());
        assert!(ws.root().join("HEARTBEAT.md").exists());
    }

    #[test]
    fn second_init_does_not_clobber_identity() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("task"));
        ws.init("task", "first").unwrap();
        ws.init("task", "second").unwrap();

        let content = std::fs::read_to_string(ws.root().join("IDENTITY.md")).unwrap();
        assert_eq!(content, "first");
    }

    #[test]
    fn resolve_rejects_path_traversal_outside_workspace() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("task"));
        ws.init("task", "x").unwrap();
        let err = ws.resolve("../other/secret.txt");
        assert!(err.is_err());
    }

    #[test]
    fn resolve_allows_nested_memory_path() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("task"));
        ws.init("task", "x").unwrap();
        let p = ws.resolve("memory/tasks.xml").unwrap();
        assert_eq!(p, ws.memory_dir().join("tasks.xml"));
    }
}
