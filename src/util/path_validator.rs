use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors returned when an output path is refused.
#[derive(Debug, Error)]
pub enum PathValidationError {
    #[error("Output path must be relative to the current workspace")]
    Absolute,
    #[error("Output path must not contain '..'")]
    ParentTraversal,
    #[error("Output path must end with .md")]
    NotMarkdown,
    #[error("Output path escapes the current workspace")]
    EscapesWorkspace,
    #[error("Failed to resolve output path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An output location inside the workspace that ends in `.md`.
///
/// The path is absolute and already resolved through any symlinks that existed
/// at validation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOutputPath(PathBuf);

impl ValidatedOutputPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for ValidatedOutputPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// The directory output files must stay within.
///
/// Captured once (normally from the working directory at startup) and passed
/// explicitly to whatever needs it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Uses the canonicalized `root` as the containment boundary.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    /// Captures the process working directory.
    pub fn current() -> io::Result<Self> {
        Self::new(std::env::current_dir()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates a user-supplied output path.
    ///
    /// Syntactic checks run first (relative, no `..`, `.md` extension in any
    /// case). The path is then resolved against the root, following symlinks on
    /// the portion that already exists, and must still land inside the root.
    pub fn validate_output(&self, raw: &str) -> Result<ValidatedOutputPath, PathValidationError> {
        let path = Path::new(raw);

        // has_root catches "\foo" on Windows, which is_absolute does not
        let has_prefix = matches!(path.components().next(), Some(Component::Prefix(_)));
        if path.is_absolute() || path.has_root() || has_prefix {
            return Err(PathValidationError::Absolute);
        }
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(PathValidationError::ParentTraversal);
        }
        let is_markdown = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
        if !is_markdown {
            return Err(PathValidationError::NotMarkdown);
        }

        let joined = self.root.join(path);
        let resolved = resolve_lenient(&joined).map_err(|source| PathValidationError::Io {
            path: joined.clone(),
            source,
        })?;

        if resolved == self.root || !resolved.starts_with(&self.root) {
            tracing::warn!(
                requested = %raw,
                resolved = %resolved.display(),
                "Output path resolves outside the workspace"
            );
            return Err(PathValidationError::EscapesWorkspace);
        }

        Ok(ValidatedOutputPath(resolved))
    }
}

/// Canonicalizes the longest existing ancestor of `path` and appends the rest.
///
/// `path` must be absolute and free of `..` components.
fn resolve_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut pending = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for part in pending.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let Some(name) = existing.file_name() else {
                    return Err(e);
                };
                pending.push(name.to_os_string());
                existing = match existing.parent() {
                    Some(parent) => parent,
                    None => return Err(e),
                };
            }
            Err(e) => return Err(e),
        }
    }
}
