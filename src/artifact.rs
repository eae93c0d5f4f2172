//! Staged artifact store: the byte blobs flowing between pipeline stages.
//!
//! ## Why a temp-dir-owning store?
//!
//! The external renderers operate on filesystem paths, not byte buffers, so
//! every intermediate document has to exist on disk. Owning a [`TempDir`]
//! gives every staged file a scoped lifetime: dropping the store removes
//! everything it ever wrote, on success and failure paths alike, even if the
//! process panics mid-pipeline. Nothing staged can outlive the run.
//!
//! ## Supersede-on-write
//!
//! At most one artifact is current per role. Writing a role again deletes the
//! prior file *before* installing the new one, so a stage can never read a
//! stale byte through a cached path. Staging names carry a random 128-bit
//! token, so concurrent runs (each with its own store) can never collide even
//! if they share a temp root.

use crate::error::LongPdfError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

/// Format tag of a staged artifact.
///
/// Stages declare the format they consume and the format they produce; the
/// orchestrator refuses to run a stage whose declared input does not match
/// the current artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactFormat {
    /// Bytes staged as-is (e.g. a notebook before export).
    Raw,
    /// Lightweight markup (Markdown).
    Markup,
    /// Structured markup ready for the layout engine (HTML).
    StructuredMarkup,
    /// Paginated binary output (PDF).
    PaginatedBinary,
}

impl ArtifactFormat {
    /// File extension used for staged files of this format.
    fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Raw => "bin",
            ArtifactFormat::Markup => "md",
            ArtifactFormat::StructuredMarkup => "html",
            ArtifactFormat::PaginatedBinary => "pdf",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactFormat::Raw => "raw",
            ArtifactFormat::Markup => "markup",
            ArtifactFormat::StructuredMarkup => "structured-markup",
            ArtifactFormat::PaginatedBinary => "paginated-binary",
        };
        f.write_str(s)
    }
}

/// Handle to a staged artifact: role, format, and on-disk location.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    role: String,
    format: ArtifactFormat,
    path: PathBuf,
}

impl ArtifactRef {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
struct Staged {
    format: ArtifactFormat,
    path: PathBuf,
}

/// Store for staged artifacts, keyed by role.
///
/// Single-threaded by design: a pipeline invocation owns exactly one store
/// and runs its stages sequentially, so interior mutability is a `RefCell`,
/// not a lock. Run concurrent conversions with one store each.
#[derive(Debug)]
pub struct ArtifactStore {
    root: TempDir,
    staged: RefCell<HashMap<String, Staged>>,
}

impl ArtifactStore {
    /// Create a store owning a fresh staging directory.
    pub fn new() -> Result<Self, LongPdfError> {
        let root = TempDir::new().map_err(|e| LongPdfError::Io {
            path: std::env::temp_dir(),
            source: e,
        })?;
        debug!(root = %root.path().display(), "created staging root");
        Ok(Self {
            root,
            staged: RefCell::new(HashMap::new()),
        })
    }

    /// The staging root directory. External tools that extract auxiliary
    /// files (e.g. notebook images) are pointed here so everything is
    /// cleaned up together.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Stage `bytes` as the current artifact for `role`, superseding (and
    /// deleting) any prior artifact under the same role.
    pub fn write(
        &self,
        role: &str,
        format: ArtifactFormat,
        bytes: &[u8],
    ) -> Result<ArtifactRef, LongPdfError> {
        let path = self.staging_path(role, format.extension());
        fs::write(&path, bytes).map_err(|e| LongPdfError::Io {
            path: path.clone(),
            source: e,
        })?;
        self.install(role, format, path)
    }

    /// Move an already-written file (typically a [`Self::scratch_path`] an
    /// external tool wrote to) into the store as the current artifact for
    /// `role`, superseding any prior one.
    pub fn adopt(
        &self,
        role: &str,
        format: ArtifactFormat,
        file: &Path,
    ) -> Result<ArtifactRef, LongPdfError> {
        let path = self.staging_path(role, format.extension());
        fs::rename(file, &path).map_err(|e| LongPdfError::Io {
            path: file.to_path_buf(),
            source: e,
        })?;
        self.install(role, format, path)
    }

    /// Read the current artifact for `role`.
    pub fn read(&self, role: &str) -> Result<Vec<u8>, LongPdfError> {
        let path = self.path(role)?;
        fs::read(&path).map_err(|e| LongPdfError::Io { path, source: e })
    }

    /// Path of the current artifact for `role`, for adapters that operate
    /// by filesystem path rather than in-memory bytes.
    pub fn path(&self, role: &str) -> Result<PathBuf, LongPdfError> {
        self.staged
            .borrow()
            .get(role)
            .map(|s| s.path.clone())
            .ok_or_else(|| LongPdfError::ArtifactNotFound { role: role.into() })
    }

    /// Format of the current artifact for `role`, if any.
    pub fn format(&self, role: &str) -> Option<ArtifactFormat> {
        self.staged.borrow().get(role).map(|s| s.format)
    }

    /// A fresh private scratch path inside the staging root. The name
    /// carries a random 128-bit token, never a counter, so overlapping runs
    /// and repeated calls cannot collide.
    pub fn scratch_path(&self, extension: &str) -> PathBuf {
        self.root
            .path()
            .join(format!("scratch-{}.{extension}", Uuid::new_v4().simple()))
    }

    fn staging_path(&self, role: &str, extension: &str) -> PathBuf {
        self.root
            .path()
            .join(format!("{role}-{}.{extension}", Uuid::new_v4().simple()))
    }

    fn install(
        &self,
        role: &str,
        format: ArtifactFormat,
        path: PathBuf,
    ) -> Result<ArtifactRef, LongPdfError> {
        let prior = self.staged.borrow_mut().insert(
            role.to_string(),
            Staged {
                format,
                path: path.clone(),
            },
        );
        if let Some(prior) = prior {
            if prior.path != path {
                match fs::remove_file(&prior.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(LongPdfError::Io {
                            path: prior.path,
                            source: e,
                        })
                    }
                }
            }
        }
        debug!(role, %format, path = %path.display(), "staged artifact");
        Ok(ArtifactRef {
            role: role.to_string(),
            format,
            path,
        })
    }
}
