//! Registry Store — the on-disk current registry, its snapshot, staged
//! replacement and retained backup.
//!
//! # Protocol
//!
//! ```text
//! services.yml ──copy──▶ services.yml-tmp         snapshot()
//!                        services.yml-new         stage_new()   (atomic write)
//! services.yml-new ──rename──▶ services.yml       promote()
//! services.yml-tmp ──rename──▶ services.yml-old
//! services.yml-tmp ──rename──▶ services.yml       restore()
//! rm services.yml-new services.yml-tmp            discard_staged()
//! ```
//!
//! The current registry is only ever replaced by `rename`, so readers never
//! observe a partially written document. Every write goes through
//! [`write_atomic`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::{io_err, RegistryError};
use crate::layout::{self, Layout};
use crate::types::{BaselineRegistry, ServiceName, ServiceRegistry};

// ---------------------------------------------------------------------------
// Backup handle
// ---------------------------------------------------------------------------

/// Copy of the current registry taken before a reconciliation attempt.
///
/// Consumed by exactly one of [`RegistryStore::promote`],
/// [`RegistryStore::restore`] or [`RegistryStore::discard_staged`].
#[derive(Debug)]
#[must_use = "a snapshot must be promoted, restored or discarded"]
pub struct Backup {
    path: PathBuf,
}

impl Backup {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle on the registry files described by a [`Layout`].
#[derive(Debug, Clone)]
pub struct RegistryStore {
    layout: Layout,
}

impl RegistryStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Whether a current registry exists on disk.
    pub fn exists(&self) -> bool {
        self.layout.registry_path().exists()
    }

    /// Load the current registry.
    ///
    /// Returns `RegistryError::NotFound` if absent,
    /// `RegistryError::Parse` (with path + line context) if malformed YAML.
    pub fn load_current(&self) -> Result<ServiceRegistry, RegistryError> {
        load_document(&self.layout.registry_path())
    }

    /// Load the baseline shipped in the templates directory.
    pub fn load_baseline(&self) -> Result<BaselineRegistry, RegistryError> {
        load_document(&self.layout.baseline_path())
    }

    /// First-run path: install the baseline byte-for-byte as the current
    /// registry. Not a reconciliation; no backup is taken.
    pub fn install_baseline(&self) -> Result<(), RegistryError> {
        let src = self.layout.baseline_path();
        let bytes = read_bytes(&src)?;
        let dir = self.layout.registry_dir();
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        write_atomic(&self.layout.registry_path(), &bytes)?;
        tracing::debug!("installed baseline {} as current registry", src.display());
        Ok(())
    }

    /// Copy the current registry aside before reconciling.
    pub fn snapshot(&self) -> Result<Backup, RegistryError> {
        let current = self.layout.registry_path();
        let path = self.layout.snapshot_path();
        std::fs::copy(&current, &path).map_err(|e| io_err(&current, e))?;
        tracing::debug!("snapshot: {} -> {}", current.display(), path.display());
        Ok(Backup { path })
    }

    /// Serialize `registry` to the staged path.
    pub fn stage_new(&self, registry: &ServiceRegistry) -> Result<(), RegistryError> {
        let yaml = serde_yaml::to_string(registry)?;
        let staged = self.layout.staged_path();
        write_atomic(&staged, yaml.as_bytes())?;
        tracing::debug!("staged: {}", staged.display());
        Ok(())
    }

    /// Whether a staged registry is waiting to be promoted.
    pub fn has_staged(&self) -> bool {
        self.layout.staged_path().exists()
    }

    /// Swap the staged registry in and keep the snapshot as the `-old` backup.
    ///
    /// On failure the backup is handed back so the caller can restore it.
    pub fn promote(&self, backup: Backup) -> Result<(), (RegistryError, Backup)> {
        let staged = self.layout.staged_path();
        let current = self.layout.registry_path();
        if let Err(e) = std::fs::rename(&staged, &current) {
            return Err((io_err(&current, e), backup));
        }
        let old = self.layout.backup_path();
        if let Err(e) = std::fs::rename(&backup.path, &old) {
            return Err((io_err(&old, e), backup));
        }
        tracing::debug!("promoted: {} (backup at {})", current.display(), old.display());
        Ok(())
    }

    /// Put the snapshot back as the current registry, then drop any staged
    /// file.
    ///
    /// The snapshot is renamed first so the live registry is restored even
    /// when the staged file cannot be removed; that case is reported as
    /// `RegistryError::Cleanup`.
    pub fn restore(&self, backup: Backup) -> Result<(), RegistryError> {
        let current = self.layout.registry_path();
        std::fs::rename(&backup.path, &current).map_err(|e| io_err(&current, e))?;
        tracing::debug!("restored: {} from {}", current.display(), backup.path.display());

        let staged = self.layout.staged_path();
        match std::fs::remove_file(&staged) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::Cleanup {
                path: staged,
                source: e,
            }),
        }
    }

    /// Nothing changed: drop the staged file (if any) and the snapshot.
    pub fn discard_staged(&self, backup: Backup) -> Result<(), RegistryError> {
        remove_if_exists(&self.layout.staged_path())?;
        remove_if_exists(&backup.path)?;
        tracing::debug!("discarded snapshot {}", backup.path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Document I/O
// ---------------------------------------------------------------------------

/// Read and decode a registry-shaped document.
///
/// An empty or `null` document decodes as an empty registry; anything that
/// is not a top-level mapping is rejected. Entries are decoded one service at
/// a time so a bad entry is reported by name.
pub fn load_document<V>(path: &Path) -> Result<IndexMap<ServiceName, V>, RegistryError>
where
    V: DeserializeOwned,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RegistryError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(io_err(path, e)),
    };
    let value: Value = serde_yaml::from_str(&contents).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mapping = match value {
        Value::Null => return Ok(IndexMap::new()),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(invalid(
                path,
                "top level must be a mapping of service names".to_owned(),
            ))
        }
    };

    let mut services = IndexMap::with_capacity(mapping.len());
    for (key, entry) in mapping {
        let name = match key {
            Value::String(name) => ServiceName::from(name),
            other => {
                return Err(invalid(
                    path,
                    format!("service name must be a string, got {other:?}"),
                ))
            }
        };
        let entry = serde_yaml::from_value(entry)
            .map_err(|e| invalid(path, format!("service '{name}': {e}")))?;
        services.insert(name, entry);
    }
    Ok(services)
}

fn invalid(path: &Path, reason: String) -> RegistryError {
    RegistryError::InvalidDocument {
        path: path.to_path_buf(),
        reason,
    }
}

/// Write `bytes` to `path` through a temp sibling and `rename`.
///
/// Write flow: `<path>.svcregen.tmp` → `chmod 0644` → `rename`.
/// The temp file is removed if the rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let tmp = layout::write_tmp_path(path);
    write_atomic_with_tmp(path, bytes, &tmp)
}

fn write_atomic_with_tmp(path: &Path, bytes: &[u8], tmp: &Path) -> Result<(), RegistryError> {
    std::fs::write(tmp, bytes).map_err(|e| io_err(tmp, e))?;
    set_file_permissions(tmp)?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, RegistryError> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            RegistryError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            io_err(path, e)
        }
    })
}

fn remove_if_exists(path: &Path) -> Result<(), RegistryError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
