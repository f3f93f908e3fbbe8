//! Resolving type OIDs to canonical type names.
//!
//! Results need a type name per column to pick a coercion; the native layer
//! only reports OIDs. A small built-in table covers the common scalar
//! types; the full `pg_type` table can be loaded once through a
//! [`TypeNameCache`] and is then reused for the process lifetime.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::native::Oid;

/// Mapping from type OID to canonical type name.
pub type TypeNameMap = HashMap<Oid, String>;

/// Type name for the common built-in OIDs, used when no cache is loaded.
pub fn builtin_type_name(oid: Oid) -> Option<&'static str> {
    match oid {
        16 => Some("bool"),
        17 => Some("bytea"),
        18 => Some("char"),
        19 => Some("name"),
        20 => Some("int8"),
        21 => Some("int2"),
        23 => Some("int4"),
        25 => Some("text"),
        26 => Some("oid"),
        700 => Some("float4"),
        701 => Some("float8"),
        1042 => Some("bpchar"),
        1043 => Some("varchar"),
        1700 => Some("numeric"),
        _ => None,
    }
}

/// A store for the oid -> type name mapping, computed once via a metadata
/// query and reused afterwards.
pub trait TypeNameCache {
    /// Load the mapping, computing and persisting it on first access.
    fn load(&self, conn: &mut Connection) -> Result<TypeNameMap>;

    /// Drop the persisted mapping so the next load recomputes it.
    /// Absence is not an error.
    fn clean(&self) -> Result<()>;
}

/// On-disk artifact layout. Readers treat the file as opaque and reload it
/// wholesale; writers only ever publish via rename.
#[derive(Debug, Serialize, Deserialize)]
struct CacheArtifact {
    types: TypeNameMap,
}

/// File-backed [`TypeNameCache`], safe for concurrent first-population
/// across independent processes.
///
/// Population takes an exclusive `flock` on a sibling lock file, re-checks
/// existence under the lock, writes a temporary file and atomically renames
/// it into place. The rename is the only mutation readers can observe.
pub struct FileTypeNameCache {
    path: PathBuf,
}

/// Append a suffix to a path without touching its extension.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

impl FileTypeNameCache {
    /// Create a cache backed by the given artifact path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The artifact path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn query_type_names(conn: &mut Connection) -> Result<TypeNameMap> {
        let result = conn.query("SELECT oid, typname FROM pg_catalog.pg_type", Vec::new())?;
        let mut map = TypeNameMap::with_capacity(result.num_rows());
        for row in result.rows() {
            let row = row?;
            let oid = row
                .get("oid")?
                .as_i64()
                .and_then(|v| Oid::try_from(v).ok())
                .ok_or_else(|| Error::Parse("pg_type.oid is not a valid oid".into()))?;
            let name = row
                .get("typname")?
                .as_str()
                .ok_or_else(|| Error::Parse("pg_type.typname is not text".into()))?
                .to_string();
            map.insert(oid, name);
        }
        Ok(map)
    }

    fn populate(&self, conn: &mut Connection) -> Result<()> {
        let lock_path = sibling(&self.path, ".lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        let lock = Flock::lock(lock_file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| Error::Io(errno.into()))?;

        // another process may have populated the cache while we waited
        if !self.path.is_file() {
            if let Some(dir) = self.path.parent() {
                if !dir.as_os_str().is_empty() {
                    fs::create_dir_all(dir)?;
                }
            }
            let types = Self::query_type_names(conn)?;
            let artifact = CacheArtifact { types };
            let json = serde_json::to_vec(&artifact)
                .map_err(|e| Error::Parse(format!("cannot serialize type name cache: {}", e)))?;
            let tmp_path = sibling(&self.path, ".tmp");
            fs::write(&tmp_path, json)?;
            fs::rename(&tmp_path, &self.path)?;
            debug!(path = %self.path.display(), count = artifact.types.len(), "type name cache populated");
        }

        drop(lock);
        // another waiter may still hold the lock file open
        let _ = fs::remove_file(&lock_path);
        Ok(())
    }
}

impl TypeNameCache for FileTypeNameCache {
    fn load(&self, conn: &mut Connection) -> Result<TypeNameMap> {
        if !self.path.is_file() {
            self.populate(conn)?;
        }
        let data = fs::read(&self.path)?;
        let artifact: CacheArtifact = serde_json::from_slice(&data)
            .map_err(|e| Error::Parse(format!("corrupted type name cache: {}", e)))?;
        Ok(artifact.types)
    }

    fn clean(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
