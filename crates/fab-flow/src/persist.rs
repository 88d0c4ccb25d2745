//! Persistence codec: where saved story progress lives and how it gets there.
//!
//! A location is either a qualified address (`user://`, `res://`, or an
//! absolute filesystem path) or a bare name. Bare names always land under
//! `user://`; the choice never depends on what is stored.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::FlowConfig;
use crate::error::FlowResult;

const USER_PREFIX: &str = "user://";
const RESOURCE_PREFIX: &str = "res://";

/// A fully qualified storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageAddress {
    /// Relative to the user data root.
    User(String),
    /// Relative to the resource root.
    Resource(String),
    /// An absolute filesystem path.
    Absolute(PathBuf),
}

impl StorageAddress {
    /// Qualify a location id.
    pub fn resolve(location: &str) -> Self {
        if let Some(rest) = location.strip_prefix(USER_PREFIX) {
            Self::User(rest.to_string())
        } else if let Some(rest) = location.strip_prefix(RESOURCE_PREFIX) {
            Self::Resource(rest.to_string())
        } else if Path::new(location).is_absolute() {
            Self::Absolute(PathBuf::from(location))
        } else {
            Self::User(location.to_string())
        }
    }
}

impl fmt::Display for StorageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(rest) => write!(f, "{USER_PREFIX}{rest}"),
            Self::Resource(rest) => write!(f, "{RESOURCE_PREFIX}{rest}"),
            Self::Absolute(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Text storage behind the codec.
pub trait StorageProvider: fmt::Debug {
    /// Store `contents` at `address`, replacing what was there.
    fn write(&mut self, address: &StorageAddress, contents: &str) -> io::Result<()>;

    /// Read what is stored at `address`; `None` if nothing is.
    fn read(&self, address: &StorageAddress) -> io::Result<Option<String>>;
}

/// Filesystem storage with one directory per root.
#[derive(Debug, Clone)]
pub struct FsStorage {
    user_root: PathBuf,
    resource_root: PathBuf,
}

impl FsStorage {
    /// Storage with explicit roots.
    pub fn new(user_root: impl Into<PathBuf>, resource_root: impl Into<PathBuf>) -> Self {
        Self {
            user_root: user_root.into(),
            resource_root: resource_root.into(),
        }
    }

    /// Storage rooted at the directories in `config`.
    pub fn from_config(config: &FlowConfig) -> Self {
        Self::new(&config.user_data_dir, &config.resource_dir)
    }

    /// The filesystem path behind `address`.
    pub fn path_for(&self, address: &StorageAddress) -> PathBuf {
        match address {
            StorageAddress::User(rest) => self.user_root.join(rest),
            StorageAddress::Resource(rest) => self.resource_root.join(rest),
            StorageAddress::Absolute(path) => path.clone(),
        }
    }
}

impl StorageProvider for FsStorage {
    fn write(&mut self, address: &StorageAddress, contents: &str) -> io::Result<()> {
        let path = self.path_for(address);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn read(&self, address: &StorageAddress) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(address)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// In-process storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<StorageAddress, String>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for MemoryStorage {
    fn write(&mut self, address: &StorageAddress, contents: &str) -> io::Result<()> {
        self.entries.insert(address.clone(), contents.to_string());
        Ok(())
    }

    fn read(&self, address: &StorageAddress) -> io::Result<Option<String>> {
        Ok(self.entries.get(address).cloned())
    }
}

/// Resolves locations and moves opaque state text to and from storage.
#[derive(Debug)]
pub struct PersistenceCodec {
    storage: Box<dyn StorageProvider>,
}

impl PersistenceCodec {
    /// Codec over the given storage.
    pub fn new(storage: Box<dyn StorageProvider>) -> Self {
        Self { storage }
    }

    /// Qualify a location id. See [`StorageAddress::resolve`].
    pub fn resolve(&self, location: &str) -> StorageAddress {
        StorageAddress::resolve(location)
    }

    /// Store serialized state.
    pub fn write(&mut self, address: &StorageAddress, state: &str) -> FlowResult<()> {
        log::debug!("writing {} bytes of state to {address}", state.len());
        self.storage.write(address, state)?;
        Ok(())
    }

    /// Read serialized state. Absent and zero-length targets yield `None`.
    pub fn read(&self, address: &StorageAddress) -> FlowResult<Option<String>> {
        let state = self.storage.read(address)?.filter(|s| !s.is_empty());
        if state.is_none() {
            log::debug!("no saved state at {address}");
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn resolve_forms() {
        assert_eq!(
            StorageAddress::resolve("slot1"),
            StorageAddress::User("slot1".to_string())
        );
        assert_eq!(
            StorageAddress::resolve("saves/slot1"),
            StorageAddress::User("saves/slot1".to_string())
        );
        assert_eq!(
            StorageAddress::resolve("user://slot1"),
            StorageAddress::User("slot1".to_string())
        );
        assert_eq!(
            StorageAddress::resolve("res://intro.json"),
            StorageAddress::Resource("intro.json".to_string())
        );
    }

    #[test]
    fn resolve_absolute() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        assert_eq!(
            StorageAddress::resolve(&path.display().to_string()),
            StorageAddress::Absolute(path)
        );
    }

    #[test]
    fn fs_round_trip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path().join("user"), dir.path().join("res"));
        let address = StorageAddress::resolve("nested/slot1");
        storage.write(&address, "{\"a\":1}").unwrap();
        assert!(dir.path().join("user/nested/slot1").exists());
        assert_eq!(storage.read(&address).unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn fs_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path(), dir.path());
        assert_eq!(storage.read(&StorageAddress::resolve("nope")).unwrap(), None);
    }

    #[test]
    fn codec_treats_empty_as_absent() {
        let mut codec = PersistenceCodec::new(Box::new(MemoryStorage::new()));
        let address = codec.resolve("slot1");
        codec.write(&address, "").unwrap();
        assert_eq!(codec.read(&address).unwrap(), None);
        codec.write(&address, "state").unwrap();
        assert_eq!(codec.read(&address).unwrap().as_deref(), Some("state"));
    }

    #[test]
    fn fs_storage_from_config() {
        let config = FlowConfig::default()
            .with_user_data_dir("/data/user")
            .with_resource_dir("/data/res");
        let storage = FsStorage::from_config(&config);
        assert_eq!(
            storage.path_for(&StorageAddress::resolve("res://a.json")),
            PathBuf::from("/data/res/a.json")
        );
        assert_eq!(
            storage.path_for(&StorageAddress::resolve("a")),
            PathBuf::from("/data/user/a")
        );
    }

    proptest! {
        #[test]
        fn bare_names_resolve_under_user(name in "[a-z][a-z0-9_]{0,12}") {
            prop_assert_eq!(StorageAddress::resolve(&name), StorageAddress::User(name.clone()));
        }

        #[test]
        fn qualified_addresses_are_stable(name in "[a-z][a-z0-9_/]{0,12}") {
            for address in [StorageAddress::User(name.clone()), StorageAddress::Resource(name.clone())] {
                prop_assert_eq!(StorageAddress::resolve(&address.to_string()), address);
            }
        }
    }
}
