use std::io::Write;
use std::path::{Path, PathBuf};

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    /// Write only if `ident` does not exist yet; fails with `AlreadyExists`.
    fn create_new(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn list(&self) -> Vec<String>;
}

#[derive(Clone)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }

    fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    /// Hidden, so `list` never reports it.
    fn temp_path(&self) -> PathBuf {
        self.path(&format!(".{}.tmp", rusty_ulid::generate_ulid_string()))
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let temp_path = self.temp_path();

        std::fs::write(&temp_path, data)?;

        std::fs::rename(&temp_path, self.path(ident))
    }

    /// The target appears fully written or not at all: data goes to a temp
    /// file first, then a hard link claims the name. Linking fails with
    /// `AlreadyExists` if the name is taken.
    fn create_new(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let temp_path = self.temp_path();

        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        let linked = std::fs::hard_link(&temp_path, self.path(ident));
        if let Err(e) = std::fs::remove_file(&temp_path) {
            log::warn!("Failed to remove temp file {}: {e}", temp_path.display());
        }
        linked
    }

    fn list(&self) -> Vec<String> {
        std::fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let path = entry.path();
                        if path.is_file() {
                            path.file_name()
                                .and_then(|name| name.to_str())
                                .filter(|name| !name.starts_with('.'))
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
