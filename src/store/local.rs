//! File-backed vector store.
//!
//! Layout under the base directory:
//! - `docs/<encoded key>.json`: one JSON document per key
//! - `indexes/<encoded name>.json`: the declared schema
//!
//! Keys are form-urlencoded into file names. A key whose encoding would be
//! too long for a file name is stored as `~<sha256 hex>.json` instead, and
//! that file wraps the document together with its key.
//!
//! Documents are replaced atomically (temp file + rename), so concurrent
//! writers to the same key leave exactly one complete document behind.
//! Index files are created with create-new semantics; a second creator
//! sees `IndexAlreadyExists`.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use super::{rank_documents, IndexInfo, IndexSchema, KnnQuery, ScoredDocument, StoreError, VectorStore};
use crate::storage::{BackendLocal, StorageManager};

const FILE_SUFFIX: &str = ".json";

/// Longest encoded key used verbatim as a file name.
const MAX_ENCODED_LEN: usize = 200;

/// Starts hashed file names; never produced by the key encoding.
const HASHED_MARKER: char = '~';

/// On-disk form of a document stored under a hashed file name.
#[derive(Serialize, Deserialize)]
struct HashedDoc {
    key: String,
    doc: Value,
}

pub struct LocalStore {
    docs: BackendLocal,
    indexes: BackendLocal,
}

impl LocalStore {
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref();
        Ok(Self {
            docs: BackendLocal::new(base_dir.join("docs"))?,
            indexes: BackendLocal::new(base_dir.join("indexes"))?,
        })
    }

    fn schema(&self, index: &str) -> Result<Option<IndexSchema>, StoreError> {
        let ident = file_ident(index);
        if !self.indexes.exists(&ident) {
            return Ok(None);
        }
        let bytes = self.indexes.read(&ident)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn require_schema(&self, index: &str) -> Result<IndexSchema, StoreError> {
        self.schema(index)?
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))
    }

    fn read_hashed(&self, ident: &str) -> Result<HashedDoc, StoreError> {
        let bytes = self.docs.read(ident)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Keys of all stored documents starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.docs
            .list()
            .into_iter()
            .filter_map(|ident| {
                let stem = ident.strip_suffix(FILE_SUFFIX)?;
                if !stem.starts_with(HASHED_MARKER) {
                    return decode_key(stem);
                }
                match self.read_hashed(&ident) {
                    Ok(stored) => Some(stored.key),
                    Err(e) => {
                        log::warn!("Skipping unreadable document file {ident}: {e}");
                        None
                    }
                }
            })
            .filter(|key| key.starts_with(prefix))
            .collect()
    }
}

impl VectorStore for LocalStore {
    fn index_info(&self, name: &str) -> Result<Option<IndexInfo>, StoreError> {
        let Some(schema) = self.schema(name)? else {
            return Ok(None);
        };
        let num_docs = self.keys_with_prefix(&schema.prefix).len();
        Ok(Some(IndexInfo { schema, num_docs }))
    }

    fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(schema)?;
        match self.indexes.create_new(&file_ident(&schema.name), &bytes) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::IndexAlreadyExists(schema.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_json(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let ident = file_ident(key);
        if !self.docs.exists(&ident) {
            return Ok(None);
        }
        if ident.starts_with(HASHED_MARKER) {
            let stored = self.read_hashed(&ident)?;
            return Ok((stored.key == key).then_some(stored.doc));
        }
        let bytes = self.docs.read(&ident)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn set_json(&self, key: &str, doc: &Value) -> Result<(), StoreError> {
        let ident = file_ident(key);
        let bytes = if ident.starts_with(HASHED_MARKER) {
            serde_json::to_vec(&HashedDoc {
                key: key.to_string(),
                doc: doc.clone(),
            })?
        } else {
            serde_json::to_vec(doc)?
        };
        self.docs.write(&ident, &bytes)?;
        Ok(())
    }

    fn count(&self, index: &str) -> Result<usize, StoreError> {
        let schema = self.require_schema(index)?;
        Ok(self.keys_with_prefix(&schema.prefix).len())
    }

    fn knn(&self, index: &str, query: &KnnQuery) -> Result<Vec<ScoredDocument>, StoreError> {
        let schema = self.require_schema(index)?;

        let mut docs = Vec::new();
        for key in self.keys_with_prefix(&schema.prefix) {
            match self.get_json(&key) {
                Ok(Some(doc)) => docs.push((key, doc)),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping unreadable document {key}: {e}"),
            }
        }

        rank_documents(&schema, docs, query)
    }
}

fn file_ident(key: &str) -> String {
    let encoded = encode_key(key);
    if encoded.len() <= MAX_ENCODED_LEN {
        return format!("{encoded}{FILE_SUFFIX}");
    }
    format!("{HASHED_MARKER}{:x}{FILE_SUFFIX}", Sha256::digest(key.as_bytes()))
}

/// Form-urlencode a key into a file name. A leading `.` is escaped so the
/// file is not hidden, and the empty key becomes `=`.
fn encode_key(key: &str) -> String {
    if key.is_empty() {
        return "=".to_string();
    }
    let encoded: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{rest}"),
        None => encoded,
    }
}

fn decode_key(name: &str) -> Option<String> {
    form_urlencoded::parse(name.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
}
