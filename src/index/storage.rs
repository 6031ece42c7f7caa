//! On-disk layout of corpus storage units

use crate::error::{SuggesterError, SuggesterResult};
use crate::index::{IndexMeta, SuggestionEntry};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const CURRENT_FILE: &str = "CURRENT";
const META_FILE: &str = "meta.json";
const ENTRIES_FILE: &str = "entries.bin";
const POPULARITY_FILE: &str = "popularity.bin";
const STAGING_PREFIX: &str = ".staging-";
const VERSION_PREFIX: &str = "v-";

/// Reject corpus names that cannot safely be used as a directory name
pub fn validate_corpus_name(name: &str) -> SuggesterResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(SuggesterError::InvalidConfiguration(format!(
            "invalid corpus name '{}'",
            name
        )));
    }
    Ok(())
}

/// Storage units of every corpus under one root directory
#[derive(Debug, Clone)]
pub struct IndexStorage {
    root: PathBuf,
}

impl IndexStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage unit of `corpus`; its absence means the corpus was never built
    pub fn corpus_dir(&self, corpus: &str) -> PathBuf {
        self.root.join(corpus)
    }

    pub fn popularity_path(&self, corpus: &str) -> PathBuf {
        self.corpus_dir(corpus).join(POPULARITY_FILE)
    }

    /// Directory of the live version, if one was ever installed
    pub fn current_version(&self, corpus: &str) -> SuggesterResult<Option<PathBuf>> {
        let pointer = self.corpus_dir(corpus).join(CURRENT_FILE);
        let name = match fs::read_to_string(&pointer) {
            Ok(name) => name,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let dir = self.corpus_dir(corpus).join(name.trim());
        if !dir.is_dir() {
            warn!(corpus = %corpus, version = %name.trim(), "CURRENT points at a missing version");
            return Ok(None);
        }
        Ok(Some(dir))
    }

    /// Create an empty staging directory for a new build
    pub fn stage(&self, corpus: &str) -> SuggesterResult<StagedVersion> {
        let id = Uuid::new_v4().simple().to_string();
        let corpus_dir = self.corpus_dir(corpus);
        let dir = corpus_dir.join(format!("{}{}", STAGING_PREFIX, id));
        fs::create_dir_all(&dir)?;

        Ok(StagedVersion {
            corpus_dir,
            dir,
            id,
            committed: false,
        })
    }

    /// Remove leftover staging directories and versions other than `keep`
    pub fn sweep(&self, corpus: &str, keep: Option<&Path>) -> SuggesterResult<usize> {
        let corpus_dir = self.corpus_dir(corpus);
        let entries = match fs::read_dir(&corpus_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            let stale = name.starts_with(STAGING_PREFIX)
                || (name.starts_with(VERSION_PREFIX) && Some(path.as_path()) != keep);
            if stale && path.is_dir() {
                remove_dir_if_exists(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(corpus = %corpus, removed = removed, "Swept stale index directories");
        }
        Ok(removed)
    }

    /// Delete the whole storage unit of `corpus`
    pub fn delete(&self, corpus: &str) -> io::Result<()> {
        remove_dir_if_exists(&self.corpus_dir(corpus))
    }
}

/// Read the metadata of one version directory
pub(crate) fn read_meta(dir: &Path) -> SuggesterResult<IndexMeta> {
    let file = fs::File::open(dir.join(META_FILE))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Read the entries of one version directory
pub(crate) fn read_entries(dir: &Path) -> SuggesterResult<Vec<SuggestionEntry>> {
    let file = fs::File::open(dir.join(ENTRIES_FILE))?;
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}

/// Write `bytes` to `path` through a temporary file and a rename
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// A version being written; removed on drop unless committed
#[derive(Debug)]
pub struct StagedVersion {
    corpus_dir: PathBuf,
    dir: PathBuf,
    id: String,
    committed: bool,
}

impl StagedVersion {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Persist metadata and entries into the staging directory
    pub fn write(&self, meta: &IndexMeta, entries: &[SuggestionEntry]) -> SuggesterResult<()> {
        let entries_file = fs::File::create(self.dir.join(ENTRIES_FILE))?;
        let mut writer = BufWriter::new(entries_file);
        bincode::serialize_into(&mut writer, entries)?;
        writer.flush()?;

        let meta_json = serde_json::to_vec_pretty(meta)?;
        fs::write(self.dir.join(META_FILE), meta_json)?;
        Ok(())
    }

    /// Publish the staged version as the live one and return its final directory
    pub fn commit(mut self) -> SuggesterResult<PathBuf> {
        let version_name = format!("{}{}", VERSION_PREFIX, self.id);
        let version_dir = self.corpus_dir.join(&version_name);

        fs::rename(&self.dir, &version_dir)?;
        self.committed = true;

        write_atomically(
            &self.corpus_dir.join(CURRENT_FILE),
            version_name.as_bytes(),
        )?;
        Ok(version_dir)
    }
}

impl Drop for StagedVersion {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = remove_dir_if_exists(&self.dir) {
                warn!(path = %self.dir.display(), error = %e, "Failed to discard staged index");
            }
        }
    }
}
