//! Voice embedding banks.
//!
//! A [`VoiceEmbeddingStore`] maps voice names to fixed-width style vectors.
//! Three packagings are understood:
//! - **Zip archive** (`voices.npz`): one `.npy` entry per voice
//! - **Directory**: one `.npy` file per voice
//! - **Flat binary** (`voices.bin`): contiguous little-endian f32 vectors,
//!   addressed by position
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sonance_core::voice::VoiceEmbeddingStore;
//!
//! let store = VoiceEmbeddingStore::open("models/kokoro-v1.0/voices", 256)?;
//! let embedding = store.get("af_bella")?;
//! ```
//!
//! ## Width policy
//!
//! Voice banks disagree on packaging, so width mismatches are not errors.
//! Vectors longer than the expected width are truncated to it; shorter ones
//! are kept as they are. A 2-D `(rows, width)` array contributes its first
//! row.

pub mod npy;

use crate::error::{SynthesisError, SynthesisResult};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Default voice embedding width (Kokoro style vectors).
pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// Upper bound on a single `.npy` entry read from an archive.
const MAX_NPY_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// A named voice vector.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceEmbedding {
    pub name: String,
    pub vector: Vec<f32>,
}

impl VoiceEmbedding {
    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// Detected packaging of a voice bank on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceFormat {
    /// Zip/NPZ archive of `.npy` files
    Archive,
    /// Directory of `.npy` files
    Directory,
    /// Flat f32 little-endian vectors
    FlatBinary,
}

impl VoiceFormat {
    /// Detect the format from a path and, for files, its leading bytes.
    ///
    /// Archives start with "PK" (zip magic bytes).
    pub fn detect(path: &Path, head: &[u8]) -> Self {
        if path.is_dir() {
            VoiceFormat::Directory
        } else if head.len() >= 2 && head[0] == b'P' && head[1] == b'K' {
            VoiceFormat::Archive
        } else {
            VoiceFormat::FlatBinary
        }
    }
}

/// Immutable name → embedding table.
#[derive(Debug, Clone)]
pub struct VoiceEmbeddingStore {
    voices: HashMap<String, Vec<f32>>,
    embedding_dim: usize,
}

impl VoiceEmbeddingStore {
    /// Build a store from already-decoded vectors, applying the width policy.
    pub fn from_vectors(
        vectors: impl IntoIterator<Item = (String, Vec<f32>)>,
        embedding_dim: usize,
    ) -> Self {
        let voices = vectors
            .into_iter()
            .map(|(name, vector)| (name, fit_width(vector, embedding_dim)))
            .collect();
        Self {
            voices,
            embedding_dim,
        }
    }

    /// Open a voice bank, auto-detecting its format.
    ///
    /// # Arguments
    /// * `path` - Archive, directory or flat binary file
    /// * `embedding_dim` - Expected vector width
    pub fn open(path: impl AsRef<Path>, embedding_dim: usize) -> SynthesisResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SynthesisError::Io(format!(
                "voice bank not found: {}",
                path.display()
            )));
        }

        let mut head = [0u8; 2];
        let read = if path.is_file() {
            File::open(path)?.read(&mut head)?
        } else {
            0
        };

        match VoiceFormat::detect(path, &head[..read]) {
            VoiceFormat::Directory => Self::from_dir(path, embedding_dim),
            VoiceFormat::Archive => Self::from_zip(path, embedding_dim),
            VoiceFormat::FlatBinary => {
                let bytes = fs::read(path)?;
                Self::from_flat_bin(&bytes, embedding_dim, None)
            }
        }
    }

    /// Load every `.npy` entry of a zip archive. Other entries are skipped.
    pub fn from_zip(path: impl AsRef<Path>, embedding_dim: usize) -> SynthesisResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut vectors = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() || !entry.name().ends_with(".npy") {
                continue;
            }
            let entry_name = entry.name().to_string();

            let mut raw = Vec::new();
            (&mut entry)
                .take(MAX_NPY_ENTRY_BYTES + 1)
                .read_to_end(&mut raw)?;
            if raw.len() as u64 > MAX_NPY_ENTRY_BYTES {
                return Err(SynthesisError::Format(format!(
                    "npy entry '{}' exceeds {} bytes",
                    entry_name, MAX_NPY_ENTRY_BYTES
                )));
            }

            let array = npy::parse(&raw).map_err(|e| annotate(e, &entry_name))?;
            vectors.push((voice_name(&entry_name), first_row(array, embedding_dim)));
        }

        log::debug!(
            "Loaded {} voices from archive {}",
            vectors.len(),
            path.display()
        );
        Ok(Self::from_vectors(vectors, embedding_dim))
    }

    /// Load every `*.npy` file in a directory. Subdirectories are ignored.
    pub fn from_dir(dir: impl AsRef<Path>, embedding_dim: usize) -> SynthesisResult<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| {
            SynthesisError::Io(format!("failed to read {}: {}", dir.display(), e))
        })?;

        let mut vectors = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("npy") {
                continue;
            }
            let file_name = path.display().to_string();
            let bytes = fs::read(&path)?;
            let array = npy::parse(&bytes).map_err(|e| annotate(e, &file_name))?;
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            vectors.push((name, first_row(array, embedding_dim)));
        }

        log::debug!("Loaded {} voices from {}", vectors.len(), dir.display());
        Ok(Self::from_vectors(vectors, embedding_dim))
    }

    /// Load a flat binary bank of `embedding_dim`-wide f32 vectors.
    ///
    /// Voices are named from `names` in order, or `voice_<index>` when no
    /// names are given. Trailing bytes that do not fill a whole vector are
    /// ignored.
    pub fn from_flat_bin(
        bytes: &[u8],
        embedding_dim: usize,
        names: Option<&[String]>,
    ) -> SynthesisResult<Self> {
        if embedding_dim == 0 {
            return Err(SynthesisError::Config(
                "embedding dimension must be positive".to_string(),
            ));
        }
        let voice_size = embedding_dim * 4;
        let num_voices = bytes.len() / voice_size;
        if num_voices == 0 {
            return Err(SynthesisError::Format(format!(
                "flat voice bank holds {} bytes, less than one {}-wide vector",
                bytes.len(),
                embedding_dim
            )));
        }
        if let Some(names) = names {
            if names.len() != num_voices {
                return Err(SynthesisError::Format(format!(
                    "flat voice bank holds {} voices but {} names were given",
                    num_voices,
                    names.len()
                )));
            }
        }

        let vectors = bytes
            .chunks_exact(voice_size)
            .enumerate()
            .map(|(index, chunk)| {
                let name = match names {
                    Some(names) => names[index].clone(),
                    None => format!("voice_{}", index),
                };
                let vector = chunk
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                (name, vector)
            })
            .collect::<Vec<_>>();

        Ok(Self::from_vectors(vectors, embedding_dim))
    }

    /// Look up a voice by name. There is no default fallback.
    pub fn get(&self, name: &str) -> SynthesisResult<VoiceEmbedding> {
        self.voices
            .get(name)
            .map(|vector| VoiceEmbedding {
                name: name.to_string(),
                vector: vector.clone(),
            })
            .ok_or_else(|| SynthesisError::VoiceNotFound(name.to_string()))
    }

    /// Names of all voices in the store.
    pub fn list(&self) -> BTreeSet<String> {
        self.voices.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Expected embedding width.
    pub fn dim(&self) -> usize {
        self.embedding_dim
    }
}

fn fit_width(mut vector: Vec<f32>, embedding_dim: usize) -> Vec<f32> {
    if vector.len() > embedding_dim {
        vector.truncate(embedding_dim);
    }
    vector
}

fn first_row(array: npy::NpyArray, embedding_dim: usize) -> Vec<f32> {
    let mut data = array.data;
    if array.shape.len() == 2 && array.shape[1] == embedding_dim {
        data.truncate(embedding_dim);
    }
    data
}

fn voice_name(entry_name: &str) -> String {
    let base = entry_name.rsplit('/').next().unwrap_or(entry_name);
    base.trim_end_matches(".npy").to_string()
}

fn annotate(err: SynthesisError, source: &str) -> SynthesisError {
    match err {
        SynthesisError::Format(msg) => SynthesisError::Format(format!("{}: {}", source, msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, bytes) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_detect_format() {
        let dir = TempDir::new().unwrap();
        assert_eq!(VoiceFormat::detect(dir.path(), &[]), VoiceFormat::Directory);

        let file = dir.path().join("voices.npz");
        assert_eq!(VoiceFormat::detect(&file, b"PK"), VoiceFormat::Archive);
        assert_eq!(
            VoiceFormat::detect(&file, &[0x00, 0x00]),
            VoiceFormat::FlatBinary
        );
    }

    #[test]
    fn test_zip_archive_roundtrip_and_width_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("voices.npz");
        write_zip(
            &path,
            &[
                ("af_bella.npy", npy::encode_f32(&[8], &ramp(8))),
                ("am_adam.npy", npy::encode_f32(&[2], &ramp(2))),
                ("nested/bf_emma.npy", npy::encode_f32(&[3, 4], &ramp(12))),
                ("README.txt", b"not a voice".to_vec()),
            ],
        );

        let store = VoiceEmbeddingStore::open(&path, 4).unwrap();
        assert_eq!(store.len(), 3);

        // Longer vectors are truncated.
        assert_eq!(store.get("af_bella").unwrap().vector, vec![0.0, 1.0, 2.0, 3.0]);
        // Shorter vectors pass through unchanged.
        assert_eq!(store.get("am_adam").unwrap().vector, vec![0.0, 1.0]);
        // (rows, dim) arrays keep their first row.
        assert_eq!(store.get("bf_emma").unwrap().vector, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_get_consistent_with_list() {
        let dir = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(
                dir.path().join(format!("{}.npy", name)),
                npy::encode_f32(&[4], &ramp(4)),
            )
            .unwrap();
        }
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let store = VoiceEmbeddingStore::open(dir.path(), 4).unwrap();
        let names = store.list();
        assert_eq!(names.len(), 3);
        for name in &names {
            assert!(store.get(name).is_ok(), "listed voice {} must resolve", name);
        }
        for missing in ["d", "", "A"] {
            assert!(!names.contains(missing));
            assert!(matches!(
                store.get(missing),
                Err(SynthesisError::VoiceNotFound(_))
            ));
        }
    }

    #[test]
    fn test_f16_voice_file_is_widened() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("half.npy"),
            npy::encode_f16_bits(&[4], &[0x3c00, 0xc000, 0x0000, 0x7bff]),
        )
        .unwrap();

        let store = VoiceEmbeddingStore::from_dir(dir.path(), 4).unwrap();
        assert_eq!(
            store.get("half").unwrap().vector,
            vec![1.0, -2.0, 0.0, 65504.0]
        );
    }

    #[test]
    fn test_flat_binary_indexed_by_position() {
        let mut bytes = Vec::new();
        for i in 0..8 {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }
        bytes.extend_from_slice(&[0xff, 0xff]); // partial trailing vector

        let store = VoiceEmbeddingStore::from_flat_bin(&bytes, 4, None).unwrap();
        assert_eq!(store.get("voice_0").unwrap().vector, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(store.get("voice_1").unwrap().vector, vec![4.0, 5.0, 6.0, 7.0]);

        let names = vec!["expr-voice-2-f".to_string(), "expr-voice-2-m".to_string()];
        let named = VoiceEmbeddingStore::from_flat_bin(&bytes, 4, Some(&names)).unwrap();
        assert_eq!(named.get("expr-voice-2-m").unwrap().vector[0], 4.0);
    }

    #[test]
    fn test_flat_binary_too_small() {
        let result = VoiceEmbeddingStore::from_flat_bin(&[0u8; 8], 4, None);
        assert!(matches!(result, Err(SynthesisError::Format(_))));
    }

    #[test]
    fn test_malformed_npy_is_format_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.npy"), b"\x93NUMPX\x01\x00").unwrap();
        let result = VoiceEmbeddingStore::from_dir(dir.path(), 4);
        assert!(matches!(result, Err(SynthesisError::Format(_))));
    }

    #[test]
    fn test_missing_path_is_io_error() {
        let result = VoiceEmbeddingStore::open("/nonexistent/voices.npz", 256);
        assert!(matches!(result, Err(SynthesisError::Io(_))));
    }
}
