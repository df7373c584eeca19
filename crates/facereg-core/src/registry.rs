//! Known-face registry backed by a flat directory of reference images.
//!
//! The directory is the source of truth: one image per identity, the filename
//! stem is the identity name. The in-memory entry set is a cache rebuilt from
//! it on demand and published atomically behind a read-write lock.

use crate::provider::{FaceEmbeddingProvider, ProviderError};
use crate::types::{Embedding, EuclideanMatcher, IdentityMatch, KnownFace, Matcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Image extensions accepted in the known-faces directory (compared lowercase).
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tiff", "webp"];

/// Maximum embedding distance for two faces to be the same identity.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("multiple faces detected ({0}); the image must contain exactly one face")]
    MultipleFacesDetected(usize),
    #[error("name already exists: {0}")]
    DuplicateName(String),
    #[error("face file not found: {0}")]
    NotFound(String),
    #[error("name has no usable characters")]
    InvalidName,
    #[error("unsupported image type \"{0}\"; allowed: png, jpg, jpeg, bmp, tiff, webp")]
    InvalidFileType(String),
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("storage: {0}")]
    Storage(#[from] io::Error),
    #[error("embedding provider: {0}")]
    Provider(#[from] ProviderError),
}

/// What to do when a reference photo contains more than one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiFacePolicy {
    /// Refuse the upload.
    #[default]
    Reject,
    /// Register the first detected face.
    UseFirst,
}

impl FromStr for MultiFacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "use_first" | "use-first" => Ok(Self::UseFirst),
            other => Err(format!("unknown multiple-faces policy \"{other}\" (expected reject or use_first)")),
        }
    }
}

impl fmt::Display for MultiFacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reject => "reject",
            Self::UseFirst => "use_first",
        })
    }
}

/// One reference image as it exists on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownFile {
    pub name: String,
    pub filename: String,
}

/// In-memory set of known faces plus the directory it is rebuilt from.
pub struct FaceRegistry {
    dir: PathBuf,
    tolerance: f32,
    entries: RwLock<Vec<KnownFace>>,
}

impl FaceRegistry {
    /// An empty registry over `dir`. Nothing is read until [`rebuild`](Self::rebuild).
    pub fn new(dir: impl Into<PathBuf>, tolerance: f32) -> Self {
        Self {
            dir: dir.into(),
            tolerance,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Reload every reference image and publish the result as the new entry set.
    ///
    /// Creates the directory if it is missing. Files that cannot be read, do
    /// not decode, or contain no face are logged and skipped. On error the
    /// previously published set stays in place. Returns the number of entries.
    pub fn rebuild(&self, provider: &mut dyn FaceEmbeddingProvider) -> Result<usize, RegistryError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            tracing::info!(dir = %self.dir.display(), "created known-faces directory");
            self.publish(Vec::new());
            return Ok(0);
        }

        let mut entries: Vec<KnownFace> = Vec::new();
        for file in self.list_known_files()? {
            let path = self.dir.join(&file.filename);
            let embedding = match load_reference(provider, &path) {
                Ok(Some(embedding)) => embedding,
                Ok(None) => {
                    tracing::warn!(file = %file.filename, "no face found in reference image; skipping");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(file = %file.filename, error = %err, "failed to load reference image; skipping");
                    continue;
                }
            };

            if let Some(first) = entries.first() {
                if first.embedding.dim() != embedding.dim() {
                    tracing::warn!(
                        file = %file.filename,
                        expected = first.embedding.dim(),
                        got = embedding.dim(),
                        "embedding dimension mismatch; skipping"
                    );
                    continue;
                }
            }

            entries.push(KnownFace {
                name: file.name,
                filename: file.filename,
                embedding,
            });
        }

        if entries.is_empty() {
            tracing::warn!(
                dir = %self.dir.display(),
                "no usable reference faces; every detected face will be reported as unknown"
            );
        }

        let count = entries.len();
        self.publish(entries);
        tracing::info!(count, "registry rebuilt");
        Ok(count)
    }

    /// Resolve a query embedding against the published entries.
    pub fn match_embedding(&self, probe: &Embedding) -> IdentityMatch {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        EuclideanMatcher.compare(probe, &entries, self.tolerance)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the published entries, in registry order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Copy of the published entries.
    pub fn snapshot(&self) -> Vec<KnownFace> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Reference images currently on disk, sorted by filename.
    ///
    /// Reads the directory, not the cache, so it can run ahead of the
    /// registry between a write and the following rebuild.
    pub fn list_known_files(&self) -> Result<Vec<KnownFile>, RegistryError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if filename.starts_with('.') || allowed_extension(&filename).is_none() {
                continue;
            }
            if !entry.path().is_file() {
                continue;
            }
            files.push(KnownFile {
                name: file_stem(&filename),
                filename,
            });
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// Validate and store a new reference photo, then rebuild.
    ///
    /// Nothing is written unless the image decodes and passes the face-count
    /// check. Names collide case-insensitively regardless of extension.
    /// Returns the stored filename.
    pub fn register(
        &self,
        provider: &mut dyn FaceEmbeddingProvider,
        name: &str,
        original_filename: &str,
        bytes: &[u8],
        policy: MultiFacePolicy,
    ) -> Result<String, RegistryError> {
        let stem = sanitize_name(name).ok_or(RegistryError::InvalidName)?;
        let ext = allowed_extension(original_filename).ok_or_else(|| {
            RegistryError::InvalidFileType(
                Path::new(original_filename)
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        })?;

        if self
            .list_known_files()?
            .iter()
            .any(|f| f.name.eq_ignore_ascii_case(&stem))
        {
            return Err(RegistryError::DuplicateName(stem));
        }

        let image = image::load_from_memory(bytes)?;
        let embeddings = provider.encode_single(&image)?;
        match (embeddings.len(), policy) {
            (0, _) => return Err(RegistryError::NoFaceDetected),
            (1, _) => {}
            (n, MultiFacePolicy::Reject) => return Err(RegistryError::MultipleFacesDetected(n)),
            (n, MultiFacePolicy::UseFirst) => {
                tracing::warn!(name = %stem, faces = n, "multiple faces in reference photo; using the first");
            }
        }

        let filename = format!("{stem}.{ext}");
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(&filename), bytes)?;
        tracing::info!(name = %stem, file = %filename, bytes = bytes.len(), "registered face");

        self.rebuild(provider)?;
        Ok(filename)
    }

    /// Remove a reference image and rebuild.
    pub fn delete(&self, provider: &mut dyn FaceEmbeddingProvider, filename: &str) -> Result<(), RegistryError> {
        if !is_plain_filename(filename) {
            return Err(RegistryError::InvalidFilename(filename.to_string()));
        }

        let path = self.dir.join(filename);
        if !path.is_file() {
            return Err(RegistryError::NotFound(filename.to_string()));
        }

        fs::remove_file(&path)?;
        tracing::info!(file = %filename, "deleted face");

        self.rebuild(provider)?;
        Ok(())
    }

    fn publish(&self, entries: Vec<KnownFace>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }
}

/// First embedding found in the image at `path`, if any.
fn load_reference(
    provider: &mut dyn FaceEmbeddingProvider,
    path: &Path,
) -> Result<Option<Embedding>, RegistryError> {
    let bytes = fs::read(path)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(provider.encode_single(&image)?.into_iter().next())
}

/// Lowercased extension of `filename` if it is an allowed image type.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Turn a display name into a filename-safe stem.
///
/// Whitespace runs become `_`; anything but ASCII alphanumerics, `-`, `_`
/// and `.` is dropped; leading and trailing `.`/`_` are trimmed.
pub fn sanitize_name(name: &str) -> Option<String> {
    let joined = name.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// A single normal path component: no separators, no `.`/`..`.
fn is_plain_filename(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !filename.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{face_png, write_face, FakeProvider};
    use crate::types::Identity;

    fn registry(dir: &Path) -> FaceRegistry {
        FaceRegistry::new(dir, DEFAULT_TOLERANCE)
    }

    #[test]
    fn test_rebuild_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("faces");
        let reg = registry(&dir);

        assert_eq!(reg.rebuild(&mut FakeProvider).unwrap(), 0);
        assert!(dir.is_dir());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_rebuild_filters_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write_face(dir, "bob.jpg", [200, 0, 0], 1);
        write_face(dir, "carol.PNG", [0, 200, 0], 1);
        write_face(dir, ".hidden.png", [0, 0, 200], 1);
        write_face(dir, "nobody.png", [0, 0, 200], 0);
        fs::write(dir.join("notes.txt"), b"not an image").unwrap();
        fs::write(dir.join("corrupt.png"), b"definitely not a png").unwrap();
        fs::create_dir(dir.join("nested.png")).unwrap();

        let reg = registry(dir);
        assert_eq!(reg.rebuild(&mut FakeProvider).unwrap(), 2);
        assert_eq!(reg.names(), vec!["bob".to_string(), "carol".to_string()]);

        // Skipped files are left untouched on disk.
        assert!(dir.join("nobody.png").exists());
        assert!(dir.join("corrupt.png").exists());
    }

    #[test]
    fn test_rebuild_uses_first_face() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "pair.png", [100, 0, 0], 2);

        let reg = registry(tmp.path());
        reg.rebuild(&mut FakeProvider).unwrap();
        let entries = reg.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].embedding, FakeProvider::embedding_for([100, 0, 0], 0));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "zed.png", [10, 20, 30], 1);
        write_face(tmp.path(), "amy.bmp", [30, 20, 10], 1);

        let reg = registry(tmp.path());
        reg.rebuild(&mut FakeProvider).unwrap();
        let first = reg.snapshot();
        reg.rebuild(&mut FakeProvider).unwrap();
        assert_eq!(first, reg.snapshot());
        assert_eq!(reg.names(), vec!["amy".to_string(), "zed".to_string()]);
    }

    #[test]
    fn test_rebuild_keeps_duplicate_stems() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "alice.jpg", [10, 0, 0], 1);
        write_face(tmp.path(), "alice.png", [0, 10, 0], 1);

        let reg = registry(tmp.path());
        assert_eq!(reg.rebuild(&mut FakeProvider).unwrap(), 2);
        assert_eq!(reg.names(), vec!["alice".to_string(), "alice".to_string()]);
    }

    #[test]
    fn test_rebuild_replaces_previous_set() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "bob.png", [200, 0, 0], 1);

        let reg = registry(tmp.path());
        reg.rebuild(&mut FakeProvider).unwrap();
        assert_eq!(reg.len(), 1);

        fs::remove_file(tmp.path().join("bob.png")).unwrap();
        reg.rebuild(&mut FakeProvider).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_match_empty_registry_is_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let result = reg.match_embedding(&Embedding::new(vec![0.0, 0.0, 0.0]));
        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_bob_and_carol_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "bob.jpg", [200, 0, 0], 1);
        write_face(tmp.path(), "carol.png", [0, 200, 0], 1);

        let reg = registry(tmp.path());
        reg.rebuild(&mut FakeProvider).unwrap();
        assert_eq!(reg.names(), vec!["bob".to_string(), "carol".to_string()]);

        let close_to_bob = FakeProvider::embedding_for([180, 0, 0], 0);
        let result = reg.match_embedding(&close_to_bob);
        assert_eq!(result.identity.name(), "bob");
        assert!(result.confidence > 0.4);

        let stranger = FakeProvider::embedding_for([0, 0, 255], 0);
        let result = reg.match_embedding(&stranger);
        assert_eq!(result.identity.name(), "unknown");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_register_then_list_then_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let mut provider = FakeProvider;

        let filename = reg
            .register(&mut provider, "alice", "Photo.JPG", &face_png([50, 50, 50], 1), MultiFacePolicy::Reject)
            .unwrap();
        assert_eq!(filename, "alice.jpg");
        assert_eq!(reg.names(), vec!["alice".to_string()]);
        let listed = reg.list_known_files().unwrap();
        assert_eq!(listed, vec![KnownFile { name: "alice".into(), filename: "alice.jpg".into() }]);

        reg.delete(&mut provider, "alice.jpg").unwrap();
        assert!(reg.list_known_files().unwrap().is_empty());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_register_without_face_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "bob.png", [200, 0, 0], 1);
        let reg = registry(tmp.path());
        reg.rebuild(&mut FakeProvider).unwrap();
        let before = reg.snapshot();

        let err = reg
            .register(&mut FakeProvider, "ghost", "ghost.png", &face_png([1, 2, 3], 0), MultiFacePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoFaceDetected));
        assert_eq!(reg.list_known_files().unwrap().len(), 1);
        assert!(!tmp.path().join("ghost.png").exists());
        assert_eq!(reg.snapshot(), before);
    }

    #[test]
    fn test_register_multiple_faces_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let group = face_png([90, 90, 90], 3);

        let err = reg
            .register(&mut FakeProvider, "group", "group.png", &group, MultiFacePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RegistryError::MultipleFacesDetected(3)));
        assert!(err.to_string().starts_with("multiple faces detected"));
        assert!(reg.list_known_files().unwrap().is_empty());

        let filename = reg
            .register(&mut FakeProvider, "group", "group.png", &group, MultiFacePolicy::UseFirst)
            .unwrap();
        assert_eq!(filename, "group.png");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_rejects_duplicate_name_across_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "alice.png", [10, 10, 10], 1);
        let reg = registry(tmp.path());

        let err = reg
            .register(&mut FakeProvider, "Alice", "a.jpg", &face_png([20, 20, 20], 1), MultiFacePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(ref n) if n == "Alice"));
        assert_eq!(err.to_string(), "name already exists: Alice");
        assert!(!tmp.path().join("Alice.jpg").exists());
    }

    #[test]
    fn test_register_validates_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let png = face_png([20, 20, 20], 1);

        let err = reg
            .register(&mut FakeProvider, "dave", "dave.gif", &png, MultiFacePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidFileType(ref e) if e == "gif"));

        let err = reg
            .register(&mut FakeProvider, "../..", "x.png", &png, MultiFacePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName));

        let err = reg
            .register(&mut FakeProvider, "dave", "dave.png", b"garbage bytes", MultiFacePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Decode(_)));
        assert!(reg.list_known_files().unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_and_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());

        assert!(matches!(
            reg.delete(&mut FakeProvider, "nobody.png").unwrap_err(),
            RegistryError::NotFound(_)
        ));
        for bad in ["../etc/passwd", "a/b.png", "..", "", "."] {
            assert!(
                matches!(reg.delete(&mut FakeProvider, bad).unwrap_err(), RegistryError::InvalidFilename(_)),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_list_known_files_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(&tmp.path().join("absent"));
        assert!(reg.list_known_files().unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("alice").as_deref(), Some("alice"));
        assert_eq!(sanitize_name("  Mary  Jane ").as_deref(), Some("Mary_Jane"));
        assert_eq!(sanitize_name("../../etc/passwd").as_deref(), Some("etcpasswd"));
        assert_eq!(sanitize_name("o'brien-2").as_deref(), Some("obrien-2"));
        assert_eq!(sanitize_name("..."), None);
        assert_eq!(sanitize_name(""), None);
    }

    #[test]
    fn test_allowed_extension() {
        assert_eq!(allowed_extension("a.JPEG").as_deref(), Some("jpeg"));
        assert_eq!(allowed_extension("a.tiff").as_deref(), Some("tiff"));
        assert_eq!(allowed_extension("a.gif"), None);
        assert_eq!(allowed_extension("png"), None);
    }

    #[test]
    fn test_multi_face_policy_parse() {
        assert_eq!("reject".parse::<MultiFacePolicy>().unwrap(), MultiFacePolicy::Reject);
        assert_eq!("USE_FIRST".parse::<MultiFacePolicy>().unwrap(), MultiFacePolicy::UseFirst);
        assert!("sometimes".parse::<MultiFacePolicy>().is_err());
        assert_eq!(MultiFacePolicy::UseFirst.to_string(), "use_first");
    }

    /// Fails on reference images whose top-left pixel is `poison`.
    struct FailingProvider {
        poison: [u8; 3],
    }

    impl FaceEmbeddingProvider for FailingProvider {
        fn detect_and_encode(
            &mut self,
            image: &image::DynamicImage,
        ) -> Result<Vec<crate::types::DetectedFace>, ProviderError> {
            let px = image::GenericImageView::get_pixel(image, 0, 0);
            if [px[0], px[1], px[2]] == self.poison {
                return Err(ProviderError::Detector(crate::detector::DetectorError::InferenceFailed(
                    "session aborted".into(),
                )));
            }
            FakeProvider.detect_and_encode(image)
        }
    }

    #[test]
    fn test_rebuild_skips_provider_failure() {
        let tmp = tempfile::tempdir().unwrap();
        write_face(tmp.path(), "alice.png", [10, 200, 10], 1);
        write_face(tmp.path(), "bob.png", [66, 66, 66], 1);
        write_face(tmp.path(), "carol.png", [10, 10, 200], 1);
        let reg = registry(tmp.path());

        let mut provider = FailingProvider { poison: [66, 66, 66] };
        assert_eq!(reg.rebuild(&mut provider).unwrap(), 2);
        assert_eq!(reg.names(), vec!["alice".to_string(), "carol".to_string()]);
    }

    #[test]
    fn test_readers_never_see_partial_rebuild() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const FACES: usize = 12;
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..FACES {
            write_face(tmp.path(), &format!("person{i:02}.png"), [i as u8 * 20, 40, 90], 1);
        }
        let reg = registry(tmp.path());
        assert_eq!(reg.rebuild(&mut FakeProvider).unwrap(), FACES);

        let done = AtomicBool::new(false);
        std::thread::scope(|s| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let mut reads = 0usize;
                        loop {
                            assert_eq!(reg.len(), FACES);
                            assert_eq!(reg.snapshot().len(), FACES);
                            reads += 1;
                            if done.load(Ordering::Acquire) {
                                return reads;
                            }
                        }
                    })
                })
                .collect();

            for _ in 0..20 {
                assert_eq!(reg.rebuild(&mut FakeProvider).unwrap(), FACES);
            }
            done.store(true, Ordering::Release);

            for reader in readers {
                assert!(reader.join().unwrap() > 0);
            }
        });
    }
}
