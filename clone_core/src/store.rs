//! Flat directories holding voice samples and generated artifacts.

use std::{
    io,
    path::{Component, Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::{fs, io::AsyncWriteExt};

use crate::naming;

/// Directory of uploaded voice samples.
#[derive(Debug, Clone)]
pub struct VoiceStore {
    dir: PathBuf,
}

impl VoiceStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a new sample for `user_id` and return its path.
    pub async fn save(&self, user_id: &str, ext: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(naming::sample_file_name(user_id, ext));
        write_new(&path, bytes).await?;
        Ok(path)
    }

    /// File names of every sample owned by `user_id`, sorted ascending.
    pub async fn samples_for(&self, user_id: &str) -> io::Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if naming::sample_owner(&name) == Some(user_id) {
                names.push(name);
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    /// The sample whose name sorts last, which is the newest one.
    pub async fn latest_sample(&self, user_id: &str) -> io::Result<Option<PathBuf>> {
        let mut names = self.samples_for(user_id).await?;
        Ok(names.pop().map(|name| self.dir.join(name)))
    }

    pub async fn prune_older_than(&self, max_age: Duration) -> io::Result<usize> {
        prune_dir(&self.dir, max_age).await
    }
}

/// Directory of generated artifacts served by file name.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh artifact name for `user_id`. Nothing is written yet.
    pub fn allocate(&self, user_id: &str) -> (String, PathBuf) {
        let file_name = naming::artifact_file_name(user_id);
        let path = self.dir.join(&file_name);
        (file_name, path)
    }

    /// Path of an existing artifact. Names that are not a single plain path
    /// component never resolve.
    pub async fn locate(&self, file_name: &str) -> io::Result<Option<PathBuf>> {
        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Ok(None),
        }
        let path = self.dir.join(file_name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn prune_older_than(&self, max_age: Duration) -> io::Result<usize> {
        prune_dir(&self.dir, max_age).await
    }
}

/// An artifact path reserved for one synthesis. Dropping it deletes whatever
/// was written there unless [`PendingArtifact::keep`] was called first.
#[derive(Debug)]
pub struct PendingArtifact {
    path: PathBuf,
    keep: bool,
}

impl PendingArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file and hand back its path.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        // synchronous: drop may run while the owning future is being cancelled
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    // create_new: two writers can never share a name
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;
    if written.is_err() {
        drop(file);
        let _ = fs::remove_file(path).await;
    }
    written
}

/// Delete regular files in `dir` last modified more than `max_age` ago.
async fn prune_dir(dir: &Path, max_age: Duration) -> io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) {
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_list_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = VoiceStore::open(dir.path().join("voices")).unwrap();

        let first = store.save("alice", ".wav", b"one").await.unwrap();
        let second = store.save("alice", ".mp3", b"two").await.unwrap();
        store.save("bob", ".wav", b"three").await.unwrap();

        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        let names = store.samples_for("alice").await.unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.starts_with("alice_")));

        let latest = store.latest_sample("alice").await.unwrap().unwrap();
        assert_eq!(latest, second);
    }

    #[tokio::test]
    async fn test_latest_sample_is_scoped_to_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = VoiceStore::open(dir.path()).unwrap();
        store.save("alice_bob", ".wav", b"x").await.unwrap();
        std::fs::write(dir.path().join("alice_notes.txt"), b"x").unwrap();

        assert!(store.latest_sample("alice").await.unwrap().is_none());
        assert!(store.latest_sample("alice_bob").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_locate_only_resolves_plain_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::open(dir.path().join("cloned")).unwrap();
        let (name, path) = store.allocate("alice");
        std::fs::write(&path, b"RIFF").unwrap();

        assert_eq!(store.locate(&name).await.unwrap(), Some(path));
        assert_eq!(store.locate("missing.wav").await.unwrap(), None);
        assert_eq!(store.locate("../cloned").await.unwrap(), None);
        assert_eq!(store.locate("/etc/passwd").await.unwrap(), None);
        assert_eq!(store.locate("").await.unwrap(), None);
    }

    #[test]
    fn test_pending_artifact_removed_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::open(dir.path()).unwrap();

        let (_, dropped) = store.allocate("alice");
        let pending = PendingArtifact::new(dropped.clone());
        std::fs::write(pending.path(), b"RIFFpartial").unwrap();
        drop(pending);
        assert!(!dropped.exists());

        let (_, kept) = store.allocate("alice");
        let pending = PendingArtifact::new(kept.clone());
        std::fs::write(pending.path(), b"RIFF").unwrap();
        assert_eq!(pending.keep(), kept);
        assert!(kept.exists());

        // nothing written is fine too
        let (_, never) = store.allocate("alice");
        drop(PendingArtifact::new(never));
    }

    #[tokio::test]
    async fn test_prune_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::open(dir.path()).unwrap();
        let (_, path) = store.allocate("alice");
        std::fs::write(&path, b"RIFF").unwrap();

        assert_eq!(store.prune_older_than(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(path.exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.prune_older_than(Duration::from_millis(1)).await.unwrap(), 1);
        assert!(!path.exists());
    }
}
