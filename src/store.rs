//! Collection store.
//! Setter mode keeps the whole collection in one local slot file that is
//! rewritten in full on every save. Viewer mode fetches the published
//! climbs.json (cache bypassed) and has no write path at all.
//! Corrupt or missing data always degrades to an empty collection.

use anyhow::{Context, Result};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::climb::{ClimbRecord, Point, default_image_path, normalize, now_millis};
use crate::config::{Config, Mode};

// *************** Encoding ***************

/// Decodes a stored/published document. `None` unless it is a JSON array.
pub fn decode_collection(text: &str) -> Option<Vec<ClimbRecord>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Some(items.iter().map(normalize).collect()),
        _ => None,
    }
}

/// Compact canonical encoding, the exact bytes written to the local slot.
pub fn encode_collection(climbs: &[ClimbRecord]) -> Result<String> {
    serde_json::to_string(climbs).context("Failed to encode climbs")
}

/// 2-space pretty encoding used for publishing.
pub fn export_pretty(climbs: &[ClimbRecord]) -> Result<String> {
    serde_json::to_string_pretty(climbs).context("Failed to encode climbs for export")
}

// *************** Collection operations ***************

/// Replaces the first climb with the same id, else appends. Returns true on replace.
pub fn upsert(climbs: &mut Vec<ClimbRecord>, record: ClimbRecord) -> bool {
    match climbs.iter_mut().find(|c| c.id == record.id) {
        Some(existing) => {
            *existing = record;
            true
        }
        None => {
            climbs.push(record);
            false
        }
    }
}

/// Removes every climb with `id`, returning how many went.
pub fn delete(climbs: &mut Vec<ClimbRecord>, id: &str) -> usize {
    let before = climbs.len();
    climbs.retain(|c| c.id != id);
    before - climbs.len()
}

/// Seed climb written into an empty local slot.
pub fn example_climb(created_at: i64) -> ClimbRecord {
    let id = "p001";
    ClimbRecord {
        name: "Example: Warmup".into(),
        grade: "V2".into(),
        first_ascent: "You".into(),
        image: default_image_path(id),
        start: vec![Point::new(0.25, 0.2).into()],
        mid: vec![Point::new(0.55, 0.45).into()],
        finish: vec![Point::new(0.75, 0.3).into()],
        foot: vec![Point::new(0.3, 0.75).into()],
        ..ClimbRecord::blank(id, created_at)
    }
}

// *************** Local slot (setter) ***************

/// Persistent key-value slot holding the full collection as one JSON array.
#[derive(Debug, Clone)]
pub struct LocalSlot {
    path: PathBuf,
}

impl LocalSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Normalized contents; empty if absent, unreadable, corrupt or not an array.
    pub fn load(&self) -> Vec<ClimbRecord> {
        self.load_with_raw().0
    }

    fn load_with_raw(&self) -> (Vec<ClimbRecord>, Option<String>) {
        let Some(raw) = self.read_raw() else {
            return (Vec::new(), None);
        };
        match decode_collection(&raw) {
            Some(climbs) => (climbs, Some(raw)),
            None => {
                log::warn!("Local slot {} is not a JSON array, treating as empty", self.path.display());
                (Vec::new(), Some(raw))
            }
        }
    }

    fn read_raw(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.is_empty() => None,
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("Failed to read local slot {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Overwrites the slot with the full collection (temp file + rename).
    pub fn save(&self, climbs: &[ClimbRecord]) -> Result<()> {
        let encoded = encode_collection(climbs)?;
        self.write_raw(&encoded)
    }

    fn write_raw(&self, encoded: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create storage directory {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encoded).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace local slot {}", self.path.display()))
    }
}

// *************** Published source (viewer) ***************

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to load {url}: {status}")]
    Status { url: Url, status: StatusCode },
    #[error("Request for {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to read {url}: {source}")]
    Io {
        url: Url,
        #[source]
        source: std::io::Error,
    },
    #[error("{url} is not valid JSON: {source}")]
    Decode {
        url: Url,
        #[source]
        source: serde_json::Error,
    },
    #[error("{url} is not an array")]
    NotArray { url: Url },
}

/// Read-only published climbs.json. `file:` URLs are read from disk.
#[derive(Debug, Clone)]
pub struct PublishedSource {
    url: Url,
    client: Client,
}

impl PublishedSource {
    pub fn new(url: Url) -> Result<Self> {
        // No timeout: a hung fetch stalls boot, same as the browser.
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn load(&self) -> Result<Vec<ClimbRecord>, FetchError> {
        let body = self.fetch_text().await?;
        let value: Value = serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: self.url.clone(),
            source,
        })?;
        match value {
            Value::Array(items) => Ok(items.iter().map(normalize).collect()),
            _ => Err(FetchError::NotArray { url: self.url.clone() }),
        }
    }

    async fn fetch_text(&self) -> Result<String, FetchError> {
        if self.url.scheme() == "file" {
            let path = self.url.to_file_path().map_err(|_| FetchError::Io {
                url: self.url.clone(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "not a local path"),
            })?;
            return tokio::fs::read_to_string(&path).await.map_err(|source| FetchError::Io {
                url: self.url.clone(),
                source,
            });
        }

        let transport = |source: reqwest::Error| FetchError::Transport {
            url: self.url.clone(),
            source,
        };
        let response = self
            .client
            .get(self.url.clone())
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: response.status(),
            });
        }
        response.text().await.map_err(transport)
    }
}

// *************** Booted collections ***************

/// Editable collection backed by the local slot.
#[derive(Debug)]
pub struct SetterCollection {
    slot: LocalSlot,
    climbs: Vec<ClimbRecord>,
}

impl SetterCollection {
    /// Loads and normalizes the slot, seeds the example climb when empty, and
    /// rewrites the slot only if its bytes differ from the canonical encoding.
    pub fn boot(slot: LocalSlot) -> Self {
        let (mut climbs, raw) = slot.load_with_raw();
        if climbs.is_empty() {
            log::info!("Local slot {} is empty, seeding example climb", slot.path().display());
            climbs = vec![example_climb(now_millis())];
        }

        match encode_collection(&climbs) {
            Ok(encoded) if raw.as_deref() == Some(encoded.as_str()) => {}
            Ok(encoded) => {
                if let Err(e) = slot.write_raw(&encoded) {
                    log::error!("Failed to persist normalized climbs: {:#}", e);
                } else {
                    log::debug!("Rewrote normalized local slot ({} climbs)", climbs.len());
                }
            }
            Err(e) => log::error!("{:#}", e),
        }

        Self { slot, climbs }
    }

    pub fn climbs(&self) -> &[ClimbRecord] {
        &self.climbs
    }

    pub fn save_climb(&mut self, record: ClimbRecord) -> Result<()> {
        let id = record.id.clone();
        let replaced = upsert(&mut self.climbs, record);
        self.slot.save(&self.climbs)?;
        log::info!("{} climb {}", if replaced { "Updated" } else { "Added" }, id);
        Ok(())
    }

    pub fn delete_climb(&mut self, id: &str) -> Result<usize> {
        let removed = delete(&mut self.climbs, id);
        self.slot.save(&self.climbs)?;
        log::info!("Deleted {} climb(s) with id {}", removed, id);
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.climbs.clear();
        self.slot.save(&self.climbs)
    }
}

/// Read-only collection loaded from the published source.
#[derive(Debug)]
pub struct ViewerCollection {
    climbs: Vec<ClimbRecord>,
}

impl ViewerCollection {
    pub async fn boot(source: &PublishedSource) -> Self {
        let climbs = match source.load().await {
            Ok(climbs) => {
                log::info!("Loaded {} published climbs from {}", climbs.len(), source.url());
                climbs
            }
            Err(e) => {
                log::error!("{}", e);
                Vec::new()
            }
        };
        Self { climbs }
    }

    pub fn climbs(&self) -> &[ClimbRecord] {
        &self.climbs
    }
}

/// The collection for the mode resolved at startup. Only the setter variant
/// exposes mutation.
#[derive(Debug)]
pub enum Collection {
    Setter(SetterCollection),
    Viewer(ViewerCollection),
}

impl Collection {
    pub async fn boot(config: &Config, mode: Mode) -> Self {
        match mode {
            Mode::Setter => Collection::Setter(SetterCollection::boot(LocalSlot::new(config.slot_path()))),
            Mode::Viewer => {
                let source = config.published_url().and_then(PublishedSource::new);
                match source {
                    Ok(source) => Collection::Viewer(ViewerCollection::boot(&source).await),
                    Err(e) => {
                        log::error!("{:#}", e);
                        Collection::Viewer(ViewerCollection { climbs: Vec::new() })
                    }
                }
            }
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Collection::Setter(_) => Mode::Setter,
            Collection::Viewer(_) => Mode::Viewer,
        }
    }

    pub fn climbs(&self) -> &[ClimbRecord] {
        match self {
            Collection::Setter(c) => c.climbs(),
            Collection::Viewer(c) => c.climbs(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&ClimbRecord> {
        self.climbs().iter().find(|c| c.id == id)
    }

    /// Newest first, by `createdAt`.
    pub fn newest_first(&self) -> Vec<&ClimbRecord> {
        let mut sorted: Vec<&ClimbRecord> = self.climbs().iter().collect();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climb::normalize_at;
    use crate::editor::{Editor, ValidationError};
    use serde_json::json;

    fn climb(id: &str, name: &str, created_at: i64) -> ClimbRecord {
        ClimbRecord {
            name: name.into(),
            start: vec![Point::new(0.1, 0.1).into()],
            finish: vec![Point::new(0.9, 0.9).into()],
            ..ClimbRecord::blank(id, created_at)
        }
    }

    fn file_url(path: &Path) -> Url {
        Url::from_file_path(path).unwrap()
    }

    #[test]
    fn test_local_load_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LocalSlot::new(dir.path().join("slot.json"));
        assert!(slot.load().is_empty());

        fs::write(slot.path(), "{not json").unwrap();
        assert!(slot.load().is_empty());

        fs::write(slot.path(), r#"{"id": "p001"}"#).unwrap();
        assert!(slot.load().is_empty());

        fs::write(slot.path(), "").unwrap();
        assert!(slot.load().is_empty());
    }

    #[test]
    fn test_local_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LocalSlot::new(dir.path().join("nested").join("slot.json"));
        let climbs = vec![climb("a", "Arete", 2), example_climb(1)];
        slot.save(&climbs).unwrap();
        assert_eq!(slot.load(), climbs);
        assert!(!dir.path().join("nested").join("slot.json.tmp").exists());
    }

    #[test]
    fn test_decode_encode_round_trip() {
        let climbs: Vec<ClimbRecord> = [
            json!({"id": "x", "start": [{"x": 0.5, "y": 0.5}, "junk"], "angle": 45, "createdAt": 3}),
            json!({"id": "y", "name": "Roof", "grade": "V7", "createdAt": 4}),
        ]
        .iter()
        .map(|raw| normalize_at(raw, 10))
        .collect();
        let encoded = encode_collection(&climbs).unwrap();
        assert_eq!(decode_collection(&encoded).unwrap(), climbs);
        assert_eq!(decode_collection(&export_pretty(&climbs).unwrap()).unwrap(), climbs);
    }

    #[test]
    fn test_export_pretty_uses_two_space_indent() {
        let text = export_pretty(&[example_climb(1234567890123)]).unwrap();
        assert!(text.starts_with("[\n  {\n    \"id\": \"p001\",\n    \"name\": \"Example: Warmup\""));
        assert!(text.contains("\"image\": \"climb-images/p001.png\""));
        assert!(text.trim_end().ends_with("\"createdAt\": 1234567890123\n  }\n]"));
    }

    #[test]
    fn test_upsert_replaces_matching_id() {
        let mut climbs = vec![climb("a", "One", 1), climb("b", "Two", 2)];
        assert!(upsert(&mut climbs, climb("a", "One v2", 1)));
        assert_eq!(climbs.len(), 2);
        assert_eq!(climbs[0].name, "One v2");
        assert_eq!(climbs[1].name, "Two");
    }

    #[test]
    fn test_upsert_appends_new_id() {
        let mut climbs = vec![climb("a", "One", 1)];
        assert!(!upsert(&mut climbs, climb("c", "Three", 3)));
        assert_eq!(climbs.len(), 2);
        assert_eq!(climbs[1].id, "c");
    }

    #[test]
    fn test_delete_removes_every_match() {
        let mut climbs = vec![climb("a", "One", 1), climb("b", "Two", 2), climb("a", "Dup", 3)];
        assert_eq!(delete(&mut climbs, "a"), 2);
        assert_eq!(climbs.len(), 1);
        assert_eq!(delete(&mut climbs, "zzz"), 0);
    }

    #[test]
    fn test_setter_boot_seeds_example() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LocalSlot::new(dir.path().join("slot.json"));
        let collection = SetterCollection::boot(slot.clone());
        assert_eq!(collection.climbs().len(), 1);
        assert_eq!(collection.climbs()[0].id, "p001");
        assert_eq!(collection.climbs()[0].count_marks(), 4);
        assert_eq!(slot.load(), collection.climbs());
    }

    #[test]
    fn test_setter_boot_rewrites_legacy_slot() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LocalSlot::new(dir.path().join("slot.json"));
        fs::write(slot.path(), r#"[{"id": "old", "name": "Legacy", "createdAt": 77, "start": null}]"#).unwrap();

        let collection = SetterCollection::boot(slot.clone());
        let stored = fs::read_to_string(slot.path()).unwrap();
        assert_eq!(stored, encode_collection(collection.climbs()).unwrap());
        assert_eq!(collection.climbs()[0].image, "climb-images/old.png");
    }

    #[test]
    fn test_setter_boot_leaves_canonical_slot_alone() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LocalSlot::new(dir.path().join("slot.json"));
        let canonical = encode_collection(&[climb("a", "One", 1)]).unwrap();
        fs::write(slot.path(), &canonical).unwrap();

        let collection = SetterCollection::boot(slot.clone());
        assert_eq!(collection.climbs().len(), 1);
        assert_eq!(fs::read_to_string(slot.path()).unwrap(), canonical);
    }

    #[test]
    fn test_setter_save_delete_clear_persist() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LocalSlot::new(dir.path().join("slot.json"));
        let mut collection = SetterCollection::boot(slot.clone());

        collection.save_climb(climb("n1", "New", 5)).unwrap();
        assert_eq!(slot.load().len(), 2);

        collection.save_climb(climb("n1", "Renamed", 5)).unwrap();
        let stored = slot.load();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].name, "Renamed");

        assert_eq!(collection.delete_climb("p001").unwrap(), 1);
        assert_eq!(slot.load().len(), 1);

        collection.clear().unwrap();
        assert!(slot.load().is_empty());
        assert_eq!(fs::read_to_string(slot.path()).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_published_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climbs.json");
        fs::write(&path, export_pretty(&[example_climb(9)]).unwrap()).unwrap();

        let source = PublishedSource::new(file_url(&path)).unwrap();
        let climbs = source.load().await.unwrap();
        assert_eq!(climbs, vec![example_climb(9)]);
    }

    #[tokio::test]
    async fn test_published_load_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climbs.json");
        fs::write(&path, r#"{"climbs": []}"#).unwrap();

        let source = PublishedSource::new(file_url(&path)).unwrap();
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, FetchError::NotArray { .. }));
        assert!(err.to_string().ends_with("is not an array"));
    }

    #[tokio::test]
    async fn test_viewer_boot_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = PublishedSource::new(file_url(&dir.path().join("missing.json"))).unwrap();
        assert!(matches!(source.load().await, Err(FetchError::Io { .. })));
        assert!(ViewerCollection::boot(&source).await.climbs().is_empty());
    }

    #[tokio::test]
    async fn test_viewer_mode_never_persists() {
        let published = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        let published_text = export_pretty(&[example_climb(9)]).unwrap();
        fs::write(published.path().join("climbs.json"), &published_text).unwrap();

        let config = Config {
            host: Url::from_directory_path(published.path()).unwrap().to_string(),
            mode: Some(Mode::Viewer),
            storage_dir: storage.path().to_path_buf(),
            ..Config::default()
        };
        let mode = config.resolve_mode();
        let collection = Collection::boot(&config, mode).await;
        assert_eq!(collection.mode(), Mode::Viewer);
        assert_eq!(collection.climbs().len(), 1);

        let mut editor = Editor::new(mode);
        editor.load_into_draft(&collection.climbs()[0], false);
        assert!(editor.is_read_only());
        assert!(!editor.add_point(Point::new(0.5, 0.5)));
        editor.clear_all();
        assert_eq!(editor.draft().count_marks(), 4);
        assert_eq!(editor.commit(Default::default()), Err(ValidationError::ReadOnly));

        assert!(!config.slot_path().exists());
        assert_eq!(fs::read_dir(storage.path()).unwrap().count(), 0);
        assert_eq!(
            fs::read_to_string(published.path().join("climbs.json")).unwrap(),
            published_text
        );
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_published_load_over_http() {
        let source = PublishedSource::new(Url::parse("https://example.com/climbs.json").unwrap()).unwrap();
        let result = source.load().await;
        println!("Result: {:?}", result.map(|c| c.len()));
    }
}
