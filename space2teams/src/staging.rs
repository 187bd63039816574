use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::MigrationError;
use crate::models::{ChannelRecord, MessageRecord, STAGING_SCHEMA_VERSION, StagingManifest};

const MANIFEST_FILE: &str = "staging.json";
const CHANNEL_FILE: &str = "channel.json";
const MESSAGES_FILE: &str = "messages.json";

/// Local export of the source chat: one directory per channel id holding
/// `channel.json` and `messages.json`, plus a manifest at the root.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove everything staged so far.
    pub fn wipe(&self) -> Result<()> {
        if self.root.is_dir() {
            info!("Cleanup directory {}", self.root.display());
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to remove {}", self.root.display()))?;
        }
        Ok(())
    }

    pub fn write_manifest(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        write_json(&self.root.join(MANIFEST_FILE), &StagingManifest::current())
    }

    /// Refuse staging data written with another layout. Directories from
    /// before the manifest existed are accepted as the current version.
    pub fn check_manifest(&self) -> Result<()> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.exists() {
            warn!(
                "{} has no {}, assuming schema version {}",
                self.root.display(),
                MANIFEST_FILE,
                STAGING_SCHEMA_VERSION
            );
            return Ok(());
        }

        let manifest: StagingManifest = read_json(&path)?;
        if manifest.version != STAGING_SCHEMA_VERSION {
            return Err(MigrationError::StagingVersion {
                found: manifest.version,
                expected: STAGING_SCHEMA_VERSION,
            }
            .into());
        }

        Ok(())
    }

    fn slot(&self, channel_id: &str) -> PathBuf {
        self.root.join(channel_id)
    }

    /// Create the channel's directory and write its metadata.
    pub fn create_slot(&self, channel: &ChannelRecord) -> Result<()> {
        let slot = self.slot(&channel.id);
        fs::create_dir_all(&slot)
            .with_context(|| format!("Failed to create {}", slot.display()))?;
        write_json(&slot.join(CHANNEL_FILE), channel)
    }

    pub fn write_messages(&self, channel_id: &str, messages: &[MessageRecord]) -> Result<()> {
        write_json(&self.slot(channel_id).join(MESSAGES_FILE), &messages)
    }

    pub fn remove_slot(&self, channel_id: &str) -> Result<()> {
        let slot = self.slot(channel_id);
        if slot.is_dir() {
            fs::remove_dir_all(&slot)
                .with_context(|| format!("Failed to remove {}", slot.display()))?;
        }
        Ok(())
    }

    pub fn has_slot(&self, channel_id: &str) -> bool {
        self.slot(channel_id).join(CHANNEL_FILE).is_file()
    }

    /// Metadata of every staged channel, in directory name order.
    pub fn load_channels(&self) -> Result<Vec<ChannelRecord>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read staging directory {}", self.root.display()))?;

        let mut slots: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        slots.sort();

        let mut channels = Vec::with_capacity(slots.len());
        for slot in slots {
            let path = slot.join(CHANNEL_FILE);
            if !path.is_file() {
                warn!("Ignoring {} without {}", slot.display(), CHANNEL_FILE);
                continue;
            }
            channels.push(read_json(&path)?);
        }

        Ok(channels)
    }

    /// Messages of one channel, oldest first. A channel staged without
    /// messages has none.
    pub fn load_messages(&self, channel_id: &str) -> Result<Vec<MessageRecord>> {
        let path = self.slot(channel_id).join(MESSAGES_FILE);
        if !path.exists() {
            warn!("{} does not exist", path.display());
            return Ok(vec![]);
        }
        read_json(&path)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;

    fn channel(id: &str, name: &str) -> ChannelRecord {
        ChannelRecord {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            created: 1_600_000_000_000,
            total_messages: 1,
        }
    }

    fn message(text: &str) -> MessageRecord {
        MessageRecord {
            author: Author {
                name: "Jane".to_string(),
                details: None,
            },
            created: 1_600_000_000_000,
            text: text.to_string(),
            archived: false,
        }
    }

    #[test]
    fn test_slot_round_trip_keeps_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(temp_dir.path().join("channels"));

        store.write_manifest().unwrap();
        store.create_slot(&channel("b", "eng-backend")).unwrap();
        store
            .write_messages("b", &[message("first"), message("second")])
            .unwrap();
        store.create_slot(&channel("a", "general")).unwrap();

        let channels = store.load_channels().unwrap();
        assert_eq!(
            channels.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let messages = store.load_messages("b").unwrap();
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].text, "second");
        assert!(store.load_messages("a").unwrap().is_empty());
    }

    #[test]
    fn test_files_are_pretty_printed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(temp_dir.path().to_path_buf());
        store.create_slot(&channel("a", "general")).unwrap();

        let content = fs::read_to_string(temp_dir.path().join("a").join(CHANNEL_FILE)).unwrap();
        assert!(content.contains("\n  \"name\": \"general\""));
    }

    #[test]
    fn test_wipe_and_remove_slot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(temp_dir.path().join("channels"));
        store.create_slot(&channel("a", "general")).unwrap();
        store.create_slot(&channel("b", "random")).unwrap();

        store.remove_slot("a").unwrap();
        assert!(!store.has_slot("a"));
        assert!(store.has_slot("b"));

        store.wipe().unwrap();
        assert!(!store.root().exists());
    }

    #[test]
    fn test_manifest_version_is_checked() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(temp_dir.path().to_path_buf());

        // no manifest yet
        store.check_manifest().unwrap();

        store.write_manifest().unwrap();
        store.check_manifest().unwrap();

        fs::write(
            temp_dir.path().join(MANIFEST_FILE),
            r#"{"version": 99, "exportedAt": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let error = store.check_manifest().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<MigrationError>(),
            Some(MigrationError::StagingVersion { found: 99, .. })
        ));
    }
}
