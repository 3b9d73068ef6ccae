//! Per-guild persistent settings: the monitored channel and the block list.
//!
//! Both maps are loaded once at startup and written back on every change.
//! Files are small pretty-printed JSON documents keyed by guild id.

use crate::error::{Result, StoreError};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, GuildId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct GuildData {
    channels: HashMap<GuildId, ChannelId>,
    blocked: HashMap<GuildId, BTreeSet<String>>,
}

/// Guild configuration and block-list store.
#[derive(Debug)]
pub struct GuildStore {
    channels_path: PathBuf,
    blocked_path: PathBuf,
    data: RwLock<GuildData>,
}

impl GuildStore {
    /// Load both files. Missing or unreadable files load as empty.
    pub async fn load(channels_path: PathBuf, blocked_path: PathBuf) -> Self {
        let channels = read_json::<ChannelFile>(&channels_path)
            .await
            .map(ChannelFile::into_channels)
            .unwrap_or_default();
        let blocked = read_json::<BlockedFile>(&blocked_path)
            .await
            .map(into_blocked)
            .unwrap_or_default();

        tracing::info!(
            guilds = channels.len(),
            blocked = blocked.values().map(BTreeSet::len).sum::<usize>(),
            blocked_guilds = blocked.len(),
            "guild store loaded"
        );

        Self {
            channels_path,
            blocked_path,
            data: RwLock::new(GuildData { channels, blocked }),
        }
    }

    /// Monitored report channel of a guild.
    pub async fn channel(&self, guild: GuildId) -> Option<ChannelId> {
        self.data.read().await.channels.get(&guild).copied()
    }

    pub async fn configured_guilds(&self) -> usize {
        self.data.read().await.channels.len()
    }

    /// Set the monitored channel and persist.
    pub async fn set_channel(&self, guild: GuildId, channel: ChannelId) -> Result<()> {
        let mut data = self.data.write().await;
        data.channels.insert(guild, channel);
        write_json(&self.channels_path, &encode_channels(&data.channels)).await
    }

    /// Exact-string membership in the guild's block set.
    pub async fn is_blocked(&self, guild: GuildId, identifier: &str) -> bool {
        self.data
            .read()
            .await
            .blocked
            .get(&guild)
            .is_some_and(|set| set.contains(identifier))
    }

    /// Add an identifier to the guild's block set and persist.
    pub async fn block(&self, guild: GuildId, identifier: &str) -> Result<()> {
        let mut data = self.data.write().await;
        data.blocked
            .entry(guild)
            .or_default()
            .insert(identifier.to_string());
        write_json(&self.blocked_path, &encode_blocked(&data.blocked)).await
    }

    /// Remove an identifier. Returns whether it was present; empty sets are dropped.
    pub async fn unblock(&self, guild: GuildId, identifier: &str) -> Result<bool> {
        let mut data = self.data.write().await;
        let Some(set) = data.blocked.get_mut(&guild) else {
            return Ok(false);
        };
        if !set.remove(identifier) {
            return Ok(false);
        }
        if set.is_empty() {
            data.blocked.remove(&guild);
        }
        write_json(&self.blocked_path, &encode_blocked(&data.blocked)).await?;
        Ok(true)
    }

    /// The guild's blocked identifiers in sorted order.
    pub async fn blocked(&self, guild: GuildId) -> Vec<String> {
        self.data
            .read()
            .await
            .blocked
            .get(&guild)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every persisted entry for a guild the bot has left.
    pub async fn forget_guild(&self, guild: GuildId) -> Result<()> {
        let mut data = self.data.write().await;
        if data.channels.remove(&guild).is_some() {
            write_json(&self.channels_path, &encode_channels(&data.channels)).await?;
        }
        if data.blocked.remove(&guild).is_some() {
            write_json(&self.blocked_path, &encode_blocked(&data.blocked)).await?;
        }
        Ok(())
    }
}

/// A JSON scalar as older files stored it: ids as strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Other(IgnoredAny),
}

impl Scalar {
    /// Zero is not a valid snowflake.
    fn snowflake(&self) -> Option<u64> {
        match self {
            Scalar::Text(text) => text.trim().parse().ok(),
            Scalar::Number(number) => number.as_u64(),
            Scalar::Other(_) => None,
        }
        .filter(|id| *id != 0)
    }

    fn identifier(self) -> Option<String> {
        match self {
            Scalar::Text(text) => Some(text),
            Scalar::Number(number) => Some(number.to_string()),
            Scalar::Other(_) => None,
        }
    }
}

/// `guild_config.json`: a flat guild → channel map, or the older layout
/// nesting it under `"channels"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelFile {
    Nested { channels: HashMap<String, Scalar> },
    Flat(HashMap<String, Scalar>),
}

impl ChannelFile {
    fn into_channels(self) -> HashMap<GuildId, ChannelId> {
        let (ChannelFile::Nested { channels: entries } | ChannelFile::Flat(entries)) = self;
        entries
            .into_iter()
            .filter_map(|(guild, channel)| {
                let guild = guild_key(&guild)?;
                Some((guild, ChannelId::new(channel.snowflake()?)))
            })
            .collect()
    }
}

/// `blocked_ids.json`: guild → list of blocked identifiers.
type BlockedFile = HashMap<String, Vec<Scalar>>;

fn into_blocked(file: BlockedFile) -> HashMap<GuildId, BTreeSet<String>> {
    file.into_iter()
        .filter_map(|(guild, identifiers)| {
            let guild = guild_key(&guild)?;
            let set: BTreeSet<String> = identifiers
                .into_iter()
                .filter_map(Scalar::identifier)
                .collect();
            (!set.is_empty()).then_some((guild, set))
        })
        .collect()
}

fn guild_key(key: &str) -> Option<GuildId> {
    key.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
        Err(error) => {
            tracing::error!(path = %path.display(), %error, "failed to read guild store file");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::error!(path = %path.display(), %error, "failed to parse guild store file");
            None
        }
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    let temp_path = path.with_extension("json.tmp");
    let write_error = |error: std::io::Error| StoreError::Write {
        path: path.display().to_string(),
        source: error.into(),
    };
    tokio::fs::write(&temp_path, text).await.map_err(write_error)?;
    tokio::fs::rename(&temp_path, path).await.map_err(write_error)?;
    Ok(())
}

fn encode_channels(channels: &HashMap<GuildId, ChannelId>) -> BTreeMap<String, String> {
    channels
        .iter()
        .map(|(guild, channel)| (guild.to_string(), channel.to_string()))
        .collect()
}

fn encode_blocked(blocked: &HashMap<GuildId, BTreeSet<String>>) -> BTreeMap<String, &BTreeSet<String>> {
    blocked
        .iter()
        .map(|(guild, set)| (guild.to_string(), set))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    async fn store_in(dir: &tempfile::TempDir) -> GuildStore {
        GuildStore::load(
            dir.path().join("guild_config.json"),
            dir.path().join("blocked_ids.json"),
        )
        .await
    }

    #[test]
    fn loads_flat_and_nested_channel_layouts() {
        let flat: ChannelFile = serde_json::from_str(indoc! {r#"
            { "111": "222", "333": 444, "0": "5", "666": null }
        "#})
        .expect("flat layout");
        let nested: ChannelFile = serde_json::from_str(indoc! {r#"
            { "channels": { "111": "222" } }
        "#})
        .expect("nested layout");

        let flat = flat.into_channels();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat.get(&GuildId::new(111)), Some(&ChannelId::new(222)));
        assert_eq!(flat.get(&GuildId::new(333)), Some(&ChannelId::new(444)));

        let nested = nested.into_channels();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested.get(&GuildId::new(111)), Some(&ChannelId::new(222)));
    }

    #[test]
    fn blocked_identifiers_accept_numbers_and_drop_empty_guilds() {
        let file: BlockedFile = serde_json::from_str(indoc! {r#"
            { "10": ["P123", 998877, true], "11": [] }
        "#})
        .expect("blocked layout");

        let blocked = into_blocked(file);
        assert_eq!(blocked.len(), 1);
        let set = &blocked[&GuildId::new(10)];
        assert!(set.contains("P123"));
        assert!(set.contains("998877"));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn changes_survive_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir).await;
        let guild = GuildId::new(10);

        store.set_channel(guild, ChannelId::new(20)).await.expect("save channel");
        store.block(guild, "P123").await.expect("save block");
        store.block(guild, "998877").await.expect("save block");

        let reloaded = store_in(&dir).await;
        assert_eq!(reloaded.channel(guild).await, Some(ChannelId::new(20)));
        assert!(reloaded.is_blocked(guild, "P123").await);
        assert!(!reloaded.is_blocked(guild, "p123").await);
        assert!(!reloaded.is_blocked(GuildId::new(11), "P123").await);
        assert_eq!(reloaded.blocked(guild).await, ["998877", "P123"]);
    }

    #[tokio::test]
    async fn unblocking_last_identifier_drops_guild_entry() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir).await;
        let guild = GuildId::new(10);

        store.block(guild, "P1").await.expect("save block");
        assert!(store.unblock(guild, "P1").await.expect("unblock"));
        assert!(!store.unblock(guild, "P1").await.expect("second unblock"));

        let text = std::fs::read_to_string(dir.path().join("blocked_ids.json"))
            .expect("blocked file written");
        assert_eq!(text.trim(), "{}");
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("guild_config.json"), "{ not json")
            .expect("write corrupt file");

        let store = store_in(&dir).await;
        assert_eq!(store.configured_guilds().await, 0);
    }

    #[tokio::test]
    async fn forget_guild_clears_both_maps() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir).await;
        let guild = GuildId::new(10);

        store.set_channel(guild, ChannelId::new(20)).await.expect("save channel");
        store.block(guild, "P1").await.expect("save block");
        store.forget_guild(guild).await.expect("forget");

        let reloaded = store_in(&dir).await;
        assert_eq!(reloaded.channel(guild).await, None);
        assert!(reloaded.blocked(guild).await.is_empty());
    }
}
