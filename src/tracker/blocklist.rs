//! Block-list enforcement and the recently-blocked sender markers.
//!
//! Webhook senders carry no reporter identity, so when a blocked reporter's
//! report is deleted the sender (webhook) is marked for a short while and
//! any attachment-only message it posts next is deleted too. Markers are a
//! process-lifetime cache: a restart forgets them, which at worst lets one
//! trailing attachment be buffered as pending.

use crate::error::Result;
use crate::report::{RichEmbed, extract_reporter_id};
use crate::store::GuildStore;
use chrono::{DateTime, Duration, Utc};
use serenity::all::{GuildId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Key for per-sender caches: the guild and the posting account (webhook).
pub type SenderKey = (GuildId, UserId);

/// Outcome of checking an inbound report against the block list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Blocked { reporter: String },
}

/// Filters inbound reports by reporter identifier.
#[derive(Debug)]
pub struct BlockListEnforcer {
    store: Arc<GuildStore>,
    markers: Mutex<HashMap<SenderKey, DateTime<Utc>>>,
    marker_ttl: Duration,
}

impl BlockListEnforcer {
    pub fn new(store: Arc<GuildStore>, marker_ttl: Duration) -> Self {
        Self {
            store,
            markers: Mutex::new(HashMap::new()),
            marker_ttl,
        }
    }

    /// Check a report embed. A blocked reporter marks the sender; an admitted
    /// report clears any marker left on it.
    pub async fn check_report(
        &self,
        key: SenderKey,
        embed: &RichEmbed,
        now: DateTime<Utc>,
    ) -> Admission {
        if let Some(reporter) = extract_reporter_id(embed)
            && self.store.is_blocked(key.0, &reporter).await
        {
            self.markers.lock().await.insert(key, now);
            return Admission::Blocked { reporter };
        }

        self.markers.lock().await.remove(&key);
        Admission::Admit
    }

    /// Whether an attachment-only message from this sender should be deleted
    /// rather than buffered. Expired markers are dropped on the way.
    pub async fn drops_attachment(&self, key: SenderKey, now: DateTime<Utc>) -> bool {
        let mut markers = self.markers.lock().await;
        let Some(marked_at) = markers.get(&key).copied() else {
            return false;
        };
        if now - marked_at < self.marker_ttl {
            return true;
        }
        markers.remove(&key);
        false
    }

    /// Record a marker at an explicit time.
    pub async fn mark(&self, key: SenderKey, at: DateTime<Utc>) {
        self.markers.lock().await.insert(key, at);
    }

    pub async fn block(&self, guild: GuildId, identifier: &str) -> Result<()> {
        self.store.block(guild, identifier).await
    }

    /// Unblock an identifier and clear every marker in the guild; markers
    /// cannot be tied back to a reporter.
    pub async fn unblock(&self, guild: GuildId, identifier: &str) -> Result<bool> {
        let removed = self.store.unblock(guild, identifier).await?;
        let cleared = self.clear_guild(guild).await;
        tracing::info!(guild_id = %guild, cleared, "cleared recently-blocked markers");
        Ok(removed)
    }

    /// Drop all markers of a guild; returns how many were removed.
    pub async fn clear_guild(&self, guild: GuildId) -> usize {
        let mut markers = self.markers.lock().await;
        let before = markers.len();
        markers.retain(|(marker_guild, _), _| *marker_guild != guild);
        before - markers.len()
    }

    pub async fn marker_count(&self) -> usize {
        self.markers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn enforcer(dir: &tempfile::TempDir) -> BlockListEnforcer {
        let store = GuildStore::load(
            dir.path().join("guild_config.json"),
            dir.path().join("blocked_ids.json"),
        )
        .await;
        BlockListEnforcer::new(Arc::new(store), Duration::seconds(60))
    }

    fn report(player: &str) -> RichEmbed {
        RichEmbed::new()
            .description("bug")
            .field("Player ID", format!("`{player}`"), true)
    }

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn sender() -> UserId {
        UserId::new(50)
    }

    #[tokio::test]
    async fn blocked_reporter_marks_sender_for_sixty_seconds() {
        let dir = tempfile::tempdir().expect("temp dir");
        let enforcer = enforcer(&dir).await;
        enforcer.block(guild(), "P123").await.expect("block");
        let now = Utc::now();

        let admission = enforcer.check_report((guild(), sender()), &report("P123"), now).await;
        assert_eq!(
            admission,
            Admission::Blocked {
                reporter: "P123".into()
            }
        );

        assert!(enforcer.drops_attachment((guild(), sender()), now + Duration::seconds(59)).await);
        assert!(!enforcer.drops_attachment((guild(), sender()), now + Duration::seconds(61)).await);
        assert_eq!(enforcer.marker_count().await, 0);
    }

    #[tokio::test]
    async fn admitted_report_clears_marker() {
        let dir = tempfile::tempdir().expect("temp dir");
        let enforcer = enforcer(&dir).await;
        let now = Utc::now();
        enforcer.mark((guild(), sender()), now).await;

        let admission = enforcer.check_report((guild(), sender()), &report("P9"), now).await;

        assert_eq!(admission, Admission::Admit);
        assert!(!enforcer.drops_attachment((guild(), sender()), now).await);
    }

    #[tokio::test]
    async fn unblock_clears_every_marker_in_the_guild() {
        let dir = tempfile::tempdir().expect("temp dir");
        let enforcer = enforcer(&dir).await;
        let now = Utc::now();
        enforcer.block(guild(), "P1").await.expect("block");
        enforcer.mark((guild(), UserId::new(2)), now).await;
        enforcer.mark((guild(), UserId::new(3)), now).await;
        enforcer.mark((GuildId::new(9), UserId::new(2)), now).await;

        let removed = enforcer.unblock(guild(), "P1").await.expect("unblock");

        assert!(removed);
        assert_eq!(enforcer.marker_count().await, 1);
        assert!(enforcer.drops_attachment((GuildId::new(9), UserId::new(2)), now).await);
    }

    #[tokio::test]
    async fn report_without_identifier_is_admitted() {
        let dir = tempfile::tempdir().expect("temp dir");
        let enforcer = enforcer(&dir).await;
        let embed = RichEmbed::new().description("no id here");

        let admission = enforcer.check_report((guild(), sender()), &embed, Utc::now()).await;
        assert_eq!(admission, Admission::Admit);
    }
}
