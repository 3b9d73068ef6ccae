//! Pending-attachment correlation.
//!
//! The game plugin posts log files as separate attachment-only messages
//! through the same webhook, sometimes before the report itself. They are
//! buffered per (guild, sender) and handed to the next report published by
//! that sender whose creation time is within the correlation window.
//!
//! The buffer is a process-lifetime cache with TTL eviction: entries left
//! unmatched past the TTL are dropped from memory and their messages stay in
//! the channel for a human to deal with.

use super::best_effort::BestEffort;
use super::blocklist::SenderKey;
use super::surface::{AttachmentRef, ChatSurface, MessageSnapshot};
use chrono::{DateTime, Duration, Utc};
use serenity::all::{ChannelId, GuildId, MessageId};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// An attachment-only message waiting for its report.
#[derive(Debug, Clone)]
pub struct PendingAttachment {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub attachments: Vec<AttachmentRef>,
    /// Platform creation time, compared against the report's.
    pub created_at: DateTime<Utc>,
    /// Local arrival time, used for eviction.
    pub received_at: DateTime<Utc>,
}

impl PendingAttachment {
    pub fn from_message(message: &MessageSnapshot, received_at: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id,
            channel_id: message.channel_id,
            attachments: message.attachments.clone(),
            created_at: message.created_at,
            received_at,
        }
    }
}

/// Buffers attachment-only messages and pairs them with reports.
#[derive(Debug)]
pub struct Correlator {
    pending: Mutex<HashMap<SenderKey, Vec<PendingAttachment>>>,
    window: Duration,
    ttl: Duration,
}

impl Correlator {
    pub fn new(window: Duration, ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            window,
            ttl,
        }
    }

    /// Append an attachment to the sender's pending list.
    pub async fn buffer(&self, key: SenderKey, entry: PendingAttachment) {
        let now = entry.received_at;
        let mut pending = self.pending.lock().await;
        evict_expired(&mut pending, now, self.ttl);
        pending.entry(key).or_default().push(entry);
    }

    /// Remove a message from the sender's list (it turned out to be a report).
    pub async fn forget(&self, key: SenderKey, message: MessageId) {
        let mut pending = self.pending.lock().await;
        if let Some(entries) = pending.get_mut(&key) {
            entries.retain(|entry| entry.message_id != message);
            if entries.is_empty() {
                pending.remove(&key);
            }
        }
    }

    /// Take every entry within the window of `report_time`.
    ///
    /// Matched entries leave the buffer under the lock, so an attachment is
    /// handed to at most one report; entries outside the window stay.
    pub async fn take_matches(
        &self,
        key: SenderKey,
        report_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<PendingAttachment> {
        let mut pending = self.pending.lock().await;
        evict_expired(&mut pending, now, self.ttl);

        let Some(entries) = pending.get_mut(&key) else {
            return Vec::new();
        };

        let total = entries.len();
        let (matched, remaining): (Vec<_>, Vec<_>) = entries
            .drain(..)
            .partition(|entry| (report_time - entry.created_at).abs() <= self.window);

        for entry in &remaining {
            let gap = (report_time - entry.created_at).abs();
            tracing::debug!(
                message_id = %entry.message_id,
                gap_ms = gap.num_milliseconds(),
                "pending attachment outside correlation window"
            );
        }

        if remaining.is_empty() {
            pending.remove(&key);
        } else {
            *entries = remaining;
        }

        if !matched.is_empty() {
            tracing::info!(matched = matched.len(), total, "matched pending attachments");
        }
        matched
    }

    /// Move matched attachments into a report thread and delete their
    /// original messages. Returns how many messages were moved.
    pub async fn deliver<S: ChatSurface>(
        surface: &S,
        thread: ChannelId,
        matches: Vec<PendingAttachment>,
        steps: &mut BestEffort,
    ) -> usize {
        let mut moved = 0;
        for entry in matches {
            for attachment in &entry.attachments {
                let label = format!("**Log File:** {}", attachment.filename);
                steps
                    .run(
                        "forward log file",
                        surface.forward_attachment(thread, &label, attachment),
                    )
                    .await;
            }
            steps
                .run_tolerating_missing(
                    "delete log message",
                    surface.delete_message(entry.channel_id, entry.message_id),
                )
                .await;
            moved += 1;
        }
        moved
    }

    /// Drop every buffered entry of a guild.
    pub async fn clear_guild(&self, guild: GuildId) {
        self.pending
            .lock()
            .await
            .retain(|(pending_guild, _), _| *pending_guild != guild);
    }

    pub async fn pending_count(&self, key: SenderKey) -> usize {
        self.pending.lock().await.get(&key).map_or(0, Vec::len)
    }
}

fn evict_expired(
    pending: &mut HashMap<SenderKey, Vec<PendingAttachment>>,
    now: DateTime<Utc>,
    ttl: Duration,
) {
    pending.retain(|(guild, sender), entries| {
        entries.retain(|entry| {
            let keep = now - entry.received_at <= ttl;
            if !keep {
                tracing::info!(
                    guild_id = %guild,
                    sender_id = %sender,
                    message_id = %entry.message_id,
                    "evicted unmatched pending attachment"
                );
            }
            keep
        });
        !entries.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::UserId;

    fn key() -> SenderKey {
        (GuildId::new(1), UserId::new(50))
    }

    fn entry(id: u64, created_at: DateTime<Utc>) -> PendingAttachment {
        PendingAttachment {
            message_id: MessageId::new(id),
            channel_id: ChannelId::new(7),
            attachments: vec![AttachmentRef {
                filename: format!("log-{id}.txt"),
                url: format!("https://cdn.example/log-{id}.txt"),
            }],
            created_at,
            received_at: created_at,
        }
    }

    fn correlator() -> Correlator {
        Correlator::new(Duration::seconds(3), Duration::minutes(10))
    }

    #[tokio::test]
    async fn only_entries_inside_window_match() {
        let correlator = correlator();
        let report_time = Utc::now();
        correlator.buffer(key(), entry(1, report_time - Duration::seconds(2))).await;
        correlator.buffer(key(), entry(2, report_time - Duration::seconds(5))).await;
        correlator.buffer(key(), entry(3, report_time + Duration::seconds(3))).await;

        let matched = correlator.take_matches(key(), report_time, report_time).await;

        let ids: Vec<_> = matched.iter().map(|m| m.message_id.get()).collect();
        assert_eq!(ids, [1, 3]);
        assert_eq!(correlator.pending_count(key()).await, 1);
    }

    #[tokio::test]
    async fn an_attachment_matches_at_most_one_report() {
        let correlator = correlator();
        let report_time = Utc::now();
        correlator.buffer(key(), entry(1, report_time)).await;

        let first = correlator.take_matches(key(), report_time, report_time).await;
        let second = correlator.take_matches(key(), report_time, report_time).await;

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(correlator.pending_count(key()).await, 0);
    }

    #[tokio::test]
    async fn other_senders_are_untouched() {
        let correlator = correlator();
        let now = Utc::now();
        let other = (GuildId::new(1), UserId::new(51));
        correlator.buffer(other, entry(1, now)).await;

        assert!(correlator.take_matches(key(), now, now).await.is_empty());
        assert_eq!(correlator.pending_count(other).await, 1);
    }

    #[tokio::test]
    async fn stale_entries_are_evicted() {
        let correlator = correlator();
        let start = Utc::now();
        correlator.buffer(key(), entry(1, start)).await;

        let later = start + Duration::minutes(11);
        assert!(correlator.take_matches(key(), start, later).await.is_empty());
        assert_eq!(correlator.pending_count(key()).await, 0);
    }

    #[tokio::test]
    async fn forget_removes_edited_report_message() {
        let correlator = correlator();
        let now = Utc::now();
        correlator.buffer(key(), entry(1, now)).await;
        correlator.buffer(key(), entry(2, now)).await;

        correlator.forget(key(), MessageId::new(1)).await;
        assert_eq!(correlator.pending_count(key()).await, 1);
        correlator.forget(key(), MessageId::new(2)).await;
        assert_eq!(correlator.pending_count(key()).await, 0);
    }

    #[tokio::test]
    async fn fresh_correlator_has_nothing_pending() {
        // Buffered state does not outlive the process.
        let before = correlator();
        let now = Utc::now();
        before.buffer(key(), entry(1, now)).await;
        drop(before);

        let after_restart = correlator();
        assert!(after_restart.take_matches(key(), now, now).await.is_empty());
    }
}
