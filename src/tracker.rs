//! The report pipeline: admission, publication, correlation and
//! reaction-driven reconciliation, behind the [`ChatSurface`] seam.

pub mod best_effort;
pub mod blocklist;
pub mod commands;
pub mod correlator;
#[cfg(test)]
pub mod fake;
pub mod publisher;
pub mod queries;
pub mod reconciler;
pub mod surface;

pub use best_effort::{BestEffort, StepFailure};
pub use blocklist::{Admission, BlockListEnforcer, SenderKey};
pub use commands::{CommandReply, Suggestion};
pub use correlator::{Correlator, PendingAttachment};
pub use publisher::{PublishOutcome, PublishedReport, Publisher};
pub use reconciler::{ReconcileOutcome, Reconciler, Transition};
pub use surface::{ChatSurface, MessageSnapshot};

use crate::config::TrackerConfig;
use crate::report::Affordance;
use crate::store::GuildStore;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use std::sync::Arc;

/// What happened to an inbound message.
#[derive(Debug)]
pub enum Disposition {
    /// Not a report-channel message from a report sender.
    Ignored,
    /// Attachment-only message waiting for its report.
    Buffered,
    /// Attachment from a recently blocked sender, deleted.
    DroppedAttachment,
    /// Report from a blocked reporter, deleted unpublished.
    Blocked { reporter: String },
    Published(PublishOutcome),
    /// The report could not be posted; the origin is left in place.
    PublishFailed,
}

/// Per-process bug tracker over one chat surface.
#[derive(Debug)]
pub struct Tracker<S> {
    surface: S,
    store: Arc<GuildStore>,
    enforcer: BlockListEnforcer,
    correlator: Correlator,
    publisher: Publisher,
    reconciler: Reconciler,
}

impl<S: ChatSurface> Tracker<S> {
    pub fn new(surface: S, store: Arc<GuildStore>, config: TrackerConfig) -> Self {
        Self {
            surface,
            enforcer: BlockListEnforcer::new(store.clone(), config.block_marker_ttl()),
            correlator: Correlator::new(config.correlation_window(), config.pending_ttl()),
            publisher: Publisher::new(config.published_ttl(), config.publish_grace()),
            reconciler: Reconciler::new(config.detail_scan_limit),
            store,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn store(&self) -> &GuildStore {
        &self.store
    }

    /// Guild of a message the report pipeline should look at: posted by
    /// another bot or webhook into the guild's configured channel.
    async fn report_guild(&self, message: &MessageSnapshot) -> Option<GuildId> {
        let guild = message.guild_id?;
        if message.author.id == self.surface.bot_user_id() || !message.author.bot {
            return None;
        }
        (self.store.channel(guild).await == Some(message.channel_id)).then_some(guild)
    }

    /// Handle a newly created message.
    pub async fn handle_message(&self, message: &MessageSnapshot) -> Disposition {
        let Some(guild) = self.report_guild(message).await else {
            return Disposition::Ignored;
        };
        let key: SenderKey = (guild, message.author.id);
        let now = Utc::now();

        if !message.embeds.is_empty() {
            return self.admit_and_publish(guild, key, message, now).await;
        }
        if message.attachments.is_empty() {
            return Disposition::Ignored;
        }

        if self.enforcer.drops_attachment(key, now).await {
            let mut steps = BestEffort::new("block");
            steps
                .run_tolerating_missing(
                    "delete blocked attachment",
                    self.surface.delete_message(message.channel_id, message.id),
                )
                .await;
            tracing::info!(
                guild_id = %guild,
                sender_id = %message.author.id,
                message_id = %message.id,
                "deleted attachment from recently blocked sender"
            );
            return Disposition::DroppedAttachment;
        }

        self.correlator
            .buffer(key, PendingAttachment::from_message(message, now))
            .await;
        tracing::debug!(
            guild_id = %guild,
            message_id = %message.id,
            files = message.attachments.len(),
            "buffered pending attachment"
        );
        Disposition::Buffered
    }

    /// Handle an edit. Plugins sometimes post an empty message and attach the
    /// embed afterwards; that edit is treated as the report arriving.
    ///
    /// `before_had_embeds` is `None` when the pre-edit message is unknown.
    /// Such an edit may race the create event for the same message; the
    /// publication claim lets only one of them through.
    pub async fn handle_message_edit(
        &self,
        before_had_embeds: Option<bool>,
        after: &MessageSnapshot,
    ) -> Disposition {
        if before_had_embeds == Some(true) || after.embeds.is_empty() {
            return Disposition::Ignored;
        }
        let Some(guild) = self.report_guild(after).await else {
            return Disposition::Ignored;
        };
        let key: SenderKey = (guild, after.author.id);
        self.admit_and_publish(guild, key, after, Utc::now()).await
    }

    async fn admit_and_publish(
        &self,
        guild: GuildId,
        key: SenderKey,
        message: &MessageSnapshot,
        now: DateTime<Utc>,
    ) -> Disposition {
        let Some(embed) = message.embeds.first() else {
            return Disposition::Ignored;
        };
        if !self.publisher.claim(guild, message.id, now).await {
            tracing::debug!(guild_id = %guild, message_id = %message.id, "origin already claimed for publication");
            return Disposition::Ignored;
        }
        // A report is never a pending attachment, even if it was buffered
        // before its embed arrived.
        self.correlator.forget(key, message.id).await;

        if let Admission::Blocked { reporter } = self.enforcer.check_report(key, embed, now).await {
            let mut steps = BestEffort::new("block");
            steps
                .run_tolerating_missing(
                    "delete blocked report",
                    self.surface.delete_message(message.channel_id, message.id),
                )
                .await;
            tracing::info!(
                guild_id = %guild,
                sender_id = %key.1,
                reporter = %reporter,
                "deleted report from blocked reporter"
            );
            return Disposition::Blocked { reporter };
        }

        match self
            .publisher
            .publish(&self.surface, &self.correlator, guild, message)
            .await
        {
            Some(outcome) => Disposition::Published(outcome),
            None => Disposition::PublishFailed,
        }
    }

    /// Handle a reaction add or remove on any message.
    ///
    /// Returns `None` when the reaction is not on a tracked report.
    pub async fn handle_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: &str,
        added: bool,
    ) -> Option<ReconcileOutcome> {
        let bot = self.surface.bot_user_id();
        if user == bot {
            return None;
        }
        let affordance = Affordance::from_emoji(emoji)?;

        let snapshot = match self.surface.fetch_message(channel, message).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(channel_id = %channel, message_id = %message, %error, "failed to fetch reacted message");
                return None;
            }
        };
        if !queries::is_published_report(&snapshot, bot) {
            return None;
        }

        if added && affordance == Affordance::Fixed {
            Reconciler::lock_enclosing_thread(&self.surface, &snapshot).await;
        }

        self.reconciler.reconcile(&self.surface, &snapshot).await
    }

    /// The bot left a guild: forget its settings and cached state.
    pub async fn handle_guild_removed(&self, guild: GuildId) {
        if let Err(error) = self.store.forget_guild(guild).await {
            tracing::error!(guild_id = %guild, %error, "failed to forget guild settings");
        }
        let markers = self.enforcer.clear_guild(guild).await;
        self.correlator.clear_guild(guild).await;
        self.publisher.clear_guild(guild).await;
        tracing::info!(guild_id = %guild, markers, "guild removed, state cleared");
    }
}
