//! Administrative and query commands.
//!
//! Each command returns a [`CommandReply`] for the invoking user; the
//! gateway layer decides how to deliver it.

use super::Tracker;
use super::best_effort::BestEffort;
use super::queries::{self, AssignedReport, ReportStats};
use super::surface::{ChatSurface, TrackerPermission};
use crate::error::Result;
use crate::report::{Affordance, RichEmbed, Status};
use chrono::Utc;
use serenity::all::{ChannelId, GuildId, UserId};

/// Neutral blue used for informational cards.
const INFO_COLOR: u32 = 0x3498db;

/// Discord's cap on autocomplete choices.
const MAX_SUGGESTIONS: usize = 25;

/// Value of the placeholder suggestion shown when nothing is blocked.
pub const NO_BLOCKED_VALUE: &str = "none";

pub const NOT_CONFIGURED: &str = "Bug tracker is not configured. Use `/bug_setup` first.";

/// What to show the user who invoked a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandReply {
    pub content: Option<String>,
    pub embed: Option<RichEmbed>,
    /// Only the invoking user sees the reply.
    pub ephemeral: bool,
}

impl CommandReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ephemeral: true,
            ..Self::default()
        }
    }

    pub fn card(embed: RichEmbed) -> Self {
        Self {
            embed: Some(embed),
            ..Self::default()
        }
    }
}

/// One autocomplete choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub name: String,
    pub value: String,
}

fn reaction_legend() -> String {
    [
        (Affordance::InProgress, Status::InProgress.label()),
        (Affordance::Fixed, Status::Fixed.label()),
        (Affordance::WontFix, Status::WontFix.label()),
        (Affordance::HighPriority, "High Priority"),
    ]
    .iter()
    .map(|(affordance, label)| format!("{} {label}", affordance.emoji()))
    .collect::<Vec<_>>()
    .join(" • ")
}

fn setup_card(channel: ChannelId) -> RichEmbed {
    RichEmbed::new()
        .title("✅ Bug Tracker Configured!")
        .description(format!("Bug reports will now be monitored in <#{channel}>"))
        .color(Status::Fixed.color())
        .field(
            "How it works",
            "1. Plugin posts bug reports in that channel\n\
             2. Bot creates a thread for each report\n\
             3. Use reactions or commands to manage bugs",
            false,
        )
        .field("Reactions", reaction_legend(), false)
        .field(
            "Commands",
            "Use `/bug_` commands to manage the tracker",
            false,
        )
}

fn active_card() -> RichEmbed {
    RichEmbed::new()
        .title("Bug Tracker Active")
        .description(
            "This channel is now configured for bug reports!\n\n\
             **Staff:** Use reactions or `/bug_` commands to manage.",
        )
        .color(INFO_COLOR)
}

fn stats_card(stats: &ReportStats, channel_name: &str) -> RichEmbed {
    let mut card = RichEmbed::new()
        .title("Bug Report Statistics")
        .color(INFO_COLOR)
        .timestamp(Utc::now())
        .field(
            "Overview",
            format!(
                "**Total Reports:** {}\n**High Priority:** {}",
                stats.total, stats.high_priority
            ),
            false,
        )
        .field("🔵 New", stats.new.to_string(), true)
        .field("🟠 In Progress", stats.in_progress.to_string(), true)
        .field("🟢 Fixed", stats.fixed.to_string(), true)
        .field("⚪ Won't Fix", stats.wont_fix.to_string(), true);

    if let Some(rate) = stats.completion_label() {
        card = card.field("Completion Rate", rate, true);
    }
    card.footer(format!("Scanned all messages in #{channel_name}"))
}

fn assigned_card(assigned: &[AssignedReport], channel_name: &str) -> RichEmbed {
    let card = if assigned.is_empty() {
        RichEmbed::new()
            .title("Your Assigned Bugs")
            .description("You have no bugs currently assigned to you.")
            .color(Status::New.color())
    } else {
        assigned.iter().fold(
            RichEmbed::new()
                .title(format!("Your Assigned Bugs ({})", assigned.len()))
                .color(INFO_COLOR),
            |card, report| {
                let marker = if report.high_priority { "⭐ " } else { "" };
                card.field(
                    format!("{marker}{}", report.title),
                    format!("**Status:** {} • [View Thread]({})", report.status, report.link),
                    false,
                )
            },
        )
    };
    card.timestamp(Utc::now())
        .footer(format!("Scanned all messages in #{channel_name}"))
}

impl<S: ChatSurface> Tracker<S> {
    /// Point the tracker at a channel after checking the bot can work there.
    pub async fn configure_channel(&self, guild: GuildId, channel: ChannelId) -> Result<CommandReply> {
        let granted = match self.surface.granted_permissions(guild, channel).await {
            Ok(granted) => granted,
            Err(error) => {
                tracing::warn!(guild_id = %guild, channel_id = %channel, %error, "permission check failed");
                return Ok(CommandReply::private(format!(
                    "I couldn't check my permissions in <#{channel}>. Please try again."
                )));
            }
        };

        let missing: Vec<TrackerPermission> = TrackerPermission::REQUIRED
            .into_iter()
            .filter(|permission| !granted.contains(permission))
            .collect();
        if !missing.is_empty() {
            let list = missing
                .iter()
                .map(|permission| format!("• {}", permission.label()))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(CommandReply::private(format!(
                "I am missing the following permissions in <#{channel}>:\n{list}\n\n\
                 Please grant these permissions and try again."
            )));
        }

        self.store.set_channel(guild, channel).await?;
        tracing::info!(guild_id = %guild, channel_id = %channel, "report channel configured");

        let mut steps = BestEffort::new("setup");
        steps
            .run(
                "announce tracker",
                self.surface.send_embed(channel, &active_card(), None),
            )
            .await;

        Ok(CommandReply::card(setup_card(channel)))
    }

    pub async fn block_reporter(&self, guild: GuildId, identifier: &str) -> Result<CommandReply> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(CommandReply::private("Please provide a user or player ID."));
        }

        self.enforcer.block(guild, identifier).await?;
        tracing::info!(guild_id = %guild, identifier, "reporter blocked");
        Ok(CommandReply::text(format!(
            "User/Player `{identifier}` has been blocked in this server."
        )))
    }

    pub async fn unblock_reporter(&self, guild: GuildId, identifier: &str) -> Result<CommandReply> {
        let identifier = identifier.trim();
        if identifier == NO_BLOCKED_VALUE {
            return Ok(CommandReply::private("No blocked users to unblock."));
        }

        if !self.enforcer.unblock(guild, identifier).await? {
            return Ok(CommandReply::private(format!(
                "User/Player `{identifier}` is not blocked in this server."
            )));
        }
        tracing::info!(guild_id = %guild, identifier, "reporter unblocked");
        Ok(CommandReply::text(format!(
            "User/Player `{identifier}` has been unblocked in this server."
        )))
    }

    /// Autocomplete for the unblock command: blocked identifiers containing
    /// `typed`, case-insensitively.
    pub async fn blocked_suggestions(&self, guild: GuildId, typed: &str) -> Vec<Suggestion> {
        let blocked = self.store.blocked(guild).await;
        if blocked.is_empty() {
            return vec![Suggestion {
                name: "No blocked users".into(),
                value: NO_BLOCKED_VALUE.into(),
            }];
        }

        let needle = typed.to_lowercase();
        blocked
            .into_iter()
            .filter(|identifier| identifier.to_lowercase().contains(&needle))
            .take(MAX_SUGGESTIONS)
            .map(|identifier| Suggestion {
                name: identifier.clone(),
                value: identifier,
            })
            .collect()
    }

    pub async fn stats(&self, guild: GuildId) -> Result<CommandReply> {
        let Some(channel) = self.store.channel(guild).await else {
            return Ok(CommandReply::private(NOT_CONFIGURED));
        };

        let stats = queries::collect_stats(&self.surface, channel).await?;
        let name = self.display_name(channel).await;
        Ok(CommandReply::card(stats_card(&stats, &name)))
    }

    pub async fn my_bugs(&self, guild: GuildId, user: UserId) -> Result<CommandReply> {
        let Some(channel) = self.store.channel(guild).await else {
            return Ok(CommandReply::private(NOT_CONFIGURED));
        };

        let assigned = queries::assigned_to(&self.surface, guild, channel, user).await?;
        let name = self.display_name(channel).await;
        Ok(CommandReply {
            embed: Some(assigned_card(&assigned, &name)),
            ephemeral: true,
            ..CommandReply::default()
        })
    }

    async fn display_name(&self, channel: ChannelId) -> String {
        match self.surface.channel_name(channel).await {
            Ok(name) => name,
            Err(error) => {
                tracing::debug!(channel_id = %channel, %error, "channel name unavailable");
                channel.to_string()
            }
        }
    }
}
