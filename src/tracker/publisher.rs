//! Report publication: turn an admitted plugin message into a tracked report.

use super::best_effort::{BestEffort, StepFailure};
use super::blocklist::SenderKey;
use super::correlator::Correlator;
use super::surface::{ChatSurface, FileUpload, MessageSnapshot};
use crate::report::parser::report_title;
use crate::report::thread_title::initial_thread_name;
use crate::report::{
    ASSIGNEE_FIELD, Affordance, FALLBACK_COLOR, FOOTER_PREFIX, PRIORITY_FIELD, PluginReport,
    RichEmbed, STATUS_FIELD, Status, extract_reporter_id, parse_plugin_embed,
};
use chrono::{DateTime, Duration, Utc};
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Correlation entry for a published origin message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedReport {
    pub report_message: MessageId,
    pub thread: Option<ChannelId>,
    pub published_at: DateTime<Utc>,
    pub sender: UserId,
}

/// Result of one publication.
#[derive(Debug)]
pub struct PublishOutcome {
    pub report: PublishedReport,
    pub title: String,
    pub moved_attachments: usize,
    pub failures: Vec<StepFailure>,
}

/// An origin message taken by one publication. `report` is filled in once
/// the report message exists.
#[derive(Debug, Clone, Copy)]
struct Claim {
    claimed_at: DateTime<Utc>,
    report: Option<PublishedReport>,
}

/// Builds and posts reports; remembers which origin messages it published.
#[derive(Debug)]
pub struct Publisher {
    published: Mutex<HashMap<(GuildId, MessageId), Claim>>,
    ttl: Duration,
    grace: std::time::Duration,
}

/// Build the canonical report embed from a parsed plugin payload.
pub fn build_report_embed(
    origin: &RichEmbed,
    parsed: &PluginReport,
    reporter: Option<&str>,
    title: &str,
    sender_name: &str,
    now: DateTime<Utc>,
) -> RichEmbed {
    let mut embed = RichEmbed::new()
        .title(title)
        .description(parsed.description.clone())
        .color(origin.color.unwrap_or(FALLBACK_COLOR))
        .timestamp(now);

    if let Some(response_type) = &parsed.response_type {
        embed = embed.field("Type", response_type, true);
    }
    if let Some(map) = &parsed.map {
        embed = embed.field("Map", map, true);
    }
    if let Some(player) = parsed.user_id.as_deref().or(reporter) {
        embed = embed.field("Player ID", player, true);
    }

    embed = embed
        .field(STATUS_FIELD, Status::New.label(), true)
        .field(ASSIGNEE_FIELD, "Unassigned", true)
        .field(PRIORITY_FIELD, "Normal", true);

    if let Some(location) = &parsed.location {
        embed = embed.field("Location", location, false);
    }

    embed.footer(format!("{FOOTER_PREFIX}{sender_name}"))
}

/// Filename for a re-hosted screenshot: the URL's last path segment.
pub fn image_filename(url: &str) -> String {
    let segment = url
        .split('?')
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default();
    if segment.is_empty() || !segment.contains('.') {
        "screenshot.png".to_string()
    } else {
        segment.to_string()
    }
}

impl Publisher {
    pub fn new(ttl: Duration, grace: std::time::Duration) -> Self {
        Self {
            published: Mutex::new(HashMap::new()),
            ttl,
            grace,
        }
    }

    /// Take an origin message for publication. Returns `false` when another
    /// event already claimed it, so create and edit events for the same
    /// origin publish at most once.
    pub async fn claim(&self, guild: GuildId, origin: MessageId, now: DateTime<Utc>) -> bool {
        let mut published = self.published.lock().await;
        published.retain(|_, claim| now - claim.claimed_at <= self.ttl);
        if published.contains_key(&(guild, origin)) {
            return false;
        }
        published.insert(
            (guild, origin),
            Claim {
                claimed_at: now,
                report: None,
            },
        );
        true
    }

    /// Give up a claim whose report was never posted.
    async fn release(&self, guild: GuildId, origin: MessageId) {
        self.published.lock().await.remove(&(guild, origin));
    }

    /// Report published for an origin message, if publication got that far.
    pub async fn published(&self, guild: GuildId, origin: MessageId) -> Option<PublishedReport> {
        self.published
            .lock()
            .await
            .get(&(guild, origin))
            .and_then(|claim| claim.report)
    }

    pub async fn clear_guild(&self, guild: GuildId) {
        self.published
            .lock()
            .await
            .retain(|(published_guild, _), _| *published_guild != guild);
    }

    /// Publish an admitted report message the caller has claimed.
    ///
    /// Only the initial send is required; every later step is best-effort.
    /// A failed send releases the claim so a later edit can retry.
    /// Returns `None` when the origin has no embed or the send fails.
    pub async fn publish<S: ChatSurface>(
        &self,
        surface: &S,
        correlator: &Correlator,
        guild: GuildId,
        origin: &MessageSnapshot,
    ) -> Option<PublishOutcome> {
        let source = origin.embeds.first()?;
        let now = Utc::now();
        let mut steps = BestEffort::new("publish");

        let parsed = parse_plugin_embed(source);
        let reporter = extract_reporter_id(source);
        let title = report_title(source, &parsed.description);
        let mut embed = build_report_embed(
            source,
            &parsed,
            reporter.as_deref(),
            &title,
            &origin.author.name,
            now,
        );

        let mut upload = None;
        if let Some(url) = &source.image_url
            && let Some(data) = steps.run("download screenshot", surface.download(url)).await
        {
            let filename = image_filename(url);
            embed.image_url = Some(format!("attachment://{filename}"));
            upload = Some(FileUpload { filename, data });
        }

        let report_message = match surface.send_embed(origin.channel_id, &embed, upload).await {
            Ok(id) => id,
            Err(error) => {
                tracing::error!(
                    guild_id = %guild,
                    origin_id = %origin.id,
                    %error,
                    "failed to post bug report"
                );
                self.release(guild, origin.id).await;
                return None;
            }
        };

        let thread = steps
            .run(
                "create thread",
                surface.create_thread(origin.channel_id, report_message, &initial_thread_name(&title)),
            )
            .await;

        let report = PublishedReport {
            report_message,
            thread,
            published_at: now,
            sender: origin.author.id,
        };
        self.published
            .lock()
            .await
            .entry((guild, origin.id))
            .and_modify(|claim| claim.report = Some(report))
            .or_insert(Claim {
                claimed_at: now,
                report: Some(report),
            });

        if let Some(thread) = thread {
            for attachment in &origin.attachments {
                let label = format!("**Attachment:** {}", attachment.filename);
                steps
                    .run(
                        "forward attachment",
                        surface.forward_attachment(thread, &label, attachment),
                    )
                    .await;
            }
        }

        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }

        let mut moved_attachments = 0;
        if let Some(thread) = thread {
            let key: SenderKey = (guild, origin.author.id);
            let matches = correlator
                .take_matches(key, origin.created_at, Utc::now())
                .await;
            moved_attachments = Correlator::deliver(surface, thread, matches, &mut steps).await;
        }

        for affordance in Affordance::DEFAULT_REACTIONS {
            steps
                .run(
                    "seed reaction",
                    surface.add_reaction(origin.channel_id, report_message, affordance.emoji()),
                )
                .await;
        }

        steps
            .run_tolerating_missing(
                "delete origin",
                surface.delete_message(origin.channel_id, origin.id),
            )
            .await;

        tracing::info!(
            guild_id = %guild,
            report_id = %report_message,
            thread_id = ?thread,
            moved_attachments,
            "bug report published"
        );

        Some(PublishOutcome {
            report,
            title,
            moved_attachments,
            failures: steps.into_failures(),
        })
    }
}
