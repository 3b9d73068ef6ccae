//! Read-only scans over a report channel's full history.

use super::surface::{ChatSurface, MessageSnapshot};
use crate::error::Result;
use crate::report::{
    Affordance, FOOTER_PREFIX, ReactionSnapshot, ReportState, Status, derive_state,
    truncate_chars,
};
use futures::StreamExt as _;
use serenity::all::{ChannelId, GuildId, UserId};

/// Longest report title shown in a per-assignee listing.
const LISTING_TITLE_LIMIT: usize = 80;

/// Aggregate counts over a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub total: usize,
    pub new: usize,
    pub in_progress: usize,
    pub fixed: usize,
    pub wont_fix: usize,
    pub high_priority: usize,
}

impl ReportStats {
    fn record(&mut self, state: &ReportState) {
        self.total += 1;
        match state.status {
            Status::New => self.new += 1,
            Status::InProgress => self.in_progress += 1,
            Status::Fixed => self.fixed += 1,
            Status::WontFix => self.wont_fix += 1,
        }
        if state.high_priority {
            self.high_priority += 1;
        }
    }

    /// Resolved share of all reports, in percent. `None` for an empty channel.
    pub fn completion_rate(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.fixed + self.wont_fix) as f64 / self.total as f64 * 100.0)
    }

    /// Completion rate rendered with one decimal, e.g. `66.7%`.
    pub fn completion_label(&self) -> Option<String> {
        self.completion_rate().map(|rate| format!("{rate:.1}%"))
    }
}

/// A report currently assigned to someone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedReport {
    pub title: String,
    pub status: Status,
    pub high_priority: bool,
    pub link: String,
}

/// Whether a history message is a published report (and not, say, the
/// setup announcement or a detail record).
pub fn is_published_report(message: &MessageSnapshot, bot: UserId) -> bool {
    message.author.id == bot
        && message
            .embeds
            .first()
            .and_then(|embed| embed.footer.as_deref())
            .is_some_and(|footer| footer.starts_with(FOOTER_PREFIX))
}

/// Jump link to a report's thread, or to the message itself without one.
pub fn report_link(guild: GuildId, message: &MessageSnapshot) -> String {
    match message.thread_id {
        Some(thread) => format!("https://discord.com/channels/{guild}/{thread}"),
        None => format!(
            "https://discord.com/channels/{guild}/{}/{}",
            message.channel_id, message.id
        ),
    }
}

/// Count every published report in the channel by derived status.
pub async fn collect_stats<S: ChatSurface>(surface: &S, channel: ChannelId) -> Result<ReportStats> {
    let bot = surface.bot_user_id();
    let mut stats = ReportStats::default();
    let mut history = surface.history(channel);

    while let Some(message) = history.next().await {
        let message = message?;
        if !is_published_report(&message, bot) {
            continue;
        }
        let snapshot = ReactionSnapshot {
            counts: message.reactions,
            in_progress_reactors: None,
        };
        stats.record(&derive_state(&snapshot));
    }

    tracing::debug!(channel_id = %channel, total = stats.total, "collected report stats");
    Ok(stats)
}

/// Reports in the channel whose derived assignee is `user`, newest first.
pub async fn assigned_to<S: ChatSurface>(
    surface: &S,
    guild: GuildId,
    channel: ChannelId,
    user: UserId,
) -> Result<Vec<AssignedReport>> {
    let bot = surface.bot_user_id();
    let mut assigned = Vec::new();
    let mut history = surface.history(channel);

    while let Some(message) = history.next().await {
        let message = message?;
        if !is_published_report(&message, bot) {
            continue;
        }

        let mut snapshot = ReactionSnapshot {
            counts: message.reactions.clone(),
            in_progress_reactors: None,
        };
        // An unreadable reactor list fails the scan instead of hiding the report.
        let reactors = if snapshot.count(Affordance::InProgress) > 0 {
            surface
                .reaction_users(message.channel_id, message.id, Affordance::InProgress.emoji())
                .await?
        } else {
            Vec::new()
        };
        snapshot.in_progress_reactors = Some(reactors);
        let state = derive_state(&snapshot);
        if state.assignee != Some(user) {
            continue;
        }

        let title = message
            .embeds
            .first()
            .and_then(|embed| embed.title.as_deref())
            .unwrap_or("Bug Report");
        assigned.push(AssignedReport {
            title: truncate_chars(title, LISTING_TITLE_LIMIT).to_string(),
            status: state.status,
            high_priority: state.high_priority,
            link: report_link(guild, &message),
        });
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RichEmbed;
    use crate::tracker::fake::{FakeSurface, REPORT_CHANNEL};

    fn channel() -> ChannelId {
        ChannelId::new(REPORT_CHANNEL)
    }

    async fn published(surface: &FakeSurface, title: &str) -> serenity::all::MessageId {
        let embed = RichEmbed::new()
            .title(title)
            .field("Status", "New", true)
            .footer("Reported via hook");
        let id = surface
            .send_embed(channel(), &embed, None)
            .await
            .expect("send");
        for affordance in Affordance::DEFAULT_REACTIONS {
            surface
                .add_reaction(channel(), id, affordance.emoji())
                .await
                .expect("seed");
        }
        id
    }

    #[tokio::test]
    async fn completion_rate_over_mixed_reports() {
        let surface = FakeSurface::new();
        let fixed = published(&surface, "a").await;
        let wont_fix = published(&surface, "b").await;
        published(&surface, "c").await;
        surface.react(fixed, Affordance::Fixed.emoji(), 7);
        surface.react(wont_fix, Affordance::WontFix.emoji(), 7);

        let stats = collect_stats(&surface, channel()).await.expect("stats");

        assert_eq!(stats.total, 3);
        assert_eq!((stats.new, stats.fixed, stats.wont_fix), (1, 1, 1));
        assert_eq!(stats.completion_label().as_deref(), Some("66.7%"));
    }

    #[tokio::test]
    async fn non_report_messages_are_not_counted() {
        let surface = FakeSurface::new();
        published(&surface, "real").await;
        surface
            .send_embed(channel(), &RichEmbed::new().title("Bug Tracker Active"), None)
            .await
            .expect("send");

        let stats = collect_stats(&surface, channel()).await.expect("stats");
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn empty_channel_has_no_completion_rate() {
        assert_eq!(ReportStats::default().completion_rate(), None);
    }

    #[tokio::test]
    async fn assigned_reports_follow_derived_assignee() {
        let surface = FakeSurface::new();
        let mine = published(&surface, "mine").await;
        let theirs = published(&surface, "theirs").await;
        published(&surface, "nobody's").await;
        surface.react(mine, Affordance::InProgress.emoji(), 7);
        surface.react(mine, Affordance::HighPriority.emoji(), 7);
        surface.react(theirs, Affordance::InProgress.emoji(), 8);
        surface.react(theirs, Affordance::InProgress.emoji(), 7);

        let assigned = assigned_to(&surface, GuildId::new(1), channel(), UserId::new(7))
            .await
            .expect("scan");

        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].title, "mine");
        assert_eq!(assigned[0].status, Status::InProgress);
        assert!(assigned[0].high_priority);
        assert!(assigned[0].link.ends_with(&format!("/{REPORT_CHANNEL}/{mine}")));
    }

    #[tokio::test]
    async fn unreadable_reactor_list_fails_the_scan() {
        let surface = FakeSurface::new();
        let mine = published(&surface, "mine").await;
        surface.react(mine, Affordance::InProgress.emoji(), 7);
        surface.fail("reaction_users");

        let result = assigned_to(&surface, GuildId::new(1), channel(), UserId::new(7)).await;

        assert!(result.is_err());
    }
}
