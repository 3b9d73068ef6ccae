//! Reaction reconciliation: make a report's embed agree with its reactions.
//!
//! Runs on every reaction add/remove. It is idempotent: running it again
//! with the same reactions converges on the same embed, and the detail
//! record is posted at most once per thread.
//!
//! | derived status | display | thread | action                         |
//! |----------------|---------|--------|--------------------------------|
//! | resolved       | Full    | yes    | archive details, compact       |
//! | unresolved     | Compact | yes    | restore from details (reopen)  |
//! | any            | Full    | any    | steady-state field refresh     |
//! | any            | Compact | any    | status-only refresh            |

use super::best_effort::{BestEffort, StepFailure};
use super::surface::{ChatSurface, MessageSnapshot};
use crate::error::Result;
use crate::report::thread_title::rename_for;
use crate::report::{
    ASSIGNEE_FIELD, Affordance, DETAIL_TITLE, DisplayForm, PRIORITY_FIELD, ReactionSnapshot,
    ReportState, RichEmbed, STATUS_FIELD, derive_state, is_tracking_field,
};
use chrono::{DateTime, Utc};
use serenity::all::ChannelId;

/// Which path a reconcile took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Tracking fields refreshed on a full embed.
    Steady,
    /// Details archived to the thread and the embed compacted.
    Compacted,
    /// Full embed rebuilt from the detail record.
    Reopened,
    /// Only the status field refreshed.
    StatusOnly,
}

/// Result of one reconcile pass.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub state: ReportState,
    pub transition: Transition,
    pub failures: Vec<StepFailure>,
}

/// Stateless reconciler; all state lives on the message.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    detail_scan_limit: u8,
}

/// Compact form: title and status, footer kept.
pub fn compact_embed(embed: &RichEmbed, state: &ReportState, now: DateTime<Utc>) -> RichEmbed {
    RichEmbed {
        title: embed.title.clone(),
        color: Some(state.status.color()),
        footer: embed.footer.clone(),
        timestamp: Some(now),
        ..RichEmbed::default()
    }
    .field(STATUS_FIELD, state.status.label(), true)
}

/// Detail record archiving every non-tracking field of a full embed.
pub fn detail_embed(embed: &RichEmbed, state: &ReportState, now: DateTime<Utc>) -> RichEmbed {
    RichEmbed {
        title: Some(DETAIL_TITLE.to_string()),
        description: embed.description.clone(),
        color: Some(state.status.color()),
        fields: embed
            .fields
            .iter()
            .filter(|field| !is_tracking_field(&field.name))
            .cloned()
            .collect(),
        image_url: embed.image_url.clone(),
        footer: None,
        timestamp: Some(now),
    }
}

/// Full form rebuilt from a compact embed and its detail record.
pub fn full_from_detail(
    compact: &RichEmbed,
    detail: &RichEmbed,
    state: &ReportState,
    now: DateTime<Utc>,
) -> RichEmbed {
    let mut fields = detail.fields.clone();
    fields.retain(|field| !is_tracking_field(&field.name));

    RichEmbed {
        title: compact.title.clone(),
        description: detail.description.clone(),
        color: Some(state.status.color()),
        fields,
        image_url: detail.image_url.clone(),
        footer: compact.footer.clone(),
        timestamp: Some(now),
    }
    .field(STATUS_FIELD, state.status.label(), true)
    .field(ASSIGNEE_FIELD, state.assignee_label(), true)
    .field(PRIORITY_FIELD, state.priority_label(), true)
}

/// Steady-state refresh of every tracking field, preserving field order.
/// An unknown assignee leaves the displayed one untouched.
pub fn refresh_embed(embed: &RichEmbed, state: &ReportState, now: DateTime<Utc>) -> RichEmbed {
    let mut updated = refresh_status(embed, state, now);
    if state.assignee_known {
        updated.upsert_field(ASSIGNEE_FIELD, state.assignee_label(), true);
    }
    updated.upsert_field(PRIORITY_FIELD, state.priority_label(), true);
    updated
}

/// Status field, color and timestamp only.
pub fn refresh_status(embed: &RichEmbed, state: &ReportState, now: DateTime<Utc>) -> RichEmbed {
    let mut updated = embed.clone();
    updated.color = Some(state.status.color());
    updated.upsert_field(STATUS_FIELD, state.status.label(), true);
    updated.timestamp = Some(now);
    updated
}

impl Reconciler {
    pub fn new(detail_scan_limit: u8) -> Self {
        Self { detail_scan_limit }
    }

    /// Collect the reaction snapshot for a message. The in-progress reactor
    /// list costs one extra call and is skipped when nobody reacted with it.
    /// A failed listing leaves the reactors unknown rather than empty.
    async fn snapshot<S: ChatSurface>(
        surface: &S,
        message: &MessageSnapshot,
        steps: &mut BestEffort,
    ) -> ReactionSnapshot {
        let mut snapshot = ReactionSnapshot {
            counts: message.reactions.clone(),
            in_progress_reactors: Some(Vec::new()),
        };
        if snapshot.count(Affordance::InProgress) > 0 {
            snapshot.in_progress_reactors = steps
                .run(
                    "list in-progress reactors",
                    surface.reaction_users(
                        message.channel_id,
                        message.id,
                        Affordance::InProgress.emoji(),
                    ),
                )
                .await;
        }
        snapshot
    }

    /// Bring a tracked message's embed in line with its reactions.
    ///
    /// Returns `None` for messages without an embed.
    pub async fn reconcile<S: ChatSurface>(
        &self,
        surface: &S,
        message: &MessageSnapshot,
    ) -> Option<ReconcileOutcome> {
        let embed = message.embeds.first()?;
        let mut steps = BestEffort::new("reconcile");
        let now = Utc::now();

        let snapshot = Self::snapshot(surface, message, &mut steps).await;
        let state = derive_state(&snapshot);
        let form = DisplayForm::of(embed);

        let transition = match (state.status.is_resolved(), form, message.thread_id) {
            (true, DisplayForm::Full, Some(thread)) => {
                self.compact(surface, message, embed, &state, thread, now, &mut steps)
                    .await
            }
            // Reopening rewrites the assignee, so it waits for a readable reactor list.
            (false, DisplayForm::Compact, Some(thread)) if state.assignee_known => {
                self.reopen(surface, message, embed, &state, thread, now, &mut steps)
                    .await
            }
            (_, DisplayForm::Full, _) => {
                let updated = refresh_embed(embed, &state, now);
                steps
                    .run(
                        "refresh embed",
                        surface.edit_embed(message.channel_id, message.id, &updated),
                    )
                    .await;
                Transition::Steady
            }
            (_, DisplayForm::Compact, _) => {
                let updated = refresh_status(embed, &state, now);
                steps
                    .run(
                        "refresh status",
                        surface.edit_embed(message.channel_id, message.id, &updated),
                    )
                    .await;
                Transition::StatusOnly
            }
        };

        if let Some(thread) = message.thread_id {
            retitle_thread(surface, thread, &mut steps).await;
        }

        tracing::debug!(
            message_id = %message.id,
            status = %state.status,
            high_priority = state.high_priority,
            ?transition,
            "reconciled report"
        );

        Some(ReconcileOutcome {
            state,
            transition,
            failures: steps.into_failures(),
        })
    }

    /// Lock the thread a message lives in. Failures are swallowed.
    pub async fn lock_enclosing_thread<S: ChatSurface>(surface: &S, message: &MessageSnapshot) {
        if !message.in_thread {
            return;
        }
        let mut steps = BestEffort::new("resolve");
        steps
            .run("lock thread", surface.lock_thread(message.channel_id))
            .await;
    }

    /// Newest bot-authored detail record in a thread, within the scan limit.
    pub async fn find_detail<S: ChatSurface>(
        &self,
        surface: &S,
        thread: ChannelId,
    ) -> Result<Option<RichEmbed>> {
        let bot = surface.bot_user_id();
        let messages = surface.recent_messages(thread, self.detail_scan_limit).await?;
        Ok(messages
            .into_iter()
            .filter(|message| message.author.id == bot)
            .filter_map(|message| message.embeds.into_iter().next())
            .find(|embed| embed.title.as_deref() == Some(DETAIL_TITLE)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn compact<S: ChatSurface>(
        &self,
        surface: &S,
        message: &MessageSnapshot,
        embed: &RichEmbed,
        state: &ReportState,
        thread: ChannelId,
        now: DateTime<Utc>,
        steps: &mut BestEffort,
    ) -> Transition {
        let archived = match steps
            .run("scan thread for details", self.find_detail(surface, thread))
            .await
        {
            Some(Some(_)) => true,
            Some(None) => steps
                .run(
                    "post details",
                    surface.send_embed(thread, &detail_embed(embed, state, now), None),
                )
                .await
                .is_some(),
            None => false,
        };

        if !archived {
            // Compacting without an archived copy would lose the fields.
            tracing::warn!(message_id = %message.id, "details not archived, keeping full embed");
            let updated = refresh_embed(embed, state, now);
            steps
                .run(
                    "refresh embed",
                    surface.edit_embed(message.channel_id, message.id, &updated),
                )
                .await;
            return Transition::Steady;
        }

        steps
            .run(
                "compact embed",
                surface.edit_embed(
                    message.channel_id,
                    message.id,
                    &compact_embed(embed, state, now),
                ),
            )
            .await;
        Transition::Compacted
    }

    #[allow(clippy::too_many_arguments)]
    async fn reopen<S: ChatSurface>(
        &self,
        surface: &S,
        message: &MessageSnapshot,
        embed: &RichEmbed,
        state: &ReportState,
        thread: ChannelId,
        now: DateTime<Utc>,
        steps: &mut BestEffort,
    ) -> Transition {
        let detail = steps
            .run("scan thread for details", self.find_detail(surface, thread))
            .await
            .flatten();

        let Some(detail) = detail else {
            tracing::warn!(message_id = %message.id, "no detail record found, refreshing status only");
            let updated = refresh_status(embed, state, now);
            steps
                .run(
                    "refresh status",
                    surface.edit_embed(message.channel_id, message.id, &updated),
                )
                .await;
            return Transition::StatusOnly;
        };

        let full = full_from_detail(embed, &detail, state, now);
        steps
            .run(
                "restore full embed",
                surface.edit_embed(message.channel_id, message.id, &full),
            )
            .await;
        Transition::Reopened
    }
}

async fn retitle_thread<S: ChatSurface>(surface: &S, thread: ChannelId, steps: &mut BestEffort) {
    let Some(current) = steps.run("read thread name", surface.thread_name(thread)).await else {
        return;
    };
    if let Some(name) = rename_for(&current) {
        steps
            .run("rename thread", surface.rename_thread(thread, &name))
            .await;
    }
}
