//! Reaction-derived report state.
//!
//! Status is never stored: it is recomputed from the message's reaction
//! multiset on every event, so `derive_state` is a pure function of a
//! snapshot.

use serenity::all::UserId;

/// One of the fixed reaction symbols the tracker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affordance {
    InProgress,
    Fixed,
    WontFix,
    HighPriority,
}

impl Affordance {
    /// Order the reactions are attached to a freshly published report.
    pub const DEFAULT_REACTIONS: [Affordance; 4] = [
        Affordance::InProgress,
        Affordance::Fixed,
        Affordance::WontFix,
        Affordance::HighPriority,
    ];

    /// Tie-break order when several status reactions are present.
    pub const PRIORITY_ORDER: [Affordance; 4] = [
        Affordance::Fixed,
        Affordance::WontFix,
        Affordance::InProgress,
        Affordance::HighPriority,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            Affordance::InProgress => "\u{1F9D1}\u{200D}\u{1F4BB}",
            Affordance::Fixed => "\u{2705}",
            Affordance::WontFix => "\u{274C}",
            Affordance::HighPriority => "\u{2B50}",
        }
    }

    pub fn from_emoji(emoji: &str) -> Option<Self> {
        Self::DEFAULT_REACTIONS
            .into_iter()
            .find(|affordance| affordance.emoji() == emoji)
    }

    /// Status this reaction selects, if any. High priority is only a flag.
    pub fn status(self) -> Option<Status> {
        match self {
            Affordance::InProgress => Some(Status::InProgress),
            Affordance::Fixed => Some(Status::Fixed),
            Affordance::WontFix => Some(Status::WontFix),
            Affordance::HighPriority => None,
        }
    }
}

/// Lifecycle status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    New,
    InProgress,
    Fixed,
    WontFix,
}

impl Status {
    pub fn is_resolved(self) -> bool {
        matches!(self, Status::Fixed | Status::WontFix)
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::New => "New",
            Status::InProgress => "In Progress",
            Status::Fixed => "Fixed",
            Status::WontFix => "Won't Fix",
        }
    }

    pub fn color(self) -> u32 {
        match self {
            Status::New | Status::WontFix => 0x95a5a6,
            Status::InProgress => 0xe67e22,
            Status::Fixed => 0x2ecc71,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregated count for one emoji on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: u64,
}

/// A user who reacted, in platform enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reactor {
    pub id: UserId,
    pub bot: bool,
}

/// Everything `derive_state` needs to know about a message's reactions.
#[derive(Debug, Clone, Default)]
pub struct ReactionSnapshot {
    pub counts: Vec<ReactionCount>,
    /// Users on the in-progress reaction, in platform order. `None` when the
    /// list could not be read.
    pub in_progress_reactors: Option<Vec<Reactor>>,
}

impl ReactionSnapshot {
    pub fn count(&self, affordance: Affordance) -> u64 {
        self.counts
            .iter()
            .filter(|reaction| reaction.emoji == affordance.emoji())
            .map(|reaction| reaction.count)
            .sum()
    }

    /// More than one reactor means someone besides the bot's own seed reaction.
    pub fn qualifies(&self, affordance: Affordance) -> bool {
        self.count(affordance) > 1
    }
}

/// Derived report state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportState {
    pub status: Status,
    pub high_priority: bool,
    pub assignee: Option<UserId>,
    /// False when the reactor list was unavailable; `assignee` is then
    /// meaningless and must not overwrite a displayed value.
    pub assignee_known: bool,
}

impl ReportState {
    pub fn priority_label(&self) -> &'static str {
        if self.high_priority {
            "High Priority"
        } else {
            "Normal"
        }
    }

    pub fn assignee_label(&self) -> String {
        match self.assignee {
            Some(user) => format!("<@{user}>"),
            None => "Unassigned".to_string(),
        }
    }
}

/// Compute the state a report's reactions imply.
///
/// The first affordance in priority order with more than one reactor decides
/// the status; high priority never does. The assignee is the first non-bot
/// reactor of the in-progress affordance.
pub fn derive_state(snapshot: &ReactionSnapshot) -> ReportState {
    let reactors = snapshot.in_progress_reactors.as_deref();
    let status = Affordance::PRIORITY_ORDER
        .into_iter()
        .filter(|affordance| snapshot.qualifies(*affordance))
        .find_map(Affordance::status)
        .unwrap_or(Status::New);

    ReportState {
        status,
        high_priority: snapshot.qualifies(Affordance::HighPriority),
        assignee: reactors
            .and_then(|reactors| reactors.iter().find(|reactor| !reactor.bot))
            .map(|reactor| reactor.id),
        assignee_known: reactors.is_some(),
    }
}
