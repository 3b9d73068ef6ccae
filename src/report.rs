//! Bug report model: embeds, plugin payload parsing, reaction-derived state
//! and thread naming. Everything here is pure and platform independent.

pub mod embed;
pub mod parser;
pub mod status;
pub mod thread_title;

pub use embed::{DisplayForm, EmbedField, RichEmbed};
pub use parser::{PluginReport, extract_reporter_id, parse_plugin_embed};
pub use status::{
    Affordance, ReactionCount, ReactionSnapshot, Reactor, ReportState, Status, derive_state,
};

/// Name of the tracking field holding the derived status.
pub const STATUS_FIELD: &str = "Status";

/// Name of the tracking field holding the assignee mention.
pub const ASSIGNEE_FIELD: &str = "Assigned to";

/// Name of the tracking field holding the priority label.
pub const PRIORITY_FIELD: &str = "Priority";

/// Sentinel title of the thread message that archives a report's full fields.
pub const DETAIL_TITLE: &str = "Bug Report Details";

/// Footer prefix every published report carries.
pub const FOOTER_PREFIX: &str = "Reported via ";

/// Neutral color used when the plugin sends none.
pub const FALLBACK_COLOR: u32 = 0x95a5a6;

/// Platform limit on thread names.
pub const THREAD_NAME_LIMIT: usize = 100;

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// True when a field belongs to the tracking set rewritten on every reconcile.
pub fn is_tracking_field(name: &str) -> bool {
    matches!(name, STATUS_FIELD | ASSIGNEE_FIELD | PRIORITY_FIELD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("🧑‍💻abc", 3), "🧑‍💻");
    }

    #[test]
    fn tracking_fields_are_exact_names() {
        assert!(is_tracking_field("Status"));
        assert!(is_tracking_field("Assigned to"));
        assert!(is_tracking_field("Priority"));
        assert!(!is_tracking_field("Status "));
        assert!(!is_tracking_field("Map"));
    }
}
