//! Parsing of the game plugin's webhook embed.
//!
//! Field names are matched by case-sensitive substring on the raw name; the
//! first field matching a category wins. Parsing never fails: absent fields
//! stay `None` and are simply not rendered.

use super::RichEmbed;

/// Description used when the plugin sends none.
pub const MISSING_DESCRIPTION: &str = "No description provided";

/// Structured fields extracted from a plugin embed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginReport {
    pub response_type: Option<String>,
    pub map: Option<String>,
    pub user_id: Option<String>,
    pub location: Option<String>,
    pub description: String,
}

#[derive(Clone, Copy)]
enum Category {
    ResponseType,
    Map,
    UserId,
    Location,
}

fn categorize(name: &str) -> Option<Category> {
    if name.contains("Response Type") {
        Some(Category::ResponseType)
    } else if name.contains("Map") {
        Some(Category::Map)
    } else if name.contains("User ID") {
        Some(Category::UserId)
    } else if name.contains("BugIt") || name.contains("Location") {
        Some(Category::Location)
    } else {
        None
    }
}

/// Extract the structured report fields from a plugin embed.
pub fn parse_plugin_embed(embed: &RichEmbed) -> PluginReport {
    let mut report = PluginReport {
        description: embed
            .description
            .clone()
            .filter(|description| !description.is_empty())
            .unwrap_or_else(|| MISSING_DESCRIPTION.to_string()),
        ..Default::default()
    };

    for field in &embed.fields {
        let Some(category) = categorize(&field.name) else {
            continue;
        };
        let slot = match category {
            Category::ResponseType => &mut report.response_type,
            Category::Map => &mut report.map,
            Category::UserId => &mut report.user_id,
            Category::Location => &mut report.location,
        };
        if slot.is_none() {
            *slot = Some(field.value.trim().to_string());
        }
    }

    tracing::debug!(
        fields = embed.fields.len(),
        response_type = ?report.response_type,
        map = ?report.map,
        has_location = report.location.is_some(),
        "parsed plugin embed"
    );

    report
}

/// Reporter identifier (player or user id) used for block-list checks.
///
/// Runs before full parsing. Backticks and whitespace around the value are
/// stripped; an empty result counts as absent.
pub fn extract_reporter_id(embed: &RichEmbed) -> Option<String> {
    embed
        .fields
        .iter()
        .find(|field| field.name.contains("Player ID") || field.name.contains("User ID"))
        .map(|field| {
            field
                .value
                .trim_matches(|c: char| c == '`' || c.is_whitespace())
                .to_string()
        })
        .filter(|id| !id.is_empty())
}

/// Title for a published report: embed title, else the first description
/// line, else a fixed fallback.
pub fn report_title(embed: &RichEmbed, description: &str) -> String {
    if let Some(title) = embed.title.as_deref().filter(|title| !title.is_empty()) {
        return title.to_string();
    }
    description
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .unwrap_or("Bug Report")
        .to_string()
}
