//! Platform-neutral rich embed, the storage medium of a report.

use super::STATUS_FIELD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named text field inside an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

/// Rich content attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichEmbed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub fields: Vec<EmbedField>,
    pub image_url: Option<String>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RichEmbed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField::new(name, value, inline));
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Value of the first field with exactly this name.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    /// Replace the first field with this name in place, else append it.
    pub fn upsert_field(&mut self, name: &str, value: impl Into<String>, inline: bool) {
        let value = value.into();
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => {
                field.value = value;
                field.inline = inline;
            }
            None => self.fields.push(EmbedField::new(name, value, inline)),
        }
    }
}

/// How a report is currently rendered on its main message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayForm {
    /// All parsed fields plus the tracking fields.
    Full,
    /// Title and Status only; the rest lives in the thread's detail record.
    Compact,
}

impl DisplayForm {
    /// A compact embed carries exactly one field and it is the status.
    pub fn of(embed: &RichEmbed) -> Self {
        match embed.fields.as_slice() {
            [only] if only.name == STATUS_FIELD => DisplayForm::Compact,
            _ => DisplayForm::Full,
        }
    }
}
