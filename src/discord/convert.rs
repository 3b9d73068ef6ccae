//! Conversions between serenity models and the tracker's plain data.

use crate::report::{EmbedField, ReactionCount, RichEmbed};
use crate::tracker::surface::{AttachmentRef, Author, MessageSnapshot};
use serenity::all::{
    ChannelId, CreateEmbed, CreateEmbedFooter, Embed, Message, MessageFlags, ReactionType,
    Timestamp,
};

pub fn embed_from(embed: &Embed) -> RichEmbed {
    RichEmbed {
        title: embed.title.clone(),
        description: embed.description.clone(),
        color: embed.colour.map(|colour| colour.0),
        fields: embed
            .fields
            .iter()
            .map(|field| EmbedField::new(&field.name, &field.value, field.inline))
            .collect(),
        image_url: embed.image.as_ref().map(|image| image.url.clone()),
        footer: embed.footer.as_ref().map(|footer| footer.text.clone()),
        timestamp: embed.timestamp.map(|timestamp| *timestamp),
    }
}

pub fn create_embed(embed: &RichEmbed) -> CreateEmbed {
    let mut builder = CreateEmbed::new();
    if let Some(title) = &embed.title {
        builder = builder.title(title);
    }
    if let Some(description) = &embed.description {
        builder = builder.description(description);
    }
    if let Some(color) = embed.color {
        builder = builder.colour(color);
    }
    for field in &embed.fields {
        builder = builder.field(&field.name, &field.value, field.inline);
    }
    if let Some(url) = &embed.image_url {
        builder = builder.image(url);
    }
    if let Some(footer) = &embed.footer {
        builder = builder.footer(CreateEmbedFooter::new(footer));
    }
    if let Some(timestamp) = embed.timestamp {
        builder = builder.timestamp(Timestamp::from(timestamp));
    }
    builder
}

pub fn emoji_text(reaction: &ReactionType) -> String {
    match reaction {
        ReactionType::Unicode(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Snapshot a gateway or REST message. `in_thread` must come from the caller
/// since a message does not say what kind of channel it lives in.
pub fn snapshot(message: &Message, in_thread: bool) -> MessageSnapshot {
    let started_thread = message
        .flags
        .is_some_and(|flags| flags.contains(MessageFlags::HAS_THREAD));
    let thread_id = message
        .thread
        .as_ref()
        .map(|thread| thread.id)
        .or_else(|| started_thread.then(|| ChannelId::new(message.id.get())));

    MessageSnapshot {
        id: message.id,
        channel_id: message.channel_id,
        guild_id: message.guild_id,
        author: Author {
            id: message.author.id,
            name: message.author.name.clone(),
            bot: message.author.bot || message.webhook_id.is_some(),
        },
        embeds: message.embeds.iter().map(embed_from).collect(),
        attachments: message
            .attachments
            .iter()
            .map(|attachment| AttachmentRef {
                filename: attachment.filename.clone(),
                url: attachment.url.clone(),
            })
            .collect(),
        reactions: message
            .reactions
            .iter()
            .map(|reaction| ReactionCount {
                emoji: emoji_text(&reaction.reaction_type),
                count: reaction.count,
            })
            .collect(),
        thread_id,
        in_thread,
        created_at: *message.timestamp,
    }
}
