//! serenity-backed [`ChatSurface`].

use super::convert;
use crate::error::{Error, Result, SurfaceError};
use crate::report::{Reactor, RichEmbed};
use crate::tracker::surface::{
    AttachmentRef, ChatSurface, FileUpload, HistoryStream, MessageSnapshot, TrackerPermission,
};
use futures::StreamExt as _;
use serenity::all::{
    AutoArchiveDuration, Cache, Channel, ChannelId, CreateAttachment, CreateMessage, CreateThread,
    EditMessage, EditThread, GetMessages, GuildChannel, GuildId, Http, HttpError, MessageId,
    Permissions, ReactionType, UserId,
};
use std::sync::Arc;

/// Discord caps reaction-user pages at 100.
const REACTION_PAGE: u8 = 100;

/// Chat surface over Discord's REST API and gateway cache.
#[derive(Clone)]
pub struct DiscordSurface {
    http: Arc<Http>,
    cache: Arc<Cache>,
    client: reqwest::Client,
    bot_id: UserId,
}

impl std::fmt::Debug for DiscordSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSurface")
            .field("bot_id", &self.bot_id)
            .finish_non_exhaustive()
    }
}

/// Map a serenity error. A 404 from the API becomes `NotFound`.
fn surface_error(what: &str, error: serenity::Error) -> Error {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error
        && response.status_code.as_u16() == 404
    {
        return SurfaceError::NotFound { what: what.into() }.into();
    }
    SurfaceError::Request(format!("{what}: {error}")).into()
}

fn unicode(emoji: &str) -> ReactionType {
    ReactionType::Unicode(emoji.to_string())
}

fn granted(permissions: Permissions) -> Vec<TrackerPermission> {
    TrackerPermission::REQUIRED
        .into_iter()
        .filter(|permission| match permission {
            TrackerPermission::ViewChannel => permissions.view_channel(),
            TrackerPermission::SendMessages => permissions.send_messages(),
            TrackerPermission::ManageMessages => permissions.manage_messages(),
            TrackerPermission::AddReactions => permissions.add_reactions(),
            TrackerPermission::CreatePublicThreads => permissions.create_public_threads(),
            TrackerPermission::ManageThreads => permissions.manage_threads(),
        })
        .collect()
}

impl DiscordSurface {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, bot_id: UserId, client: reqwest::Client) -> Self {
        Self {
            http,
            cache,
            client,
            bot_id,
        }
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn cache_http(&self) -> (&Arc<Cache>, &Http) {
        (&self.cache, self.http.as_ref())
    }

    async fn guild_channel(&self, channel: ChannelId, what: &str) -> Result<GuildChannel> {
        match channel.to_channel(self.cache_http()).await {
            Ok(Channel::Guild(channel)) => Ok(channel),
            Ok(_) => Err(SurfaceError::NotFound { what: what.into() }.into()),
            Err(error) => Err(surface_error(what, error)),
        }
    }

    async fn is_thread(&self, channel: ChannelId) -> bool {
        self.guild_channel(channel, "channel")
            .await
            .is_ok_and(|channel| channel.thread_metadata.is_some())
    }
}

impl ChatSurface for DiscordSurface {
    fn bot_user_id(&self) -> UserId {
        self.bot_id
    }

    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> Result<MessageSnapshot> {
        let fetched = channel
            .message(self.cache_http(), message)
            .await
            .map_err(|error| surface_error("message", error))?;
        let in_thread = self.is_thread(channel).await;
        Ok(convert::snapshot(&fetched, in_thread))
    }

    async fn send_embed(
        &self,
        channel: ChannelId,
        embed: &RichEmbed,
        file: Option<FileUpload>,
    ) -> Result<MessageId> {
        let mut builder = CreateMessage::new().embed(convert::create_embed(embed));
        if let Some(file) = file {
            builder = builder.add_file(CreateAttachment::bytes(file.data, file.filename));
        }
        let sent = channel
            .send_message(self.http(), builder)
            .await
            .map_err(|error| surface_error("channel", error))?;
        Ok(sent.id)
    }

    async fn forward_attachment(
        &self,
        channel: ChannelId,
        label: &str,
        attachment: &AttachmentRef,
    ) -> Result<()> {
        let data = self.download(&attachment.url).await?;
        let builder = CreateMessage::new()
            .content(label)
            .add_file(CreateAttachment::bytes(data, attachment.filename.clone()));
        channel
            .send_message(self.http(), builder)
            .await
            .map_err(|error| surface_error("thread", error))?;
        Ok(())
    }

    async fn edit_embed(&self, channel: ChannelId, message: MessageId, embed: &RichEmbed) -> Result<()> {
        channel
            .edit_message(
                self.http(),
                message,
                EditMessage::new().embed(convert::create_embed(embed)),
            )
            .await
            .map_err(|error| surface_error("message", error))?;
        Ok(())
    }

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> Result<()> {
        channel
            .create_reaction(self.http(), message, unicode(emoji))
            .await
            .map_err(|error| surface_error("message", error))
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        channel
            .delete_message(self.http(), message)
            .await
            .map_err(|error| surface_error("message", error))
    }

    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<Vec<Reactor>> {
        let mut reactors = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = channel
                .reaction_users(self.http(), message, unicode(emoji), Some(REACTION_PAGE), after)
                .await
                .map_err(|error| surface_error("message", error))?;
            let full_page = page.len() == usize::from(REACTION_PAGE);
            after = page.last().map(|user| user.id);
            reactors.extend(page.into_iter().map(|user| Reactor {
                id: user.id,
                bot: user.bot,
            }));
            if !full_page {
                return Ok(reactors);
            }
        }
    }

    async fn recent_messages(&self, channel: ChannelId, limit: u8) -> Result<Vec<MessageSnapshot>> {
        let messages = channel
            .messages(self.http(), GetMessages::new().limit(limit))
            .await
            .map_err(|error| surface_error("channel", error))?;
        Ok(messages
            .iter()
            .map(|message| convert::snapshot(message, false))
            .collect())
    }

    fn history(&self, channel: ChannelId) -> HistoryStream<'_> {
        channel
            .messages_iter(self.http.clone())
            .map(|message| {
                message
                    .map(|message| convert::snapshot(&message, false))
                    .map_err(|error| surface_error("channel", error))
            })
            .boxed()
    }

    async fn create_thread(&self, channel: ChannelId, message: MessageId, name: &str) -> Result<ChannelId> {
        let builder = CreateThread::new(name).auto_archive_duration(AutoArchiveDuration::OneDay);
        let thread = channel
            .create_thread_from_message(self.http(), message, builder)
            .await
            .map_err(|error| surface_error("message", error))?;
        Ok(thread.id)
    }

    async fn thread_name(&self, thread: ChannelId) -> Result<String> {
        Ok(self.guild_channel(thread, "thread").await?.name)
    }

    async fn channel_name(&self, channel: ChannelId) -> Result<String> {
        Ok(self.guild_channel(channel, "channel").await?.name)
    }

    async fn rename_thread(&self, thread: ChannelId, name: &str) -> Result<()> {
        thread
            .edit_thread(self.http(), EditThread::new().name(name))
            .await
            .map_err(|error| surface_error("thread", error))?;
        Ok(())
    }

    async fn lock_thread(&self, thread: ChannelId) -> Result<()> {
        thread
            .edit_thread(self.http(), EditThread::new().locked(true).archived(false))
            .await
            .map_err(|error| surface_error("thread", error))?;
        Ok(())
    }

    async fn granted_permissions(&self, guild: GuildId, channel: ChannelId) -> Result<Vec<TrackerPermission>> {
        let member = guild
            .member(self.cache_http(), self.bot_id)
            .await
            .map_err(|error| surface_error("member", error))?;
        let channel = self.guild_channel(channel, "channel").await?;

        let permissions = self
            .cache
            .guild(guild)
            .map(|guild| guild.user_permissions_in(&channel, &member))
            .ok_or_else(|| SurfaceError::NotFound {
                what: "guild".into(),
            })?;
        Ok(granted(permissions))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| SurfaceError::Fetch(error.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|error| SurfaceError::Fetch(error.to_string()))?;
        Ok(body.to_vec())
    }
}
