//! The chat-surface seam: every external effect the tracker performs.

use crate::error::Result;
use crate::report::{ReactionCount, Reactor, RichEmbed};
use chrono::{DateTime, Utc};
use futures::Stream;
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use std::pin::Pin;

/// Lazily paged channel history, newest first.
pub type HistoryStream<'a> = Pin<Box<dyn Stream<Item = Result<MessageSnapshot>> + Send + 'a>>;

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    /// Bot accounts and webhooks.
    pub bot: bool,
}

/// A file attached to a message on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub filename: String,
    pub url: String,
}

/// Bytes to upload alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Point-in-time view of a message.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: Author,
    pub embeds: Vec<RichEmbed>,
    pub attachments: Vec<AttachmentRef>,
    pub reactions: Vec<ReactionCount>,
    /// Thread started from this message, if any.
    pub thread_id: Option<ChannelId>,
    /// The message itself lives inside a thread channel.
    pub in_thread: bool,
    pub created_at: DateTime<Utc>,
}

/// Channel permissions the tracker needs to operate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerPermission {
    ViewChannel,
    SendMessages,
    ManageMessages,
    AddReactions,
    CreatePublicThreads,
    ManageThreads,
}

impl TrackerPermission {
    pub const REQUIRED: [TrackerPermission; 6] = [
        TrackerPermission::ViewChannel,
        TrackerPermission::SendMessages,
        TrackerPermission::ManageMessages,
        TrackerPermission::AddReactions,
        TrackerPermission::CreatePublicThreads,
        TrackerPermission::ManageThreads,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TrackerPermission::ViewChannel => "View Channel",
            TrackerPermission::SendMessages => "Send Messages",
            TrackerPermission::ManageMessages => "Manage Messages",
            TrackerPermission::AddReactions => "Add Reactions",
            TrackerPermission::CreatePublicThreads => "Create Public Threads",
            TrackerPermission::ManageThreads => "Manage Threads",
        }
    }
}

/// External collaborator that delivers and mutates chat state.
///
/// Every method is a single platform call; retries and timeouts are the
/// implementation's business. The tracker treats each call as best-effort.
pub trait ChatSurface: Send + Sync + 'static {
    /// Account the tracker posts as.
    fn bot_user_id(&self) -> UserId;

    fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> impl std::future::Future<Output = Result<MessageSnapshot>> + Send;

    /// Post an embed, optionally with one uploaded file.
    fn send_embed(
        &self,
        channel: ChannelId,
        embed: &RichEmbed,
        file: Option<FileUpload>,
    ) -> impl std::future::Future<Output = Result<MessageId>> + Send;

    /// Re-upload an existing attachment into `channel` with a text label.
    fn forward_attachment(
        &self,
        channel: ChannelId,
        label: &str,
        attachment: &AttachmentRef,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace a message's embeds with this one.
    fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: &RichEmbed,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Users who reacted with `emoji`, in platform order.
    fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Reactor>>> + Send;

    /// The newest `limit` messages of a channel or thread.
    fn recent_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> impl std::future::Future<Output = Result<Vec<MessageSnapshot>>> + Send;

    /// Full channel history as a lazy stream.
    fn history(&self, channel: ChannelId) -> HistoryStream<'_>;

    /// Open a public thread on a message and return its id.
    fn create_thread(
        &self,
        channel: ChannelId,
        message: MessageId,
        name: &str,
    ) -> impl std::future::Future<Output = Result<ChannelId>> + Send;

    fn thread_name(
        &self,
        thread: ChannelId,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    /// Display name of a guild channel, without the `#`.
    fn channel_name(
        &self,
        channel: ChannelId,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    fn rename_thread(
        &self,
        thread: ChannelId,
        name: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Lock a thread without archiving it.
    fn lock_thread(&self, thread: ChannelId) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Which of the required permissions the bot holds in a channel.
    fn granted_permissions(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> impl std::future::Future<Output = Result<Vec<TrackerPermission>>> + Send;

    /// Fetch a URL's body.
    fn download(&self, url: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}
