//! In-memory chat surface for tests.

use super::surface::{
    AttachmentRef, Author, ChatSurface, FileUpload, HistoryStream, MessageSnapshot,
    TrackerPermission,
};
use crate::error::{Result, SurfaceError};
use crate::report::{ReactionCount, Reactor, RichEmbed};
use chrono::{DateTime, Utc};
use futures::StreamExt as _;
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const BOT_ID: u64 = 1000;
pub const GUILD_ID: u64 = 1;
pub const REPORT_CHANNEL: u64 = 10;
pub const WEBHOOK_ID: u64 = 50;

#[derive(Debug, Clone)]
pub struct FakeThread {
    pub name: String,
    pub locked: bool,
}

/// A file re-uploaded through `forward_attachment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarded {
    pub channel: ChannelId,
    pub label: String,
    pub filename: String,
}

#[derive(Debug, Default)]
pub struct FakeState {
    /// All messages across channels, oldest first.
    pub messages: Vec<MessageSnapshot>,
    pub reactors: HashMap<(MessageId, String), Vec<Reactor>>,
    pub threads: HashMap<ChannelId, FakeThread>,
    pub downloads: HashMap<String, Vec<u8>>,
    pub uploads: Vec<FileUpload>,
    pub forwarded: Vec<Forwarded>,
    pub deleted: Vec<MessageId>,
    pub permissions: Vec<TrackerPermission>,
    /// Operation names that fail with a request error.
    pub failing: HashSet<&'static str>,
    next_id: u64,
}

#[derive(Debug)]
pub struct FakeSurface {
    pub state: Mutex<FakeState>,
}

impl Default for FakeSurface {
    fn default() -> Self {
        Self::new()
    }
}

fn guard(state: &Mutex<FakeState>) -> std::sync::MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeSurface {
    pub fn new() -> Self {
        let state = FakeState {
            permissions: TrackerPermission::REQUIRED.to_vec(),
            next_id: 5000,
            ..FakeState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        guard(&self.state)
    }

    pub fn fail(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.state().failing.remove(operation);
    }

    /// Insert a message as if another account had posted it.
    pub fn post(
        &self,
        channel: ChannelId,
        author: Author,
        embeds: Vec<RichEmbed>,
        attachments: Vec<AttachmentRef>,
        created_at: DateTime<Utc>,
    ) -> MessageSnapshot {
        let mut state = self.state();
        let id = state.allocate();
        let snapshot = MessageSnapshot {
            id,
            channel_id: channel,
            guild_id: Some(GuildId::new(GUILD_ID)),
            author,
            embeds,
            attachments,
            reactions: Vec::new(),
            thread_id: None,
            in_thread: state.threads.contains_key(&channel),
            created_at,
        };
        state.messages.push(snapshot.clone());
        snapshot
    }

    /// A human adds a reaction.
    pub fn react(&self, message: MessageId, emoji: &str, user: u64) {
        let mut state = self.state();
        state.add_reactor(
            message,
            emoji,
            Reactor {
                id: UserId::new(user),
                bot: false,
            },
        );
    }

    /// A human removes a reaction.
    pub fn unreact(&self, message: MessageId, emoji: &str, user: u64) {
        let mut state = self.state();
        if let Some(reactors) = state.reactors.get_mut(&(message, emoji.to_string())) {
            reactors.retain(|reactor| reactor.id != UserId::new(user));
        }
        if let Some(snapshot) = state.find_mut(message)
            && let Some(reaction) = snapshot.reactions.iter_mut().find(|r| r.emoji == emoji)
        {
            reaction.count = reaction.count.saturating_sub(1);
        }
    }

    pub fn message(&self, message: MessageId) -> Option<MessageSnapshot> {
        self.state()
            .messages
            .iter()
            .find(|snapshot| snapshot.id == message)
            .cloned()
    }

    pub fn messages_in(&self, channel: ChannelId) -> Vec<MessageSnapshot> {
        self.state()
            .messages
            .iter()
            .filter(|snapshot| snapshot.channel_id == channel)
            .cloned()
            .collect()
    }

    pub fn thread(&self, thread: ChannelId) -> Option<FakeThread> {
        self.state().threads.get(&thread).cloned()
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.state().failing.contains(operation) {
            return Err(SurfaceError::Request(format!("{operation} unavailable")).into());
        }
        Ok(())
    }
}

impl FakeState {
    fn allocate(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId::new(self.next_id)
    }

    fn find_mut(&mut self, message: MessageId) -> Option<&mut MessageSnapshot> {
        self.messages.iter_mut().find(|snapshot| snapshot.id == message)
    }

    fn add_reactor(&mut self, message: MessageId, emoji: &str, reactor: Reactor) {
        let Some(snapshot) = self.find_mut(message) else {
            return;
        };
        match snapshot.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(reaction) => reaction.count += 1,
            None => snapshot.reactions.push(ReactionCount {
                emoji: emoji.to_string(),
                count: 1,
            }),
        }
        self.reactors
            .entry((message, emoji.to_string()))
            .or_default()
            .push(reactor);
    }

    fn bot_message(&mut self, channel: ChannelId, embeds: Vec<RichEmbed>) -> &mut MessageSnapshot {
        let id = self.allocate();
        let in_thread = self.threads.contains_key(&channel);
        self.messages.push(MessageSnapshot {
            id,
            channel_id: channel,
            guild_id: Some(GuildId::new(GUILD_ID)),
            author: Author {
                id: UserId::new(BOT_ID),
                name: "bugbot".into(),
                bot: true,
            },
            embeds,
            attachments: Vec::new(),
            reactions: Vec::new(),
            thread_id: None,
            in_thread,
            created_at: Utc::now(),
        });
        let last = self.messages.len() - 1;
        &mut self.messages[last]
    }

    fn newest_first(&self, channel: ChannelId) -> Vec<MessageSnapshot> {
        self.messages
            .iter()
            .rev()
            .filter(|snapshot| snapshot.channel_id == channel)
            .cloned()
            .collect()
    }
}

fn missing(what: &str) -> crate::error::Error {
    SurfaceError::NotFound { what: what.into() }.into()
}

impl ChatSurface for FakeSurface {
    fn bot_user_id(&self) -> UserId {
        UserId::new(BOT_ID)
    }

    async fn fetch_message(&self, _channel: ChannelId, message: MessageId) -> Result<MessageSnapshot> {
        self.check("fetch_message")?;
        self.message(message).ok_or_else(|| missing("message"))
    }

    async fn send_embed(
        &self,
        channel: ChannelId,
        embed: &RichEmbed,
        file: Option<FileUpload>,
    ) -> Result<MessageId> {
        self.check("send_embed")?;
        let mut state = self.state();
        let attachment = file.as_ref().map(|file| AttachmentRef {
            filename: file.filename.clone(),
            url: format!("https://cdn.fake/{}", file.filename),
        });
        let message = state.bot_message(channel, vec![embed.clone()]);
        message.attachments.extend(attachment);
        let id = message.id;
        state.uploads.extend(file);
        Ok(id)
    }

    async fn forward_attachment(
        &self,
        channel: ChannelId,
        label: &str,
        attachment: &AttachmentRef,
    ) -> Result<()> {
        self.check("forward_attachment")?;
        let mut state = self.state();
        state.bot_message(channel, Vec::new()).attachments.push(attachment.clone());
        state.forwarded.push(Forwarded {
            channel,
            label: label.to_string(),
            filename: attachment.filename.clone(),
        });
        Ok(())
    }

    async fn edit_embed(&self, _channel: ChannelId, message: MessageId, embed: &RichEmbed) -> Result<()> {
        self.check("edit_embed")?;
        let mut state = self.state();
        let snapshot = state.find_mut(message).ok_or_else(|| missing("message"))?;
        snapshot.embeds = vec![embed.clone()];
        Ok(())
    }

    async fn add_reaction(&self, _channel: ChannelId, message: MessageId, emoji: &str) -> Result<()> {
        self.check("add_reaction")?;
        let mut state = self.state();
        if state.find_mut(message).is_none() {
            return Err(missing("message"));
        }
        state.add_reactor(
            message,
            emoji,
            Reactor {
                id: UserId::new(BOT_ID),
                bot: true,
            },
        );
        Ok(())
    }

    async fn delete_message(&self, _channel: ChannelId, message: MessageId) -> Result<()> {
        self.check("delete_message")?;
        let mut state = self.state();
        let before = state.messages.len();
        state.messages.retain(|snapshot| snapshot.id != message);
        if state.messages.len() == before {
            return Err(missing("message"));
        }
        state.deleted.push(message);
        Ok(())
    }

    async fn reaction_users(
        &self,
        _channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<Vec<Reactor>> {
        self.check("reaction_users")?;
        Ok(self
            .state()
            .reactors
            .get(&(message, emoji.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_messages(&self, channel: ChannelId, limit: u8) -> Result<Vec<MessageSnapshot>> {
        self.check("recent_messages")?;
        let mut messages = self.state().newest_first(channel);
        messages.truncate(usize::from(limit));
        Ok(messages)
    }

    fn history(&self, channel: ChannelId) -> HistoryStream<'_> {
        let messages = self.state().newest_first(channel);
        futures::stream::iter(messages.into_iter().map(Ok)).boxed()
    }

    async fn create_thread(&self, _channel: ChannelId, message: MessageId, name: &str) -> Result<ChannelId> {
        self.check("create_thread")?;
        let mut state = self.state();
        let thread = ChannelId::new(message.get());
        let snapshot = state.find_mut(message).ok_or_else(|| missing("message"))?;
        snapshot.thread_id = Some(thread);
        state.threads.insert(
            thread,
            FakeThread {
                name: name.to_string(),
                locked: false,
            },
        );
        Ok(thread)
    }

    async fn thread_name(&self, thread: ChannelId) -> Result<String> {
        self.check("thread_name")?;
        self.thread(thread)
            .map(|thread| thread.name)
            .ok_or_else(|| missing("thread"))
    }

    async fn channel_name(&self, channel: ChannelId) -> Result<String> {
        self.check("channel_name")?;
        Ok(format!("channel-{channel}"))
    }

    async fn rename_thread(&self, thread: ChannelId, name: &str) -> Result<()> {
        self.check("rename_thread")?;
        let mut state = self.state();
        let entry = state.threads.get_mut(&thread).ok_or_else(|| missing("thread"))?;
        entry.name = name.to_string();
        Ok(())
    }

    async fn lock_thread(&self, thread: ChannelId) -> Result<()> {
        self.check("lock_thread")?;
        let mut state = self.state();
        let entry = state.threads.get_mut(&thread).ok_or_else(|| missing("thread"))?;
        entry.locked = true;
        Ok(())
    }

    async fn granted_permissions(&self, _guild: GuildId, _channel: ChannelId) -> Result<Vec<TrackerPermission>> {
        self.check("granted_permissions")?;
        Ok(self.state().permissions.clone())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.check("download")?;
        self.state()
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| SurfaceError::Fetch(format!("no body for {url}")).into())
    }
}
