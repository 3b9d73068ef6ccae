//! Gateway event handler: translates Discord events into tracker calls.

use super::DiscordSurface;
use super::convert;
use crate::config::TrackerConfig;
use crate::store::GuildStore;
use crate::tracker::commands::CommandReply;
use crate::tracker::{ChatSurface, Disposition, Tracker};
use serenity::all::{
    ChannelType, Command, CommandInteraction, CommandOptionType, Context,
    CreateAutocompleteResponse, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, EventHandler, Guild,
    GuildId, Interaction, Message, MessageUpdateEvent, Permissions, Reaction, Ready, UnavailableGuild,
};
use serenity::async_trait;
use std::sync::{Arc, OnceLock};

const GUILD_ONLY: &str = "This command must be used in a server.";
const ADMIN_ONLY: &str = "You need administrator permissions.";
const COMMAND_FAILED: &str = "Something went wrong while running that command.";

/// Serenity event handler owning the tracker once the gateway is ready.
pub struct Handler {
    store: Arc<GuildStore>,
    config: TrackerConfig,
    client: reqwest::Client,
    tracker: OnceLock<Arc<Tracker<DiscordSurface>>>,
}

impl Handler {
    pub fn new(store: Arc<GuildStore>, config: TrackerConfig, client: reqwest::Client) -> Self {
        Self {
            store,
            config,
            client,
            tracker: OnceLock::new(),
        }
    }

    fn tracker(&self) -> Option<&Arc<Tracker<DiscordSurface>>> {
        self.tracker.get()
    }
}

fn slash_commands() -> Vec<CreateCommand> {
    let identifier = |description: &str| {
        CreateCommandOption::new(CommandOptionType::String, "user_id", description).required(true)
    };

    vec![
        CreateCommand::new("bug_setup")
            .description("Configure the bug report channel for this server")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "channel",
                    "The channel where bug reports will be submitted",
                )
                .channel_types(vec![ChannelType::Text])
                .required(true),
            ),
        CreateCommand::new("bug_block_reporter")
            .description("Block a user/player ID (admin only)")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(identifier("The user/player ID to block")),
        CreateCommand::new("bug_unblock")
            .description("Unblock a user (admin only)")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(identifier("The user/player ID to unblock").set_autocomplete(true)),
        CreateCommand::new("bug_stats").description("Show bug statistics"),
        CreateCommand::new("bug_my_bugs").description("Show bugs assigned to you"),
    ]
}

fn is_admin(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.administrator())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn response_message(reply: &CommandReply) -> CreateInteractionResponseMessage {
    let mut message = CreateInteractionResponseMessage::new().ephemeral(reply.ephemeral);
    if let Some(content) = &reply.content {
        message = message.content(content);
    }
    if let Some(embed) = &reply.embed {
        message = message.embed(convert::create_embed(embed));
    }
    message
}

fn followup_message(reply: &CommandReply) -> CreateInteractionResponseFollowup {
    let mut message = CreateInteractionResponseFollowup::new().ephemeral(reply.ephemeral);
    if let Some(content) = &reply.content {
        message = message.content(content);
    }
    if let Some(embed) = &reply.embed {
        message = message.embed(convert::create_embed(embed));
    }
    message
}

async fn respond(ctx: &Context, command: &CommandInteraction, reply: CommandReply) {
    let response = CreateInteractionResponse::Message(response_message(&reply));
    if let Err(error) = command.create_response(&ctx.http, response).await {
        tracing::warn!(command = %command.data.name, %error, "failed to send command response");
    }
}

fn or_failure(command: &CommandInteraction, result: crate::Result<CommandReply>) -> CommandReply {
    result.unwrap_or_else(|error| {
        tracing::error!(command = %command.data.name, %error, "command failed");
        CommandReply::private(COMMAND_FAILED)
    })
}

impl Handler {
    async fn run_command(
        &self,
        ctx: &Context,
        tracker: &Tracker<DiscordSurface>,
        command: &CommandInteraction,
    ) {
        let Some(guild) = command.guild_id else {
            respond(ctx, command, CommandReply::private(GUILD_ONLY)).await;
            return;
        };
        tracing::info!(guild_id = %guild, command = %command.data.name, user_id = %command.user.id, "command invoked");

        let name = command.data.name.as_str();
        if matches!(name, "bug_setup" | "bug_block_reporter" | "bug_unblock") && !is_admin(command) {
            respond(ctx, command, CommandReply::private(ADMIN_ONLY)).await;
            return;
        }

        let reply = match name {
            "bug_setup" => {
                let channel = command
                    .data
                    .options
                    .iter()
                    .find(|option| option.name == "channel")
                    .and_then(|option| option.value.as_channel_id());
                match channel {
                    Some(channel) => or_failure(command, tracker.configure_channel(guild, channel).await),
                    None => CommandReply::private("Please pick a text channel."),
                }
            }
            "bug_block_reporter" => {
                let identifier = string_option(command, "user_id").unwrap_or_default();
                or_failure(command, tracker.block_reporter(guild, identifier).await)
            }
            "bug_unblock" => {
                let identifier = string_option(command, "user_id").unwrap_or_default();
                or_failure(command, tracker.unblock_reporter(guild, identifier).await)
            }
            "bug_stats" | "bug_my_bugs" => {
                self.run_scan(ctx, tracker, command, guild).await;
                return;
            }
            other => {
                tracing::warn!(command = other, "unknown command");
                return;
            }
        };

        respond(ctx, command, reply).await;
    }

    /// History scans can outlive the interaction deadline, so the response
    /// is deferred and delivered as a followup.
    async fn run_scan(
        &self,
        ctx: &Context,
        tracker: &Tracker<DiscordSurface>,
        command: &CommandInteraction,
        guild: GuildId,
    ) {
        let private = command.data.name == "bug_my_bugs";
        let deferred = if private {
            command.defer_ephemeral(&ctx.http).await
        } else {
            command.defer(&ctx.http).await
        };
        if let Err(error) = deferred {
            tracing::warn!(command = %command.data.name, %error, "failed to defer command");
            return;
        }

        let result = if private {
            tracker.my_bugs(guild, command.user.id).await
        } else {
            tracker.stats(guild).await
        };
        let reply = or_failure(command, result);

        if let Err(error) = command.create_followup(&ctx.http, followup_message(&reply)).await {
            tracing::warn!(command = %command.data.name, %error, "failed to send command followup");
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(bot = %ready.user.name, guilds = ready.guilds.len(), "connected to discord");

        if self.tracker.get().is_none() {
            let surface = DiscordSurface::new(
                ctx.http.clone(),
                ctx.cache.clone(),
                ready.user.id,
                self.client.clone(),
            );
            let tracker = Tracker::new(surface, self.store.clone(), self.config);
            // A concurrent `ready` from another shard may have won the race.
            let _ = self.tracker.set(Arc::new(tracker));
        }

        match Command::set_global_commands(&ctx.http, slash_commands()).await {
            Ok(commands) => tracing::info!(count = commands.len(), "registered slash commands"),
            Err(error) => tracing::error!(%error, "failed to register slash commands"),
        }
    }

    async fn message(&self, _ctx: Context, message: Message) {
        let Some(tracker) = self.tracker() else {
            return;
        };
        let snapshot = convert::snapshot(&message, false);
        if let Disposition::Published(outcome) = tracker.handle_message(&snapshot).await
            && !outcome.failures.is_empty()
        {
            tracing::warn!(
                report_id = %outcome.report.report_message,
                failures = outcome.failures.len(),
                "report published with skipped steps"
            );
        }
    }

    async fn message_update(
        &self,
        _ctx: Context,
        old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let Some(tracker) = self.tracker() else {
            return;
        };
        let bot = tracker.surface().bot_user_id();
        if event.author.as_ref().is_some_and(|author| author.id == bot)
            || event.embeds.as_ref().is_some_and(Vec::is_empty)
        {
            return;
        }

        let before_had_embeds = old_if_available.map(|old| !old.embeds.is_empty());
        let after = match new {
            Some(message) => convert::snapshot(&message, false),
            None => match tracker.surface().fetch_message(event.channel_id, event.id).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    tracing::debug!(message_id = %event.id, %error, "edited message unavailable");
                    return;
                }
            },
        };
        tracker.handle_message_edit(before_had_embeds, &after).await;
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        self.on_reaction(reaction, true).await;
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        self.on_reaction(reaction, false).await;
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // `unavailable` means an outage, not a removal.
        if incomplete.unavailable {
            return;
        }
        if let Some(tracker) = self.tracker() {
            tracker.handle_guild_removed(incomplete.id).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(tracker) = self.tracker() else {
            return;
        };
        match interaction {
            Interaction::Command(command) => self.run_command(&ctx, tracker, &command).await,
            Interaction::Autocomplete(autocomplete) => {
                let Some(guild) = autocomplete.guild_id else {
                    return;
                };
                let typed = autocomplete
                    .data
                    .autocomplete()
                    .map(|option| option.value.to_string())
                    .unwrap_or_default();
                let choices = tracker
                    .blocked_suggestions(guild, &typed)
                    .await
                    .into_iter()
                    .fold(CreateAutocompleteResponse::new(), |response, suggestion| {
                        response.add_string_choice(suggestion.name, suggestion.value)
                    });
                if let Err(error) = autocomplete
                    .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(choices))
                    .await
                {
                    tracing::debug!(%error, "failed to send autocomplete choices");
                }
            }
            _ => {}
        }
    }
}

impl Handler {
    async fn on_reaction(&self, reaction: Reaction, added: bool) {
        let Some(tracker) = self.tracker() else {
            return;
        };
        let Some(user) = reaction.user_id else {
            return;
        };
        let emoji = convert::emoji_text(&reaction.emoji);
        if let Some(outcome) = tracker
            .handle_reaction(reaction.channel_id, reaction.message_id, user, &emoji, added)
            .await
            && !outcome.failures.is_empty()
        {
            tracing::warn!(
                message_id = %reaction.message_id,
                failures = outcome.failures.len(),
                "reconciled with skipped steps"
            );
        }
    }
}
