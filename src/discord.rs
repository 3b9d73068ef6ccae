//! Discord adapter: gateway events in, REST calls out.

mod convert;
mod handler;
mod surface;

pub use handler::Handler;
pub use surface::DiscordSurface;

use serenity::all::GatewayIntents;

/// Gateway intents the tracker depends on. Message content is privileged.
pub const INTENTS: GatewayIntents = GatewayIntents::GUILDS
    .union(GatewayIntents::GUILD_MESSAGES)
    .union(GatewayIntents::MESSAGE_CONTENT)
    .union(GatewayIntents::GUILD_MESSAGE_REACTIONS)
    .union(GatewayIntents::GUILD_MEMBERS);
