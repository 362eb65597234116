//! Command router: maps chat commands onto dispatcher operations.
//!
//! The router owns every authorization decision. Commands from any room
//! other than the configured one are ignored; admin commands need the admin
//! role. The dispatcher itself trusts whatever reaches it.

use std::sync::Arc;

use dungeon_core::destination::Destination;
use dungeon_core::error::GameError;
use dungeon_core::voice::VoiceDirectory;
use dungeon_dispatch::Dispatcher;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CommandError;

/// Operations reachable from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Submit a player action.
    Next,
    /// Undo the latest turn.
    Revert,
    /// Discard the story.
    NewGame,
    /// Clear the story back to its preamble.
    Restart,
    /// Save the story.
    Save,
    /// Load a saved story.
    Load,
    /// Save and shut down.
    Exit,
    /// Mirror results to the room's voice channel.
    Join,
    /// Stop mirroring results.
    Leave,
}

/// One row of the command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Name the command is invoked by.
    pub name: &'static str,
    /// The operation it runs.
    pub command: Command,
    /// Whether the admin role is required.
    pub admin_only: bool,
    /// Argument used when none is given.
    pub default_args: Option<&'static str>,
}

/// Every command the router accepts.
pub const COMMAND_TABLE: [CommandSpec; 9] = [
    spec("next", Command::Next, false, Some("continue")),
    spec("revert", Command::Revert, false, None),
    spec("newgame", Command::NewGame, true, None),
    spec("restart", Command::Restart, false, None),
    spec("save", Command::Save, false, None),
    spec("load", Command::Load, true, Some("id")),
    spec("exit", Command::Exit, true, None),
    spec("join", Command::Join, false, None),
    spec("leave", Command::Leave, false, None),
];

const fn spec(
    name: &'static str,
    command: Command,
    admin_only: bool,
    default_args: Option<&'static str>,
) -> CommandSpec {
    CommandSpec {
        name,
        command,
        admin_only,
        default_args,
    }
}

/// Looks up `name` in the command table, ignoring case and surrounding
/// whitespace.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    let name = name.trim();
    COMMAND_TABLE
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// A command as received from the chat platform.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The command name.
    pub command: String,
    /// Platform identifier of the room it came from.
    pub room_id: Destination,
    /// Human-readable name of that room.
    pub room_name: String,
    /// The invoker's role names.
    pub roles: Vec<String>,
    /// Free text following the command, if any.
    pub args: Option<String>,
}

/// What the router did with an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Not from the game room; nothing happened.
    Ignored,
    /// The operation ran, or for `next` was queued.
    Accepted {
        /// Set for queued actions.
        correlation_id: Option<Uuid>,
        /// Text produced synchronously by the operation.
        replies: Vec<String>,
    },
}

impl Routed {
    fn replies(replies: Vec<String>) -> Self {
        Self::Accepted {
            correlation_id: None,
            replies,
        }
    }
}

/// Who may run what, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    /// The only room name commands are accepted from.
    pub channel: String,
    /// Role needed for admin commands.
    pub admin_role: String,
}

impl RoutePolicy {
    /// Checks whether `invocation` may run `spec`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Unauthorized` when the command is admin-only
    /// and the invoker lacks the admin role.
    pub fn authorize(&self, spec: &CommandSpec, invocation: &Invocation) -> Result<(), CommandError> {
        if !spec.admin_only || invocation.roles.iter().any(|r| *r == self.admin_role) {
            return Ok(());
        }
        Err(CommandError::Unauthorized {
            command: spec.name.to_owned(),
            role: self.admin_role.clone(),
        })
    }

    fn accepts_room(&self, room_name: &str) -> bool {
        room_name == self.channel
    }
}

/// Adapter from chat commands to dispatcher operations.
pub struct CommandRouter {
    dispatcher: Dispatcher,
    policy: RoutePolicy,
    voice_directory: Option<Arc<dyn VoiceDirectory>>,
}

impl CommandRouter {
    /// Creates a router over `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, policy: RoutePolicy) -> Self {
        Self {
            dispatcher,
            policy,
            voice_directory: None,
        }
    }

    /// Uses `directory` to find the voice connection `join` binds to.
    #[must_use]
    pub fn with_voice_directory(mut self, directory: Arc<dyn VoiceDirectory>) -> Self {
        self.voice_directory = Some(directory);
        self
    }

    /// Runs `invocation`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` when the command is unknown, the invoker is not
    /// authorized, or the dispatcher rejects the operation.
    pub async fn route(&self, invocation: Invocation) -> Result<Routed, CommandError> {
        if !self.policy.accepts_room(&invocation.room_name) {
            debug!(room = %invocation.room_name, command = %invocation.command, "ignoring command outside game room");
            return Ok(Routed::Ignored);
        }

        let spec = lookup(&invocation.command)
            .ok_or_else(|| CommandError::UnknownCommand(invocation.command.clone()))?;
        self.policy.authorize(spec, &invocation)?;

        let room = &invocation.room_id;
        let args = invocation
            .args
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .or(spec.default_args)
            .unwrap_or_default()
            .to_owned();
        info!(command = spec.name, destination = %room, "routing command");

        let routed = match spec.command {
            Command::Next => {
                let request = self.dispatcher.submit(room.clone(), args)?;
                Routed::Accepted {
                    correlation_id: Some(request.correlation_id),
                    replies: Vec::new(),
                }
            }
            Command::Revert => Routed::replies(vec![self.dispatcher.revert(room).await?]),
            Command::NewGame => {
                self.dispatcher.new_game(room).await;
                Routed::replies(Vec::new())
            }
            Command::Restart => Routed::replies(vec![self.dispatcher.restart(room).await?]),
            Command::Save => Routed::replies(vec![self.dispatcher.save(room).await?]),
            Command::Load => {
                self.dispatcher.load(room, &args).await?;
                Routed::replies(Vec::new())
            }
            Command::Exit => {
                let saved = self.dispatcher.exit(room).await?;
                Routed::replies(saved.into_iter().collect())
            }
            Command::Join => {
                let connection = self
                    .voice_directory
                    .as_ref()
                    .and_then(|directory| directory.connection_for(room))
                    .ok_or_else(|| GameError::invalid("You are not connected to a voice channel."))?;
                self.dispatcher.join_voice(room, &connection).await?;
                Routed::replies(Vec::new())
            }
            Command::Leave => {
                self.dispatcher.leave_voice(room).await?;
                Routed::replies(Vec::new())
            }
        };
        Ok(routed)
    }
}
