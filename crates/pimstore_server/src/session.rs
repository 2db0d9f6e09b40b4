//! Per-connection command state machine.
//!
//! A [`Session`] owns one backend connection and executes one command line
//! at a time:
//!
//! ```text
//! Idle → ReadingCommand → Dispatching → ResolvingScope → [Retrieving] →
//! Mutating → Committing → RespondingOk | RespondingError → Idle
//! ```
//!
//! Every line yields exactly one tagged response, preceded by any untagged
//! lines the handler produced.

use crate::error::ServerError;
use crate::handler::{CommandContext, CommandTable, Reply};
use crate::hub::NotificationHub;
use crate::retrieval::ItemRetriever;
use crate::store::Resource;
use pimstore_protocol::{CommandLine, Response, ScopeKind};
use pimstore_storage::Backend;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a session is in the processing of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a command line.
    #[default]
    Idle,
    /// Decoding a command line.
    ReadingCommand,
    /// Looking up the handler for the verb.
    Dispatching,
    /// Turning a selector into entity ids.
    ResolvingScope,
    /// Fetching payload that is not cached locally.
    Retrieving,
    /// Applying changes inside a transaction.
    Mutating,
    /// Committing the transaction.
    Committing,
    /// Sending a successful response.
    RespondingOk,
    /// Sending a failure response.
    RespondingError,
}

/// Selection state carried between commands.
#[derive(Debug, Clone)]
pub(crate) struct SessionData {
    /// Identifier stamped on notifications this session causes.
    pub(crate) id: String,
    /// Resource chosen with `RESSELECT`.
    pub(crate) resource: Option<Resource>,
    /// Collection chosen with `SELECT`.
    pub(crate) collection: Option<i64>,
    state: SessionState,
}

impl SessionData {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource: None,
            collection: None,
            state: SessionState::Idle,
        }
    }

    pub(crate) fn enter(&mut self, state: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?state, "state");
        self.state = state;
    }

    pub(crate) fn resource_name(&self) -> &str {
        self.resource.as_ref().map(|r| r.name.as_str()).unwrap_or("")
    }
}

/// One client connection's command processor.
pub struct Session {
    backend: Box<dyn Backend>,
    hub: Arc<NotificationHub>,
    retriever: ItemRetriever,
    commands: Arc<CommandTable>,
    data: SessionData,
    closed: bool,
}

impl Session {
    /// Creates a session over its own backend connection.
    pub fn new(
        backend: Box<dyn Backend>,
        hub: Arc<NotificationHub>,
        retriever: ItemRetriever,
        commands: Arc<CommandTable>,
    ) -> Self {
        Self {
            backend,
            hub,
            retriever,
            commands,
            data: SessionData::new(),
            closed: false,
        }
    }

    /// Session identifier, random until `LOGIN`.
    pub fn id(&self) -> &str {
        &self.data.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.data.state
    }

    /// Id of the selected collection.
    pub fn selected_collection(&self) -> Option<i64> {
        self.data.collection
    }

    /// Name of the selected resource, empty if none.
    pub fn selected_resource(&self) -> &str {
        self.data.resource_name()
    }

    /// Returns true after `LOGOUT`.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Executes one command line and returns the response lines.
    pub fn handle_line(&mut self, line: &str) -> Vec<Response> {
        self.data.enter(SessionState::ReadingCommand);
        let line = line.trim_end_matches(['\r', '\n']);
        let command = match CommandLine::parse(line) {
            Ok(command) => command,
            Err(e) => {
                let tag = CommandLine::tag_of(line).unwrap_or("*").to_string();
                return self.fail(&tag, ServerError::from(e));
            }
        };

        self.data.enter(SessionState::Dispatching);
        let CommandLine {
            tag,
            verb,
            mut args,
        } = command;
        debug!(session = %self.data.id, %tag, %verb, "command");

        let Some(handler) = self.commands.handler(&verb) else {
            return self.fail(&tag, ServerError::UnknownCommand(verb));
        };
        let mut ctx = CommandContext {
            backend: self.backend.as_ref(),
            hub: &self.hub,
            retriever: &self.retriever,
            commands: &self.commands,
            session: &mut self.data,
            scope_kind: ScopeKind::default(),
        };
        match handler(&mut ctx, &mut args) {
            Ok(reply) => self.succeed(&tag, reply),
            Err(e) => self.fail(&tag, e),
        }
    }

    fn succeed(&mut self, tag: &str, reply: Reply) -> Vec<Response> {
        self.data.enter(SessionState::RespondingOk);
        let Reply {
            untagged,
            text,
            close,
        } = reply;
        let mut out: Vec<Response> = untagged.into_iter().map(Response::untagged).collect();
        out.push(Response::ok(tag, text));
        self.closed |= close;
        self.data.enter(SessionState::Idle);
        out
    }

    fn fail(&mut self, tag: &str, error: ServerError) -> Vec<Response> {
        self.data.enter(SessionState::RespondingError);
        if error.is_server_error() {
            warn!(session = %self.data.id, %tag, error = %error, "command failed");
        } else {
            debug!(session = %self.data.id, %tag, error = %error, "command rejected");
        }
        let response = Response::tagged(tag, error.status(), error.to_string());
        self.data.enter(SessionState::Idle);
        vec![response]
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("data", &self.data)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
