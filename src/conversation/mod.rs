//! Multi-turn collection of workshop parameters.
//!
//! No session is held here: every turn carries the contexts produced by the
//! previous one and each step hands back the updated context for the
//! conversational platform to replay.

use std::collections::BTreeMap;

pub mod dispatch;
pub mod steps;

pub use dispatch::{IntentDispatcher, IntentDispatcherBuilder, IntentHandler};
pub use steps::{conversation_dispatcher, ConversationDefaults};

/// Short name of the context the steps accumulate into.
pub const ACCOUNTS_CONTEXT: &str = "accounts-info";
pub const CONTEXT_LIFESPAN: u32 = 5;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationContext {
    /// Fully qualified: `{session}/contexts/{short name}`.
    pub name: String,
    pub lifespan_count: u32,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct ConversationTurn {
    pub session_id: String,
    pub intent_name: String,
    pub parameters: BTreeMap<String, String>,
    pub output_contexts: Vec<ConversationContext>,
}

impl ConversationTurn {
    pub fn context_name(&self, short_name: &str) -> String {
        format!("{}/contexts/{}", self.session_id, short_name)
    }

    pub fn context(&self, short_name: &str) -> Option<&ConversationContext> {
        let name = self.context_name(short_name);
        self.output_contexts.iter().find(|context| context.name == name)
    }

    /// Non-blank input parameter of this turn.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Copy of the accumulated context with `entries` written over it. Keys
    /// the caller does not set are carried forward untouched.
    pub fn accumulate<'a>(
        &self,
        short_name: &str,
        entries: impl IntoIterator<Item = (&'a str, String)>,
    ) -> ConversationContext {
        let mut parameters = self
            .context(short_name)
            .map(|context| context.parameters.clone())
            .unwrap_or_default();
        for (key, value) in entries {
            parameters.insert(key.to_string(), value);
        }
        ConversationContext {
            name: self.context_name(short_name),
            lifespan_count: CONTEXT_LIFESPAN,
            parameters,
        }
    }
}

/// Asks the platform to fire another intent right away, without waiting for
/// user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowupEvent {
    pub name: String,
    pub language_code: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnResponse {
    pub status: u16,
    pub output_contexts: Vec<ConversationContext>,
    pub followup: Option<FollowupEvent>,
}

impl TurnResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            output_contexts: Vec::new(),
            followup: None,
        }
    }

    pub fn ok() -> Self {
        Self::with_status(200)
    }

    pub fn bad_request() -> Self {
        Self::with_status(400)
    }

    pub fn not_found() -> Self {
        Self::with_status(404)
    }

    pub fn context(mut self, context: ConversationContext) -> Self {
        self.output_contexts.push(context);
        self
    }

    pub fn followup(mut self, event: FollowupEvent) -> Self {
        self.followup = Some(event);
        self
    }
}
