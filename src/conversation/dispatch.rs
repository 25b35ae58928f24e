use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::conversation::{ConversationTurn, TurnResponse};
use crate::operator_log;

/// Processes one conversational turn for the intent it is registered under.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, turn: &ConversationTurn) -> anyhow::Result<TurnResponse>;
}

pub type DynIntentHandler = Arc<dyn IntentHandler>;

/// Immutable routing table from intent name to handler.
pub struct IntentDispatcher {
    handlers: HashMap<String, DynIntentHandler>,
    default: Option<DynIntentHandler>,
}

#[derive(Default)]
pub struct IntentDispatcherBuilder {
    handlers: HashMap<String, DynIntentHandler>,
    default: Option<DynIntentHandler>,
}

impl IntentDispatcherBuilder {
    /// Registering the same intent twice keeps the last handler.
    pub fn intent(mut self, name: impl Into<String>, handler: impl IntentHandler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Replaces the built-in not-found answer for unknown intents.
    pub fn default_intent(mut self, handler: impl IntentHandler + 'static) -> Self {
        self.default = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> IntentDispatcher {
        IntentDispatcher {
            handlers: self.handlers,
            default: self.default,
        }
    }
}

impl IntentDispatcher {
    pub fn builder() -> IntentDispatcherBuilder {
        IntentDispatcherBuilder::default()
    }

    pub fn intents(&self) -> Vec<&str> {
        let mut names = self.handlers.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Routes the turn. Handler errors are returned as they are.
    pub async fn process(&self, turn: &ConversationTurn) -> anyhow::Result<TurnResponse> {
        if let Some(handler) = self.handlers.get(&turn.intent_name) {
            operator_log::debug(
                module_path!(),
                format!("found handler for intent {}", turn.intent_name),
            );
            return handler.handle(turn).await;
        }
        match &self.default {
            Some(handler) => handler.handle(turn).await,
            None => {
                operator_log::error(
                    module_path!(),
                    format!("intent {} is not handled", turn.intent_name),
                );
                Ok(TurnResponse::not_found())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u16);

    #[async_trait]
    impl IntentHandler for Fixed {
        async fn handle(&self, _turn: &ConversationTurn) -> anyhow::Result<TurnResponse> {
            Ok(TurnResponse::with_status(self.0))
        }
    }

    struct Failing;

    #[async_trait]
    impl IntentHandler for Failing {
        async fn handle(&self, _turn: &ConversationTurn) -> anyhow::Result<TurnResponse> {
            anyhow::bail!("handler exploded")
        }
    }

    fn turn(intent: &str) -> ConversationTurn {
        ConversationTurn {
            session_id: "s".to_string(),
            intent_name: intent.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn routes_to_registered_handler() -> anyhow::Result<()> {
        let dispatcher = IntentDispatcher::builder()
            .intent("A", Fixed(201))
            .intent("B", Fixed(202))
            .build();
        assert_eq!(dispatcher.process(&turn("A")).await?.status, 201);
        assert_eq!(dispatcher.process(&turn("B")).await?.status, 202);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_intent_without_default_is_not_found() -> anyhow::Result<()> {
        let dispatcher = IntentDispatcher::builder()
            .intent("A", Fixed(201))
            .intent("B", Fixed(202))
            .build();
        assert_eq!(dispatcher.process(&turn("C")).await?, TurnResponse::not_found());
        Ok(())
    }

    #[tokio::test]
    async fn default_handler_overrides_not_found() -> anyhow::Result<()> {
        let dispatcher = IntentDispatcher::builder()
            .intent("A", Fixed(201))
            .default_intent(Fixed(299))
            .build();
        assert_eq!(dispatcher.process(&turn("C")).await?.status, 299);
        assert_eq!(dispatcher.process(&turn("A")).await?.status, 201);
        Ok(())
    }

    #[tokio::test]
    async fn last_registration_wins() -> anyhow::Result<()> {
        let dispatcher = IntentDispatcher::builder()
            .intent("A", Fixed(201))
            .intent("A", Fixed(203))
            .build();
        assert_eq!(dispatcher.intents(), vec!["A"]);
        assert_eq!(dispatcher.process(&turn("A")).await?.status, 203);
        Ok(())
    }

    #[tokio::test]
    async fn handler_errors_propagate_unchanged() {
        let dispatcher = IntentDispatcher::builder()
            .intent("A", Failing)
            .default_intent(Fixed(299))
            .build();
        let err = dispatcher.process(&turn("A")).await.unwrap_err();
        assert_eq!(err.to_string(), "handler exploded");
    }
}
