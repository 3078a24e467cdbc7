//! Model binding and conversation bootstrap for a session.

use crate::llm::{Content, ModelApi, ModelConfig, ModelHandle, Role};
use crate::session::SessionState;

use super::ChatMode;

/// Opening user turn of every conversation.
pub const SYSTEM_INSTRUCTION: &str = "System instruction: You are a friendly and patient guide for kids! \
Explain concepts in a simple, fun, and engaging way, using examples that kids can understand \
(like toys, animals, or games). Guide the kids through the problem step-by-step, but NEVER give \
the final answer and never solve the problem yourself. Stop at the last step and encourage them \
to calculate the final answer themselves. For example, if the last step is '90 ÷ 0.5', say \
'Now you try! What is 90 ÷ 0.5? I'll be here until you finish!'";

/// Return the model bound to `requested`, rebinding the session if needed.
///
/// An unchanged configuration reuses the existing handle. A new or
/// different one builds a fresh handle and destroys the conversation.
pub fn ensure_model(
    session: &mut SessionState,
    api: &ModelApi,
    requested: &ModelConfig,
) -> ModelHandle {
    if let Some(model) = session.model()
        && model.config() == requested
    {
        return model.clone();
    }

    let model = api.create_model(requested.clone());
    tracing::info!(
        session_id = %session.id(),
        model_id = %model.id(),
        model = %requested.model,
        "Session bound to model"
    );
    session.bind_model(model.clone());
    model
}

/// Start a conversation if the session has none.
///
/// The conversation is seeded with the tutoring instruction and a greeting
/// that depends on `mode`. Both turns are counted before anything is stored,
/// so a counting failure leaves the session untouched.
pub async fn ensure_conversation(
    session: &mut SessionState,
    model: &ModelHandle,
    mode: ChatMode,
) -> anyhow::Result<()> {
    if session.conversation().is_some() {
        return Ok(());
    }

    let greeting = mode.greeting();
    let cost = u64::from(model.count_tokens(SYSTEM_INSTRUCTION).await?)
        + u64::from(model.count_tokens(greeting).await?);

    let conversation = model.start_conversation(vec![
        Content::text(Role::User, SYSTEM_INSTRUCTION),
        Content::text(Role::Model, greeting),
    ]);

    tracing::info!(
        name: "conversation.started",
        session_id = %session.id(),
        conversation_id = %conversation.id(),
        mode = %mode,
        bootstrap_tokens = cost,
        "Conversation started"
    );

    session.set_conversation(conversation);
    session.add_tokens(cost);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmDriver, ScriptedDriver};
    use std::sync::Arc;

    fn setup() -> (Arc<ScriptedDriver>, ModelApi, SessionState) {
        let driver = Arc::new(ScriptedDriver::new());
        let api = ModelApi::new(Arc::clone(&driver) as Arc<dyn LlmDriver>);
        let mut session = SessionState::new("s1");
        session.initialize_if_absent();
        (driver, api, session)
    }

    #[test]
    fn test_unchanged_config_reuses_model() {
        let (_driver, api, mut session) = setup();
        let config = ModelConfig::new("gemini-2.0-flash", 0.55, 8192);

        let first = ensure_model(&mut session, &api, &config);
        let second = ensure_model(&mut session, &api, &config.clone());

        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_any_field_change_rebinds() {
        let (_driver, api, mut session) = setup();
        let base = ModelConfig::new("gemini-2.0-flash", 0.55, 8192);
        let variants = [
            ModelConfig::new("gemini-1.5-pro", 0.55, 8192),
            ModelConfig::new("gemini-2.0-flash", 0.7, 8192),
            ModelConfig::new("gemini-2.0-flash", 0.55, 1024),
        ];

        for changed in variants {
            let model = ensure_model(&mut session, &api, &base);
            ensure_conversation(&mut session, &model, ChatMode::Converse)
                .await
                .unwrap();
            let before = session.conversation().map(|c| c.id());

            let rebound = ensure_model(&mut session, &api, &changed);

            assert_ne!(rebound.id(), model.id());
            assert!(session.conversation().is_none());
            assert!(before.is_some());
        }
    }

    #[tokio::test]
    async fn test_bootstrap_turns_are_counted() {
        let (_driver, api, mut session) = setup();
        let model = ensure_model(&mut session, &api, &ModelConfig::new("m", 0.5, 100));

        ensure_conversation(&mut session, &model, ChatMode::Files)
            .await
            .unwrap();

        let expected = ScriptedDriver::count_text(SYSTEM_INSTRUCTION)
            + ScriptedDriver::count_text(ChatMode::Files.greeting());
        assert_eq!(session.token_total(), u64::from(expected));

        let history = session.conversation().unwrap().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].joined_text(), ChatMode::Files.greeting());

        // Second call is a no-op.
        ensure_conversation(&mut session, &model, ChatMode::Files)
            .await
            .unwrap();
        assert_eq!(session.token_total(), u64::from(expected));
    }

    #[tokio::test]
    async fn test_counting_failure_leaves_no_conversation() {
        let (driver, api, mut session) = setup();
        let model = ensure_model(&mut session, &api, &ModelConfig::new("m", 0.5, 100));
        driver.fail_counting(Some("unavailable"));

        let result = ensure_conversation(&mut session, &model, ChatMode::Converse).await;

        assert!(result.is_err());
        assert!(session.conversation().is_none());
        assert_eq!(session.token_total(), 0);
    }
}
