//! One user turn against the session's conversation.

use anyhow::Context;

use crate::llm::{ModelHandle, Part};
use crate::session::{SessionState, Turn};

/// Record `user_text`, send it and record the reply.
///
/// With `attach_files`, every fragment accumulated so far goes out after the
/// text, on every turn. When the service call fails the user turn and its
/// token cost stay recorded and no model turn is appended.
pub async fn submit(
    session: &mut SessionState,
    model: &ModelHandle,
    user_text: &str,
    attach_files: bool,
) -> anyhow::Result<Turn> {
    if session.conversation().is_none() {
        anyhow::bail!("no active conversation for session {}", session.id());
    }

    session.push_turn(Turn::user(user_text));
    session.add_tokens(u64::from(model.count_tokens(user_text).await?));

    let mut outbound = vec![Part::text(user_text)];
    if attach_files {
        outbound.extend(session.fragments().iter().map(|f| f.to_part()));
    }
    let part_count = outbound.len();

    let session_id = session.id().to_string();
    let conversation = session
        .conversation_mut()
        .context("conversation disappeared during turn")?;
    let reply = conversation.send_message(outbound).await.inspect_err(|e| {
        tracing::warn!(session_id = %session_id, error = %e, "Model call failed");
    })?;

    let turn = Turn::model(reply);
    session.push_turn(turn.clone());
    session.add_tokens(u64::from(model.count_tokens(&turn.content).await?));

    tracing::info!(
        name: "chat.turn.completed",
        session_id = %session_id,
        parts = part_count,
        reply_length = turn.content.len(),
        token_total = session.token_total(),
        "Chat turn completed"
    );

    Ok(turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMode, ensure_conversation, ensure_model};
    use crate::ingest::{Fragment, FragmentBody};
    use crate::llm::{LlmDriver, ModelApi, ModelConfig, ScriptedDriver};
    use crate::session::TurnRole;
    use std::sync::Arc;

    async fn active_session(driver: &Arc<ScriptedDriver>) -> (SessionState, ModelHandle) {
        let api = ModelApi::new(Arc::clone(driver) as Arc<dyn LlmDriver>);
        let mut session = SessionState::new("s1");
        session.initialize_if_absent();
        let model = ensure_model(&mut session, &api, &ModelConfig::new("m", 0.5, 100));
        ensure_conversation(&mut session, &model, ChatMode::Files)
            .await
            .unwrap();
        (session, model)
    }

    fn notes_fragment() -> Fragment {
        Fragment {
            source_file_name: "notes.txt".to_string(),
            source_mime_type: "text/plain".to_string(),
            body: FragmentBody::Text("Text file 'notes.txt' content: hello".to_string()),
        }
    }

    #[tokio::test]
    async fn test_file_turn_attaches_fragments() {
        let driver = Arc::new(ScriptedDriver::new());
        driver.push_reply("Let's count together. Now you try!");
        let (mut session, model) = active_session(&driver).await;
        session.record_file("notes.txt", vec![notes_fragment()], 0);
        let before = session.token_total();

        let turn = submit(&mut session, &model, "what's the answer to 4+4?", true)
            .await
            .unwrap();

        assert_eq!(turn.role, TurnRole::Model);
        let sent = driver.requests().pop().unwrap();
        assert_eq!(
            sent.last().unwrap().parts,
            vec![
                Part::text("what's the answer to 4+4?"),
                Part::text("Text file 'notes.txt' content: hello"),
            ]
        );
        assert_eq!(session.transcript().len(), 2);
        assert!(
            session.token_total()
                >= before + u64::from(ScriptedDriver::count_text("what's the answer to 4+4?"))
        );
    }

    #[tokio::test]
    async fn test_converse_turn_sends_text_only() {
        let driver = Arc::new(ScriptedDriver::new());
        let (mut session, model) = active_session(&driver).await;
        session.record_file("notes.txt", vec![notes_fragment()], 0);

        submit(&mut session, &model, "hi", false).await.unwrap();

        let sent = driver.requests().pop().unwrap();
        assert_eq!(sent.last().unwrap().parts, vec![Part::text("hi")]);
    }

    #[tokio::test]
    async fn test_failure_keeps_user_turn_and_cost() {
        let driver = Arc::new(ScriptedDriver::new());
        driver.push_failure("503 service unavailable");
        let (mut session, model) = active_session(&driver).await;
        let before = session.token_total();

        let result = submit(&mut session, &model, "two plus two", false).await;

        assert!(result.is_err());
        assert_eq!(session.transcript(), &[Turn::user("two plus two")]);
        assert_eq!(session.token_total(), before + 3);
        assert_eq!(session.conversation().unwrap().history().len(), 2);
    }

    #[tokio::test]
    async fn test_requires_conversation() {
        let driver = Arc::new(ScriptedDriver::new());
        let api = ModelApi::new(Arc::clone(&driver) as Arc<dyn LlmDriver>);
        let mut session = SessionState::new("s1");
        session.initialize_if_absent();
        let model = ensure_model(&mut session, &api, &ModelConfig::new("m", 0.5, 100));

        assert!(submit(&mut session, &model, "hi", false).await.is_err());
        assert!(session.transcript().is_empty());
    }
}
