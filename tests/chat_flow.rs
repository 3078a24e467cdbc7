//! End-to-end interaction passes against the scripted model driver.

use std::sync::Arc;

use tutor_chat::chat::{ChatMode, SYSTEM_INSTRUCTION};
use tutor_chat::config::{ImageCosting, ModelSection, PdfConfig, RequestedSettings};
use tutor_chat::file_processing::UploadedFile;
use tutor_chat::ingest::{FileIngestor, FragmentKind};
use tutor_chat::interaction::{ChatService, Interaction};
use tutor_chat::llm::{LlmDriver, ModelApi, Part, Role, ScriptedDriver};
use tutor_chat::session::{Lifecycle, SessionState, TurnRole};

fn models() -> ModelSection {
    ModelSection {
        allowed_models: vec!["gemini-2.0-flash".to_string(), "gemini-1.5-pro".to_string()],
        default_model: "gemini-2.0-flash".to_string(),
        default_temperature: 0.55,
        default_max_output_tokens: 8192,
        min_output_tokens: 50,
        max_output_tokens: 8192,
        image_costing: ImageCosting::Placeholder,
    }
}

fn setup() -> (Arc<ScriptedDriver>, ChatService) {
    let driver = Arc::new(ScriptedDriver::new());
    let service = ChatService::new(
        ModelApi::new(Arc::clone(&driver) as Arc<dyn LlmDriver>),
        FileIngestor::new(PdfConfig::default(), ImageCosting::Placeholder),
        models(),
    );
    (driver, service)
}

fn count(text: &str) -> u64 {
    u64::from(ScriptedDriver::count_text(text))
}

fn bootstrap_cost(mode: ChatMode) -> u64 {
    count(SYSTEM_INSTRUCTION) + count(mode.greeting())
}

fn upload(files: Vec<UploadedFile>) -> Interaction {
    Interaction {
        mode: Some(ChatMode::Files),
        files,
        ..Default::default()
    }
}

fn say(text: &str) -> Interaction {
    Interaction {
        message: Some(text.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_notes_upload_then_file_question() {
    let (driver, service) = setup();
    driver.push_reply("Count 4 apples, then 4 more. Now you try: how many apples?");
    let mut session = SessionState::new("s1");

    let view = service
        .run_pass(
            &mut session,
            upload(vec![UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec())]),
        )
        .await
        .unwrap();
    assert_eq!(view.processed_file_names, vec!["notes.txt"]);
    assert_eq!(session.fragments().len(), 1);
    assert_eq!(
        session.fragments()[0].to_part(),
        Part::text("Text file 'notes.txt' content: hello")
    );
    let after_upload = view.token_total;

    let view = service
        .run_pass(&mut session, say("what's the answer to 4+4?"))
        .await
        .unwrap();

    let sent = driver.requests().pop().unwrap();
    let outbound = sent.last().unwrap();
    assert_eq!(outbound.role, Role::User);
    assert_eq!(
        outbound.parts,
        vec![
            Part::text("what's the answer to 4+4?"),
            Part::text("Text file 'notes.txt' content: hello"),
        ]
    );
    assert_eq!(view.transcript.len(), 2);
    assert_eq!(view.transcript[0].role, TurnRole::User);
    assert_eq!(view.transcript[1].role, TurnRole::Model);
    assert!(view.token_total >= after_upload + count("what's the answer to 4+4?"));
}

#[tokio::test]
async fn test_token_total_is_sum_of_all_costs() {
    let (driver, service) = setup();
    driver.push_reply("Let's split it into tens. Now you try!");
    let mut session = SessionState::new("s1");
    let notes = "Text file 'notes.txt' content: three little pigs";
    let zip = "File 'homework.zip' (application/zip): processing not supported.";

    service
        .run_pass(
            &mut session,
            upload(vec![
                UploadedFile::new("notes.txt", "text/plain", b"three little pigs".to_vec()),
                UploadedFile::new("homework.zip", "application/zip", b"PK\x03\x04".to_vec()),
                UploadedFile::new("cat.png", "image/png", vec![0u8; 2048]),
            ]),
        )
        .await
        .unwrap();
    let view = service.run_pass(&mut session, say("help with 23+19")).await.unwrap();

    let expected = bootstrap_cost(ChatMode::Files)
        + count(notes)
        + count(zip)
        + count("Placeholder for cat.png")
        + count("help with 23+19")
        + count("Let's split it into tens. Now you try!");
    assert_eq!(view.token_total, expected);

    let kinds: Vec<FragmentKind> = view.file_contents.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![FragmentKind::Text, FragmentKind::Text, FragmentKind::BinaryMedia]
    );
}

#[tokio::test]
async fn test_reuploading_same_names_never_reingests() {
    let (_driver, service) = setup();
    let mut session = SessionState::new("s1");
    let names = ["a.txt", "b.txt", "c.csv"];

    for _ in 0..3 {
        let files = names
            .iter()
            .map(|n| UploadedFile::new(*n, "", b"x,y".to_vec()))
            .collect();
        service.run_pass(&mut session, upload(files)).await.unwrap();
    }

    assert_eq!(session.processed_file_names().count(), names.len());
    assert_eq!(session.fragments().len(), names.len());
}

#[tokio::test]
async fn test_config_change_recreates_conversation_only_when_changed() {
    let (_driver, service) = setup();
    let mut session = SessionState::new("s1");

    service.run_pass(&mut session, say("hi")).await.unwrap();
    let first = session.conversation().unwrap().id();

    service.run_pass(&mut session, say("again")).await.unwrap();
    assert_eq!(session.conversation().unwrap().id(), first);
    assert_eq!(session.conversation().unwrap().history().len(), 6);

    let changed = Interaction {
        settings: RequestedSettings {
            max_output_tokens: Some(1000),
            ..Default::default()
        },
        ..Default::default()
    };
    service.run_pass(&mut session, changed).await.unwrap();

    let second = session.conversation().unwrap();
    assert_ne!(second.id(), first);
    assert_eq!(second.history().len(), 2);
    assert_eq!(second.model().config().max_output_tokens, 1000);
    // The visible transcript survives a rebinding.
    assert_eq!(session.transcript().len(), 4);
}

#[tokio::test]
async fn test_service_failure_keeps_user_turn() {
    let (driver, service) = setup();
    driver.push_failure("model overloaded");
    let mut session = SessionState::new("s1");
    service.run_pass(&mut session, Interaction::default()).await.unwrap();
    let before = session.token_total();

    let view = service
        .run_pass(&mut session, say("what is 90 / 0.5?"))
        .await
        .unwrap();

    assert_eq!(view.error.as_deref(), Some("model overloaded"));
    assert_eq!(view.transcript.len(), 1);
    assert_eq!(view.token_total, before + count("what is 90 / 0.5?"));

    // The next turn works and extends the same conversation.
    let view = service.run_pass(&mut session, say("try again")).await.unwrap();
    assert!(view.error.is_none());
    assert_eq!(view.transcript.len(), 3);
}

#[tokio::test]
async fn test_new_session_clears_state() {
    let (_driver, service) = setup();
    let mut session = SessionState::new("s1");
    service
        .run_pass(
            &mut session,
            upload(vec![UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec())]),
        )
        .await
        .unwrap();
    service.run_pass(&mut session, say("hello?")).await.unwrap();

    session.reset();

    assert!(session.transcript().is_empty());
    assert!(session.fragments().is_empty());
    assert_eq!(session.processed_file_names().count(), 0);
    assert_eq!(session.token_total(), 0);
    assert!(session.conversation().is_none());
    assert_eq!(session.lifecycle(), Lifecycle::Initialized);

    // The same file is accepted again after a reset.
    let view = service
        .run_pass(
            &mut session,
            upload(vec![UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec())]),
        )
        .await
        .unwrap();
    assert_eq!(view.processed_file_names, vec!["notes.txt"]);
}
