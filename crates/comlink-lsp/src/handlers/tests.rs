use super::commands::{
    delete_reference, init_project, line_removal_range, status_value, CommandError,
    DeleteCommandArgs, DELETE_COMMAND, INIT_COMMAND, STATUS_COMMAND,
};
use super::lsp_utils::to_lsp_range;
use super::sync::run_commit;
use super::*;
use crate::state::ServerState;
use crate::test_support::test_client;
use comlink_core::text::advance;
use comlink_core::{
    CommentStore, CommitRequest, DocumentText, MemoryStore, Phase, StoreError, TextChange,
    WorkspaceError,
};
use expect_test::expect;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower_lsp::lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DocumentChanges, ExecuteCommandParams, HoverContents, HoverParams, OneOf, Position, Range,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, Url, VersionedTextDocumentIdentifier,
};

fn temp_dir(prefix: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{stamp}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn state_with_store() -> (Arc<ServerState>, Arc<MemoryStore>) {
    let state = Arc::new(ServerState::new());
    let store = Arc::new(MemoryStore::new());
    state.set_store(store.clone());
    (state, store)
}

fn open(state: &ServerState, uri: &Url, language_id: &str, text: &str) {
    did_open(
        state,
        DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_string(),
                version: 1,
                text: text.to_string(),
            },
        },
    );
}

fn hover_params(uri: &Url, line: u32, character: u32) -> HoverParams {
    HoverParams {
        text_document_position_params: TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position: Position::new(line, character),
        },
        work_done_progress_params: Default::default(),
    }
}

/// Feeds `text` one keystroke per change batch and collects captured commits.
fn type_into_state(
    state: &ServerState,
    uri: &Url,
    at: comlink_core::Position,
    text: &str,
) -> Vec<CommitRequest> {
    let mut position = at;
    let mut commits = Vec::new();
    for (version, c) in (2..).zip(text.chars()) {
        let typed = c.to_string();
        let change = TextChange::insert(position, typed.as_str());
        if let Some(commit) = state
            .apply_changes(uri, version, &[change])
            .expect("open document")
            .expect("apply change")
        {
            commits.push(commit);
        }
        position = advance(position, &typed);
    }
    commits
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn lsp_hover_shows_stored_comment() {
    let (state, store) = state_with_store();
    let id = store.create("answer to everything").await.unwrap();
    let uri = Url::parse("file:///project/main.ts").unwrap();
    open(&state, &uri, "typescript", &format!("const x = 42; //ID:{id}\n"));

    let hover = hover(&state, hover_params(&uri, 0, 3)).await.expect("hover");
    let HoverContents::Markup(markup) = hover.contents else {
        panic!("expected markup hover");
    };
    assert_eq!(markup.value, "answer to everything");
    assert_eq!(store.requests().last().map(String::as_str), Some("@1"));
}

#[tokio::test]
async fn lsp_hover_issues_one_fetch_per_reference() {
    let (state, store) = state_with_store();
    let uri = Url::parse("file:///project/index.ts").unwrap();
    open(&state, &uri, "typescript", "//ID:42");

    assert!(hover(&state, hover_params(&uri, 0, 0)).await.is_none());
    assert_eq!(store.requests(), vec!["@42"]);
}

#[tokio::test]
async fn lsp_hover_skips_plain_lines_and_missing_store() {
    let (state, store) = state_with_store();
    let uri = Url::parse("file:///project/app.py").unwrap();
    open(&state, &uri, "python", "# plain comment\n#ID:1\n");
    assert!(hover(&state, hover_params(&uri, 0, 0)).await.is_none());
    assert!(store.requests().is_empty());

    state.clear_store();
    assert!(hover(&state, hover_params(&uri, 1, 0)).await.is_none());
    assert!(store.requests().is_empty());
}

#[tokio::test]
async fn lsp_did_change_sends_captured_body_once() {
    let (state, store) = state_with_store();
    let client = test_client();
    let uri = Url::parse("file:///project/main.js").unwrap();
    open(&state, &uri, "javascript", "");

    let mut position = comlink_core::Position::new(0, 0);
    for (version, c) in (2..).zip("// ~this is my comment~".chars()) {
        let typed = c.to_string();
        let at = Position::new(position.line, position.character);
        did_change(
            &client,
            &state,
            DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri.clone(),
                    version,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: Some(Range::new(at, at)),
                    range_length: None,
                    text: typed.clone(),
                }],
            },
        );
        position = advance(position, &typed);
    }

    wait_for(|| {
        state
            .get_document(&uri)
            .is_some_and(|doc| doc.authoring.phase() == &Phase::Idle)
    })
    .await;
    assert_eq!(store.requests(), vec!["~this is my comment"]);
    let doc = state.get_document(&uri).unwrap();
    assert_eq!(doc.version, 24);
    assert_eq!(doc.text.as_str(), "// ~this is my comment~");
}

#[tokio::test]
async fn lsp_did_change_after_emoji_commits_declaration() {
    let (state, store) = state_with_store();
    let client = test_client();
    let uri = Url::parse("file:///project/emoji.js").unwrap();
    open(&state, &uri, "javascript", "😀 // ");

    // The emoji occupies two UTF-16 columns, so typing starts at column 6.
    for (version, (column, c)) in (2..).zip((6u32..).zip("~note~".chars())) {
        let at = Position::new(0, column);
        did_change(
            &client,
            &state,
            DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri.clone(),
                    version,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: Some(Range::new(at, at)),
                    range_length: None,
                    text: c.to_string(),
                }],
            },
        );
    }

    wait_for(|| !store.requests().is_empty()).await;
    assert_eq!(store.requests(), vec!["~note"]);
    let doc = state.get_document(&uri).unwrap();
    assert_eq!(doc.text.as_str(), "😀 // ~note~");
}

#[tokio::test]
async fn lsp_commit_without_store_keeps_raw_text() {
    let state = Arc::new(ServerState::new());
    let uri = Url::parse("file:///project/main.go").unwrap();
    open(&state, &uri, "go", "");
    let commits = type_into_state(&state, &uri, comlink_core::Position::new(0, 0), "// ~kept~");
    assert_eq!(commits.len(), 1);

    run_commit(test_client(), Arc::clone(&state), uri.clone(), commits[0].clone()).await;

    let doc = state.get_document(&uri).unwrap();
    assert_eq!(doc.text.as_str(), "// ~kept~");
    assert_eq!(doc.authoring.phase(), &Phase::Idle);
    assert!(!state.claim_unavailable_report());
}

#[tokio::test]
async fn lsp_second_declaration_keeps_first_commit_range() {
    let (state, store) = state_with_store();
    let uri = Url::parse("file:///project/lib.rs").unwrap();
    open(&state, &uri, "rust", "a();\nb();\n");

    let first = type_into_state(&state, &uri, comlink_core::Position::new(0, 4), " // ~one~");
    let second = type_into_state(&state, &uri, comlink_core::Position::new(1, 4), " // ~two~");
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());

    let id = store.create(&first[0].body).await;
    let (splice, _) = state
        .finish_commit(&uri, first[0].ticket, id)
        .expect("splice first commit");
    assert_eq!(splice.range, first[0].range);
    assert_eq!(
        to_lsp_range(splice.range),
        Range::new(Position::new(0, 5), Position::new(0, 13))
    );
    assert_eq!(splice.new_text, "//ID:1");
    assert_eq!(store.requests(), vec!["~one"]);
}

#[tokio::test]
async fn lsp_did_close_makes_response_stale() {
    let (state, store) = state_with_store();
    let uri = Url::parse("file:///project/page.html").unwrap();
    open(&state, &uri, "html", "");
    let commits = type_into_state(&state, &uri, comlink_core::Position::new(0, 0), "~late~");
    did_close(
        &state,
        DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        },
    );

    run_commit(test_client(), Arc::clone(&state), uri.clone(), commits[0].clone()).await;
    assert!(state.get_document(&uri).is_none());
    assert_eq!(store.requests(), vec!["~late"]);
}

#[tokio::test]
async fn init_creates_directory_and_initializes_store() {
    let root = temp_dir("comlink-init");
    let (state, store) = state_with_store();
    state.set_workspace_folders(vec![Url::from_file_path(&root).unwrap()]);

    let report = init_project(&state).await.expect("init");
    assert_eq!(report.directory, root.join("com-link"));
    assert_eq!(report.ignored_roots, 0);
    assert!(report.directory.is_dir());
    assert_eq!(store.requests(), vec![">init", "*"]);
    assert!(store.is_initialized());

    assert_eq!(
        init_project(&state).await,
        Err(CommandError::AlreadyInitialized)
    );
    assert_eq!(store.requests().len(), 2);
    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn init_refuses_existing_directory() {
    let root = temp_dir("comlink-init-conflict");
    let existing = root.join("com-link");
    std::fs::write(&existing, "not a directory").unwrap();
    let (state, store) = state_with_store();
    state.set_workspace_folders(vec![Url::from_file_path(&root).unwrap()]);

    assert_eq!(
        init_project(&state).await,
        Err(CommandError::Workspace(WorkspaceError::DirectoryConflict(
            existing
        )))
    );
    assert!(store.requests().is_empty());
    assert!(!state.store_initialized());
    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn init_uses_first_of_several_roots() {
    let first = temp_dir("comlink-init-first");
    let second = temp_dir("comlink-init-second");
    let (state, _store) = state_with_store();
    state.set_workspace_folders(vec![
        Url::from_file_path(&first).unwrap(),
        Url::from_file_path(&second).unwrap(),
    ]);

    let report = init_project(&state).await.expect("init");
    assert_eq!(report.root, first);
    assert_eq!(report.ignored_roots, 1);
    assert!(first.join("com-link").is_dir());
    assert!(!second.join("com-link").exists());
    let _ = std::fs::remove_dir_all(first);
    let _ = std::fs::remove_dir_all(second);
}

#[tokio::test]
async fn init_needs_workspace_and_store() {
    let state = ServerState::new();
    assert_eq!(
        init_project(&state).await,
        Err(CommandError::Workspace(WorkspaceError::WorkspaceUnavailable))
    );

    let root = temp_dir("comlink-init-nostore");
    state.set_workspace_folders(vec![Url::from_file_path(&root).unwrap()]);
    assert_eq!(
        init_project(&state).await,
        Err(CommandError::Store(StoreError::ProcessUnavailable))
    );
    assert!(!root.join("com-link").exists());
    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn init_honors_configured_directory() {
    let root = temp_dir("comlink-init-config");
    std::fs::write(root.join("comlink.toml"), "[store]\ndirectory = \"notes\"\n").unwrap();
    let (state, _store) = state_with_store();
    state.set_workspace_folders(vec![Url::from_file_path(&root).unwrap()]);
    load_project_config(&state);

    let report = init_project(&state).await.expect("init");
    assert_eq!(report.directory, root.join("notes"));
    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn delete_sends_request_and_removes_line() {
    let (state, store) = state_with_store();
    let id = store.create("obsolete").await.unwrap();
    let uri = Url::parse("file:///project/tool.py").unwrap();
    open(&state, &uri, "python", &format!("x = 1\n#ID:{id}\ny = 2\n"));

    let args = DeleteCommandArgs {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        position: Position::new(1, 2),
    };
    let deletion = delete_reference(&state, &args).await.expect("delete");
    assert_eq!(deletion.id, "1");
    assert_eq!(store.requests().last().map(String::as_str), Some("&1"));
    assert_eq!(store.fetch("1").await.unwrap(), None);

    let Some(DocumentChanges::Edits(edits)) = deletion.edit.document_changes else {
        panic!("expected document edits");
    };
    assert_eq!(edits[0].text_document.version, Some(1));
    let OneOf::Left(edit) = &edits[0].edits[0] else {
        panic!("expected plain text edit");
    };
    assert_eq!(edit.range, Range::new(Position::new(1, 0), Position::new(2, 0)));
    assert_eq!(edit.new_text, "");
}

#[tokio::test]
async fn delete_without_reference_sends_nothing() {
    let (state, store) = state_with_store();
    let uri = Url::parse("file:///project/tool.js").unwrap();
    open(&state, &uri, "javascript", "let a = 1; // note\n");
    let args = DeleteCommandArgs {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        position: Position::new(0, 0),
    };
    assert_eq!(
        delete_reference(&state, &args).await,
        Err(CommandError::NoReference { line: 0 })
    );

    let missing = DeleteCommandArgs {
        text_document: TextDocumentIdentifier {
            uri: Url::parse("file:///project/closed.js").unwrap(),
        },
        position: Position::new(0, 0),
    };
    assert!(matches!(
        delete_reference(&state, &missing).await,
        Err(CommandError::UnknownDocument(_))
    ));
    assert!(store.requests().is_empty());
}

#[test]
fn removal_of_last_line_takes_preceding_break() {
    let text = DocumentText::new("a\n#ID:1");
    let range = line_removal_range(&text, 1).expect("range");
    assert_eq!(
        to_lsp_range(range),
        Range::new(Position::new(0, 1), Position::new(1, 5))
    );
    let wide = DocumentText::new("😀\n#ID:1");
    assert_eq!(
        to_lsp_range(line_removal_range(&wide, 1).unwrap()),
        Range::new(Position::new(0, 2), Position::new(1, 5))
    );
    let only = DocumentText::new("#ID:1");
    assert_eq!(
        to_lsp_range(line_removal_range(&only, 0).unwrap()),
        Range::new(Position::new(0, 0), Position::new(0, 5))
    );
}

#[tokio::test]
async fn execute_command_routes_status_and_ignores_unknown() {
    let (state, _store) = state_with_store();
    state.set_workspace_folders(vec![Url::parse("file:///project").unwrap()]);
    state.set_config(json!({ "comlink": { "trace": "off" } }));
    let uri = Url::parse("file:///project/b.js").unwrap();
    open(&state, &uri, "javascript", "");
    type_into_state(&state, &uri, comlink_core::Position::new(0, 0), "// ~draft");
    open(&state, &Url::parse("file:///project/a.md").unwrap(), "markdown", "# Title\n");

    let client = test_client();
    let unknown = ExecuteCommandParams {
        command: "comlink.unknown".to_string(),
        arguments: Vec::new(),
        work_done_progress_params: Default::default(),
    };
    assert_eq!(execute_command(&client, &state, unknown).await, None);

    let status = ExecuteCommandParams {
        command: STATUS_COMMAND.to_string(),
        arguments: Vec::new(),
        work_done_progress_params: Default::default(),
    };
    let value = execute_command(&client, &state, status)
        .await
        .expect("status");
    assert_eq!(value, status_value(&state));
    expect![[r#"
        {
          "documents": [
            {
              "anchor": null,
              "languageId": "markdown",
              "phase": "idle",
              "uri": "file:///project/a.md",
              "version": 1
            },
            {
              "anchor": "0:3",
              "languageId": "javascript",
              "phase": "declaration_started",
              "uri": "file:///project/b.js",
              "version": 10
            }
          ],
          "root": "/project",
          "settings": {
            "comlink": {
              "trace": "off"
            }
          },
          "store": {
            "initialized": false,
            "running": true
          }
        }"#]]
    .assert_eq(&serde_json::to_string_pretty(&value).unwrap());
}

#[tokio::test]
async fn execute_delete_without_arguments_is_ignored() {
    let (state, store) = state_with_store();
    let params = ExecuteCommandParams {
        command: DELETE_COMMAND.to_string(),
        arguments: vec![Value::Null],
        work_done_progress_params: Default::default(),
    };
    assert_eq!(execute_command(&test_client(), &state, params).await, None);
    assert!(store.requests().is_empty());
}

#[tokio::test]
async fn execute_delete_accepts_camel_case_arguments() {
    let (state, store) = state_with_store();
    let uri = Url::parse("file:///project/x.lua").unwrap();
    open(&state, &uri, "lua", "print(1) --ID:9\n");
    let params = ExecuteCommandParams {
        command: DELETE_COMMAND.to_string(),
        arguments: vec![json!({
            "textDocument": { "uri": uri.as_str() },
            "position": { "line": 0, "character": 0 },
        })],
        work_done_progress_params: Default::default(),
    };
    let value = execute_command(&test_client(), &state, params)
        .await
        .expect("delete result");
    assert_eq!(value["deleted"], json!("9"));
    assert_eq!(value["applied"], json!(false));
    assert_eq!(store.requests(), vec!["&9"]);
}

#[tokio::test]
async fn execute_init_reports_failure_in_result() {
    let state = ServerState::new();
    let params = ExecuteCommandParams {
        command: INIT_COMMAND.to_string(),
        arguments: Vec::new(),
        work_done_progress_params: Default::default(),
    };
    let value = execute_command(&test_client(), &state, params)
        .await
        .expect("init result");
    assert_eq!(
        value,
        json!({ "initialized": false, "error": "no workspace is open" })
    );
}
