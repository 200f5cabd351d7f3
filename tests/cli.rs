//! Binary smoke tests

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn localchat(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("localchat").unwrap();
    cmd.env_remove("OLLAMA_HOST")
        .env_remove("LOCALCHAT_MODEL")
        .env_remove("LOCALCHAT_TIMEOUT_SECS")
        .arg("--config")
        .arg(config_dir.path().join("config.json"));
    cmd
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    localchat(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("localchat")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("raw"))
        .stdout(predicate::str::contains("models"));
}

#[test]
fn test_config_reflects_flags() {
    let dir = TempDir::new().unwrap();
    localchat(&dir)
        .args(["--host", "gpu-box:11434", "--timeout", "42", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"base_url\": \"http://gpu-box:11434\""))
        .stdout(predicate::str::contains("\"timeout_secs\": 42"));
}

#[test]
fn test_unreachable_daemon_fails() {
    let dir = TempDir::new().unwrap();
    localchat(&dir)
        .args(["--host", "http://127.0.0.1:1", "chat", "Hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("connection refused"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_prints_visible_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen3:0.6b",
            "message": {"role": "assistant", "content": "<think>greeting</think>\n\nHello! How are you?"},
            "done": true
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let uri = server.uri();

    // assert_cmd blocks, keep it off the runtime threads serving the mock
    tokio::task::spawn_blocking(move || {
        localchat(&dir)
            .args(["--host", uri.as_str(), "chat", "Hi", "--show-reasoning"])
            .assert()
            .success()
            .stdout(predicate::str::diff("Hello! How are you?\n"))
            .stderr(predicate::str::contains("greeting"));
    })
    .await
    .unwrap();
}

/// NDJSON chat stream: one chunk per piece, then the final chunk
fn chat_stream(pieces: &[&str], thinking: Option<&str>) -> String {
    let mut lines: Vec<String> = pieces
        .iter()
        .map(|piece| {
            json!({
                "model": "qwen3:0.6b",
                "message": {"role": "assistant", "content": piece},
                "done": false
            })
            .to_string()
        })
        .collect();

    let mut last = json!({
        "model": "qwen3:0.6b",
        "message": {"role": "assistant", "content": ""},
        "done": true,
        "done_reason": "stop",
        "eval_count": pieces.len()
    });
    if let Some(thinking) = thinking {
        last["message"]["thinking"] = json!(thinking);
    }
    lines.push(last.to_string());

    lines.join("\n") + "\n"
}

/// Run `localchat chat Hi --stream <extra>` against a streaming mock daemon
async fn run_streamed_chat(body: String, extra: &[&str]) -> assert_cmd::assert::Assert {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut args = vec!["--host".to_string(), server.uri(), "chat".into(), "Hi".into(), "--stream".into()];
    args.extend(extra.iter().map(|arg| (*arg).to_string()));

    tokio::task::spawn_blocking(move || localchat(&dir).args(&args).assert())
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_block_across_chunks() {
    let body = chat_stream(
        &["<think>", "weighing ", "options", "</think>\n\n", "Hello", "! How are you?"],
        None,
    );
    run_streamed_chat(body, &[])
        .await
        .success()
        .stdout(predicate::str::diff("Hello! How are you?\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_whitespace_before_block() {
    let body = chat_stream(&["\n", "<think>", "x", "</think>", "\n\nHello"], None);
    run_streamed_chat(body, &[])
        .await
        .success()
        .stdout(predicate::str::diff("Hello\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_marker_split_across_chunks() {
    let body = chat_stream(&["<thi", "nk>plan</th", "ink>Hi there"], None);
    run_streamed_chat(body, &[])
        .await
        .success()
        .stdout(predicate::str::diff("Hi there\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_unterminated_block_fails() {
    let body = chat_stream(&["<think>", "never closed"], None);
    run_streamed_chat(body, &[])
        .await
        .failure()
        .stderr(predicate::str::contains("Unterminated reasoning block"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_shows_all_reasoning() {
    let body = chat_stream(&["<think>inline</think>Answer"], Some("field"));
    run_streamed_chat(body, &["--show-reasoning"])
        .await
        .success()
        .stdout(predicate::str::diff("Answer\n"))
        .stderr(predicate::str::contains("field\n\ninline"));
}

#[test]
fn test_config_save_writes_file() {
    let dir = TempDir::new().unwrap();
    localchat(&dir)
        .args(["--timeout", "42", "config", "--save"])
        .assert()
        .success();

    let saved = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved["timeout_secs"], json!(42));
}
