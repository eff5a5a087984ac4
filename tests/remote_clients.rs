//! Tests for the remote model and recognition clients against a mock
//! HTTP server.

use std::time::Duration;

use mockito::Matcher;
use tokio::sync::mpsc;

use study_engine::extract::{ExtractionError, RemoteRecognizer};
use study_engine::llm::model::{
    BackendError, GenerationRequest, SliceSummarizer, SummaryRequest, TextGenerator,
};
use study_engine::llm::remote::{CompletionStreamGenerator, RemoteEndpointConfig, RemoteSummarizer};

fn endpoint_config(url: String, max_retries: usize) -> RemoteEndpointConfig {
    RemoteEndpointConfig {
        endpoint: url,
        api_key: None,
        model: "test-model".to_string(),
        timeout: Duration::from_secs(5),
        max_retries,
    }
}

async fn collect_pieces(rx: &mut mpsc::Receiver<String>) -> String {
    let mut out = String::new();
    while let Some(piece) = rx.recv().await {
        out.push_str(&piece);
    }
    out
}

#[tokio::test]
async fn test_streamed_completion() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/completions")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "test-model",
            "stream": true,
            "temperature": 0.0
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"choices\":[{\"text\":\"The answer\"}]}\n\n",
            "data: {\"choices\":[{\"text\":\" is 42.\"}]}\n\n",
            "data: [DONE]\n\n",
        ))
        .create_async()
        .await;

    let generator = CompletionStreamGenerator::new(endpoint_config(
        format!("{}/v1/completions", server.url()),
        1,
    ))
    .unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let stats = generator
        .generate(GenerationRequest::answer("Context\n\nQuestion: What?\nAnswer:", 64), tx)
        .await
        .unwrap();

    assert_eq!(stats.pieces, 2);
    assert_eq!(collect_pieces(&mut rx).await, "The answer is 42.");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_completion_falls_back_to_single_json() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"text":"Whole answer."}]}"#)
        .create_async()
        .await;

    let generator = CompletionStreamGenerator::new(endpoint_config(
        format!("{}/v1/completions", server.url()),
        1,
    ))
    .unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let stats = generator
        .generate(GenerationRequest::answer("Prompt", 32), tx)
        .await
        .unwrap();

    assert_eq!(stats.pieces, 1);
    assert_eq!(collect_pieces(&mut rx).await, "Whole answer.");
}

#[tokio::test]
async fn test_completion_keeps_final_unterminated_event() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"choices\":[{\"text\":\"Photosynthesis \"}]}\n\n",
            "data: {\"choices\":[{\"text\":\"fixes carbon.\"}]}",
        ))
        .create_async()
        .await;

    let generator = CompletionStreamGenerator::new(endpoint_config(
        format!("{}/v1/completions", server.url()),
        1,
    ))
    .unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let stats = generator
        .generate(GenerationRequest::answer("Prompt", 32), tx)
        .await
        .unwrap();

    assert_eq!(stats.pieces, 2);
    assert_eq!(collect_pieces(&mut rx).await, "Photosynthesis fixes carbon.");
}

#[tokio::test]
async fn test_completion_retries_then_fails() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/completions")
        .with_status(500)
        .with_body("boom")
        .expect(2)
        .create_async()
        .await;

    let generator = CompletionStreamGenerator::new(endpoint_config(
        format!("{}/v1/completions", server.url()),
        2,
    ))
    .unwrap();

    let (tx, _rx) = mpsc::channel(16);
    let err = generator
        .generate(GenerationRequest::answer("Prompt", 32), tx)
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Api(_)));
    assert!(err.to_string().contains("500"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_chat_summarizer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "test-model"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"choices":[{"message":{"role":"assistant","content":"  A dense summary.  "}}]}"#,
        )
        .create_async()
        .await;

    let summarizer = RemoteSummarizer::new(endpoint_config(
        format!("{}/v1/chat/completions", server.url()),
        1,
    ))
    .unwrap();

    let summary = summarizer
        .summarize(SummaryRequest {
            text: "Long study material to condense.".to_string(),
            min_new_tokens: 60,
            max_new_tokens: 200,
        })
        .await
        .unwrap();

    assert_eq!(summary, "A dense summary.");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_summarizer_rejects_empty_choices() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[]}"#)
        .create_async()
        .await;

    let summarizer = RemoteSummarizer::new(endpoint_config(
        format!("{}/v1/chat/completions", server.url()),
        1,
    ))
    .unwrap();

    let err = summarizer
        .summarize(SummaryRequest {
            text: "Material".to_string(),
            min_new_tokens: 10,
            max_new_tokens: 20,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Api(_)));
}

#[tokio::test]
async fn test_recognizer_returns_text() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/recognize")
        .match_header("content-type", "image/png")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"scanned words"}"#)
        .create_async()
        .await;

    let recognizer = RemoteRecognizer::new(
        "ocr",
        format!("{}/recognize", server.url()),
        None,
        Duration::from_secs(5),
        1,
    )
    .unwrap();

    let text = recognizer
        .recognize(b"fake image bytes", "image/png")
        .await
        .unwrap();

    assert_eq!(text, "scanned words");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_recognizer_upstream_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/recognize")
        .with_status(502)
        .with_body("bad gateway")
        .expect(2)
        .create_async()
        .await;

    let recognizer = RemoteRecognizer::new(
        "transcriber",
        format!("{}/recognize", server.url()),
        None,
        Duration::from_secs(5),
        2,
    )
    .unwrap();

    let err = recognizer
        .recognize(b"fake audio bytes", "audio/mpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractionError::Upstream(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_recognizer_sends_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/recognize")
        .match_header("authorization", "Bearer api-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"ok"}"#)
        .create_async()
        .await;

    let recognizer = RemoteRecognizer::new(
        "ocr",
        format!("{}/recognize", server.url()),
        Some("api-token".to_string()),
        Duration::from_secs(5),
        1,
    )
    .unwrap();

    recognizer.recognize(b"bytes", "image/png").await.unwrap();
    mock.assert_async().await;
}
