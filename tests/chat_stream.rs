//! Chat response stream reader integration tests

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use futures::StreamExt;
use parley::chat::record_stream;
use parley::{ChatClient, ChatRequest, Error, StreamRecord};

mod common;
use common::{chunked_body, ndjson, spawn_server, split_at};

fn record(sentence: &str, audio_url: &str) -> StreamRecord {
    StreamRecord {
        sentence: sentence.to_string(),
        audio_url: audio_url.to_string(),
    }
}

async fn collect(chunks: Vec<Vec<u8>>) -> Vec<parley::Result<StreamRecord>> {
    let bytes = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
    record_stream(bytes).collect().await
}

async fn collect_ok(chunks: Vec<Vec<u8>>) -> Vec<StreamRecord> {
    collect(chunks)
        .await
        .into_iter()
        .map(|r| r.expect("unexpected stream error"))
        .collect()
}

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        voice: "en-US-Standard-A".to_string(),
        model: "phi4:latest".to_string(),
    }
}

#[tokio::test]
async fn test_records_survive_any_chunk_boundary() {
    let body = ndjson(&[("Hi there!", "/a1.mp3"), ("How can I help?", "/a2.mp3")]);
    let expected = vec![record("Hi there!", "/a1.mp3"), record("How can I help?", "/a2.mp3")];

    for split in 0..=body.len() {
        let records = collect_ok(split_at(&body, &[split])).await;
        assert_eq!(records, expected, "split at byte {split}");
    }
}

#[tokio::test]
async fn test_byte_at_a_time_delivery() {
    let body = ndjson(&[("One.", "/1.mp3"), ("Two.", "/2.mp3"), ("Three.", "/3.mp3")]);
    let chunks = body.iter().map(|b| vec![*b]).collect();

    let records = collect_ok(chunks).await;

    let sentences: Vec<_> = records.iter().map(|r| r.sentence.as_str()).collect();
    assert_eq!(sentences, ["One.", "Two.", "Three."]);
}

#[tokio::test]
async fn test_unterminated_trailing_line_is_dropped() {
    let mut body = ndjson(&[("Kept.", "/k.mp3")]);
    body.extend_from_slice(br#"{"sentence":"Lost.","audioUrl":"/l.mp3"}"#);

    let records = collect_ok(vec![body]).await;

    assert_eq!(records, vec![record("Kept.", "/k.mp3")]);
}

#[tokio::test]
async fn test_malformed_and_blank_lines_are_skipped() {
    let mut body = b"not json at all\n\n   \n{\"sentence\":42}\n".to_vec();
    body.extend(ndjson(&[("Still here.", "/s.mp3")]));

    let records = collect_ok(vec![body]).await;

    assert_eq!(records, vec![record("Still here.", "/s.mp3")]);
}

#[tokio::test]
async fn test_multibyte_character_split_across_chunks() {
    let body = ndjson(&[("Très bien, merci.", "/fr.mp3")]);
    let split = body
        .windows(2)
        .position(|w| w == "è".as_bytes())
        .expect("accented character present")
        + 1;

    let records = collect_ok(split_at(&body, &[split])).await;

    assert_eq!(records, vec![record("Très bien, merci.", "/fr.mp3")]);
}

#[tokio::test]
async fn test_transport_error_ends_stream() {
    let first = ndjson(&[("Before.", "/b.mp3")]);
    let after = ndjson(&[("After.", "/a.mp3")]);
    let items = vec![
        Ok(first),
        Err(std::io::Error::other("connection reset")),
        Ok(after),
    ];

    let results: Vec<_> = record_stream(futures::stream::iter(items)).collect().await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &record("Before.", "/b.mp3"));
    assert!(matches!(results[1], Err(Error::Io(_))));
}

#[tokio::test]
async fn test_empty_body_yields_nothing() {
    assert!(collect(Vec::new()).await.is_empty());
}

#[tokio::test]
async fn test_client_streams_chunked_response() {
    let body = ndjson(&[("Hi there!", "/a1.mp3"), (" How can I help?", "/a2.mp3")]);
    let router = Router::new().route(
        "/api/chat",
        post(move || {
            let chunks = split_at(&body, &[7, 45]);
            async move { chunked_body(chunks, false) }
        }),
    );
    let url = spawn_server(router).await;

    let stream = ChatClient::new(&url).send(&request("Hello")).await.unwrap();
    let records: Vec<_> = stream.map(Result::unwrap).collect().await;

    assert_eq!(
        records,
        vec![record("Hi there!", "/a1.mp3"), record(" How can I help?", "/a2.mp3")]
    );
}

#[tokio::test]
async fn test_client_rejects_error_status() {
    let router = Router::new().route(
        "/api/chat",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response() }),
    );
    let url = spawn_server(router).await;

    let result = ChatClient::new(&url).send(&request("Hello")).await;

    assert!(matches!(result, Err(Error::Chat(msg)) if msg.contains("model crashed")));
}

#[tokio::test]
async fn test_client_reports_unreachable_backend() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = ChatClient::new(&url).send(&request("Hello")).await;

    assert!(matches!(result, Err(Error::Http(_))));
}
