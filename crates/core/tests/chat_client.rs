use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use vidquiz_core::{
    ChatCompletionsClient, GenerationRequest, GenerativeService, Provider, QuizError, RetryPolicy,
    config::Credentials,
};

/// Read one HTTP request off the stream, headers and body.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

struct ScriptedServer {
    url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

/// Serve the given `(status, body)` responses in order, one per connection.
async fn serve(responses: Vec<(u16, String)>) -> ScriptedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let counter = hits.clone();
    let seen = requests.clone();
    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            seen.lock().unwrap().push(request);
            counter.fetch_add(1, Ordering::SeqCst);
            let response = format!(
                "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    });

    ScriptedServer {
        url: format!("http://{addr}/v1/chat/completions"),
        hits,
        requests,
    }
}

/// Accept connections and read their requests without ever answering.
async fn serve_silently() -> ScriptedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let counter = hits.clone();
    let seen = requests.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            seen.lock().unwrap().push(request);
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    ScriptedServer {
        url: format!("http://{addr}/v1/chat/completions"),
        hits,
        requests,
    }
}

fn completion(content: &str) -> String {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
}

fn client(url: String, max_attempts: u32) -> ChatCompletionsClient {
    client_with_timeout(url, max_attempts, Duration::from_secs(10))
}

fn client_with_timeout(url: String, max_attempts: u32, timeout: Duration) -> ChatCompletionsClient {
    ChatCompletionsClient::new(
        Credentials {
            provider: Provider::Openai,
            api_key: "sk-test".into(),
            endpoint: Some(url),
            api_version: None,
            model: "gpt-4o-mini".into(),
            organization: Some("org-quiz".into()),
        },
        RetryPolicy {
            max_attempts,
            cooldown: Duration::ZERO,
            ..RetryPolicy::default()
        },
        timeout,
    )
    .unwrap()
}

fn request() -> GenerationRequest {
    GenerationRequest {
        system: "Label the documents.".into(),
        user: "intro details".into(),
        schema_name: "topic_label",
        schema: json!({ "type": "object" }),
    }
}

#[tokio::test]
async fn rate_limit_is_retried_until_success() {
    let server = serve(vec![
        (429, json!({ "error": "slow down" }).to_string()),
        (200, completion(r#"{"label": "Course intro"}"#)),
    ])
    .await;

    let value = client(server.url, 3).generate(&request()).await.unwrap();
    assert_eq!(value["label"], "Course intro");
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);

    let sent = server.requests.lock().unwrap()[1].to_ascii_lowercase();
    assert!(sent.contains("authorization: bearer sk-test"));
    assert!(sent.contains("openai-organization: org-quiz"));
    assert!(sent.contains("\"json_schema\""));
}

#[tokio::test]
async fn authentication_failure_is_not_retried() {
    let server = serve(vec![
        (401, json!({ "error": "bad key" }).to_string()),
        (200, completion(r#"{"label": "unreachable"}"#)),
    ])
    .await;

    let err = client(server.url, 3).generate(&request()).await.unwrap_err();
    assert!(matches!(err, QuizError::Authentication { .. }), "{err}");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_errors_exhaust_attempts() {
    let server = serve(vec![
        (503, String::from("{}")),
        (502, String::from("{}")),
    ])
    .await;

    let err = client(server.url, 2).generate(&request()).await.unwrap_err();
    match err {
        QuizError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, QuizError::Transport { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_json_content_is_a_structured_output_error() {
    let server = serve(vec![(200, completion("Sure! Here is a label: Intro"))]).await;

    let err = client(server.url, 3).generate(&request()).await.unwrap_err();
    assert!(matches!(err, QuizError::StructuredOutput { .. }), "{err}");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stalled_endpoint_times_out_on_every_attempt() {
    let server = serve_silently().await;

    let err = client_with_timeout(server.url, 2, Duration::from_millis(200))
        .generate(&request())
        .await
        .unwrap_err();
    match err {
        QuizError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, QuizError::Timeout { .. }), "{last}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}
