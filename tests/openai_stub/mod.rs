use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub const API_KEY: &str = "test-key";

/// Page text containing this marker gets a record with no prices back.
pub const NO_PRICING_MARKER: &str = "NO_PRICING";

pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/responses" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let authorized = request.headers().iter().any(|h| {
                    h.field.equiv("Authorization") && h.value.as_str() == format!("Bearer {API_KEY}")
                });
                if !authorized {
                    let _ = request.respond(
                        tiny_http::Response::from_string(
                            r#"{"error":{"message":"Incorrect API key provided"}}"#,
                        )
                        .with_status_code(401),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let format = parsed.pointer("/text/format");
                let strict_schema = format
                    .and_then(|f| f.get("type"))
                    .and_then(|v| v.as_str())
                    == Some("json_schema")
                    && format.and_then(|f| f.get("strict")) == Some(&Value::Bool(true))
                    && format.and_then(|f| f.pointer("/schema/properties")).is_some();
                if !strict_schema {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing json_schema text format")
                            .with_status_code(400),
                    );
                    continue;
                }

                let Some(input) = parsed.get("input").and_then(|v| v.as_str()) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing input").with_status_code(400),
                    );
                    continue;
                };

                let output_text = record_for_page(input).to_string();
                let response_body = serde_json::json!({
                    "id": "resp_stub",
                    "object": "response",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "output": [
                        {
                            "type": "message",
                            "role": "assistant",
                            "content": [
                                { "type": "output_text", "text": output_text }
                            ]
                        }
                    ]
                });

                let mut response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                response = response.with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Builds a record whose title is the first non-empty line of the page text.
fn record_for_page(input: &str) -> Value {
    let title = input
        .lines()
        .map(|line| line.trim_start_matches('#').trim())
        .find(|line| !line.is_empty() && !line.chars().all(|c| c == '='))
        .unwrap_or("untitled")
        .to_owned();
    let prices = if input.contains(NO_PRICING_MARKER) {
        serde_json::json!([])
    } else {
        serde_json::json!([25, 80])
    };

    serde_json::json!({
        "author_name": "Stub Author",
        "title": title,
        "description": "Stub description.",
        "hourly_rate": "N/A",
        "prices_in_dollar": prices,
        "review_count": 7,
        "overall_rating": 4.5,
        "comments": ["Quick turnaround", "Would hire again"],
        "author_location": "Remote",
        "author_job_success_rate": 97.5,
        "author_bio": "Stub bio.",
        "whats_included": "| Item | Basic |\n|---|---|\n| Revisions | 2 |",
    })
}
