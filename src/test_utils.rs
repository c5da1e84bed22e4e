use crate::net::{HttpClient, HttpRequest, HttpResponse};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Scripted {
    Response { status: u16, body: String },
    TransportError(String),
}

/// An [`HttpClient`] that replays a scripted queue of responses and records
/// every request it receives, in order. Panics when a request arrives with
/// an empty script, which makes unexpected extra calls fail loudly in tests.
#[derive(Default)]
pub struct MockHttpClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a JSON response with the given status.
    pub fn push_response(&self, status: u16, body: &str) {
        self.script.lock().unwrap().push_back(Scripted::Response {
            status,
            body: body.to_string(),
        });
    }

    /// Queues a transport-level failure for the next request.
    pub fn push_transport_error(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::TransportError(message.to_string()));
    }

    /// All requests seen so far, in the order they were made.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of non-GET requests seen so far.
    pub fn mutating_request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method != "GET")
            .count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let scripted = self.script.lock().unwrap().pop_front();
        let scripted = scripted.unwrap_or_else(|| {
            panic!(
                "no scripted response left for {} {}",
                request.method, request.url
            )
        });
        self.requests.lock().unwrap().push(request);
        match scripted {
            Scripted::Response { status, body } => Ok(HttpResponse {
                status_code: status,
                body: body.into_bytes(),
            }),
            Scripted::TransportError(message) => Err(anyhow::anyhow!(message)),
        }
    }
}
