use crate::config::ClientOptions;
use crate::net::{HttpClient, HttpRequest, HttpResponse};
use anyhow::Result;
use async_trait::async_trait;
use ureq::Agent;
use ureq::tls::TlsConfig;

/// HTTP client implementation using `ureq` for synchronous HTTP requests.
/// Since `ureq` is blocking, all requests are wrapped in `tokio::task::spawn_blocking`.
///
/// Non-2xx statuses are returned as regular responses, not errors; the API
/// layer decides what a given status means.
#[derive(Debug, Clone)]
pub struct UreqHttpClient {
    agent: Agent,
}

impl UreqHttpClient {
    pub fn new(options: &ClientOptions) -> Self {
        let mut config = Agent::config_builder().http_status_as_error(false);
        if !options.verify_tls {
            config = config.tls_config(TlsConfig::builder().disable_verification(true).build());
        }
        Self {
            agent: config.build().new_agent(),
        }
    }
}

impl Default for UreqHttpClient {
    fn default() -> Self {
        Self::new(&ClientOptions::default())
    }
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        // Since ureq is blocking, we must use spawn_blocking
        tokio::task::spawn_blocking(move || {
            let response = match request.method.as_str() {
                "GET" => {
                    let mut req = agent.get(&request.url);
                    for (key, value) in &request.headers {
                        req = req.header(key, value);
                    }
                    req.call()?
                }
                "POST" | "PATCH" | "PUT" => {
                    let mut req = match request.method.as_str() {
                        "POST" => agent.post(&request.url),
                        "PATCH" => agent.patch(&request.url),
                        _ => agent.put(&request.url),
                    };
                    for (key, value) in &request.headers {
                        req = req.header(key, value);
                    }
                    if let Some(body) = request.body {
                        req.send(&body[..])?
                    } else {
                        req.send(&[][..])?
                    }
                }
                method => {
                    return Err(anyhow::anyhow!("Unsupported HTTP method: {}", method));
                }
            };

            let status_code = response.status().as_u16();

            let mut body = response.into_body();
            let body_bytes = body.read_to_vec()?;

            Ok(HttpResponse {
                status_code,
                body: body_bytes,
            })
        })
        .await?
    }
}
