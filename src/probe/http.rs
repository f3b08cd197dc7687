//! HTTP probes with HEAD to GET fallback

use crate::{
    error::{AppError, Result},
    models::{HttpOutcome, HttpProbeRequest, ProbeOutcome, ProbeTarget},
    types::{FailureKind, HttpMethod},
};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

/// Bytes of the body kept for signature matching
pub const BODY_PREFIX_LIMIT: usize = 512;

/// Bytes read at most per response; enough for the speed estimate
pub const BODY_READ_LIMIT: usize = 4 * 1024 * 1024;

/// HTTP side of the probe layer
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Run `request`; a HEAD that fails at transport level or is answered
    /// with 405/501 is retried once as GET within the same deadline
    pub async fn probe(&self, request: &HttpProbeRequest) -> HttpOutcome {
        let started = Instant::now();
        let first = self.exchange(request, request.method, request.timeout).await;

        if request.method != HttpMethod::Head || !should_retry_as_get(&first) {
            return first;
        }

        let remaining = request.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return first;
        }
        self.exchange(request, HttpMethod::Get, remaining).await
    }

    async fn exchange(&self, request: &HttpProbeRequest, method: HttpMethod, timeout: Duration) -> HttpOutcome {
        let target = ProbeTarget::from_url(&request.url);
        let started = Instant::now();

        let mut builder = self
            .client
            .request(method.as_reqwest(), &request.url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let result = tokio::time::timeout(timeout, async {
            let mut response = builder.send().await?;
            let status = response.status();
            let mut prefix = Vec::new();
            let mut total = 0usize;

            while total < BODY_READ_LIMIT {
                match response.chunk().await? {
                    Some(chunk) => {
                        if prefix.len() < BODY_PREFIX_LIMIT {
                            let take = (BODY_PREFIX_LIMIT - prefix.len()).min(chunk.len());
                            prefix.extend_from_slice(&chunk[..take]);
                        }
                        total += chunk.len();
                    }
                    None => break,
                }
            }

            Ok::<_, reqwest::Error>((status, prefix, total))
        })
        .await;

        match result {
            Ok(Ok((status, prefix, total))) => HttpOutcome {
                outcome: ProbeOutcome::success(target, started.elapsed()),
                status_code: Some(status.as_u16()),
                body_prefix: (!prefix.is_empty()).then(|| String::from_utf8_lossy(&prefix).into_owned()),
                body_bytes: total,
                method_used: method,
            },
            Ok(Err(e)) => HttpOutcome::failed(
                ProbeOutcome::failure(target, classify_reqwest_error(&e), Some(e.to_string())),
                method,
            ),
            Err(_) => HttpOutcome::failed(
                ProbeOutcome::failure(
                    target,
                    FailureKind::Timeout,
                    Some(format!("request timed out after {}ms", timeout.as_millis())),
                ),
                method,
            ),
        }
    }
}

fn should_retry_as_get(outcome: &HttpOutcome) -> bool {
    match outcome.status_code {
        Some(code) => {
            code == StatusCode::METHOD_NOT_ALLOWED.as_u16() || code == StatusCode::NOT_IMPLEMENTED.as_u16()
        }
        None => true,
    }
}

/// Map a reqwest error onto the failure taxonomy via its io source, if any
pub fn classify_reqwest_error(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        return FailureKind::Timeout;
    }

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            let kind = super::classify_io_error(io_error);
            if kind != FailureKind::Unknown {
                return kind;
            }
        }
        source = cause.source();
    }

    match super::classify_error_text(&format!("{:?}", error)) {
        FailureKind::Unknown if error.is_body() || error.is_decode() || error.is_redirect() => FailureKind::HttpError,
        kind => kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prober() -> HttpProber {
        HttpProber::new(crate::defaults::USER_AGENT).unwrap()
    }

    #[tokio::test]
    async fn test_head_success() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let request = HttpProbeRequest::new(format!("{}/", server.uri()), HttpMethod::Head, Duration::from_secs(5));
        let outcome = prober().probe(&request).await;

        assert!(outcome.outcome.succeeded);
        assert_eq!(outcome.status_code, Some(200));
        assert_eq!(outcome.method_used, HttpMethod::Head);
    }

    #[tokio::test]
    async fn test_head_rejected_falls_back_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let request = HttpProbeRequest::new(server.uri(), HttpMethod::Head, Duration::from_secs(5));
        let outcome = prober().probe(&request).await;

        assert_eq!(outcome.status_code, Some(200));
        assert_eq!(outcome.method_used, HttpMethod::Get);
        assert_eq!(outcome.body_prefix.as_deref(), Some("hello"));
        assert_eq!(outcome.body_bytes, 5);
    }

    #[tokio::test]
    async fn test_forbidden_is_a_response_not_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("<h1>Forbidden</h1>"))
            .mount(&server)
            .await;

        let request = HttpProbeRequest::new(server.uri(), HttpMethod::Get, Duration::from_secs(5));
        let outcome = prober().probe(&request).await;

        assert!(outcome.outcome.succeeded);
        assert_eq!(outcome.status_code, Some(403));
        assert!(outcome.body_prefix.unwrap().contains("Forbidden"));
    }

    #[tokio::test]
    async fn test_body_prefix_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let request = HttpProbeRequest::new(server.uri(), HttpMethod::Get, Duration::from_secs(5));
        let outcome = prober().probe(&request).await;

        assert_eq!(outcome.body_prefix.unwrap().len(), BODY_PREFIX_LIMIT);
        assert_eq!(outcome.body_bytes, 2048);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let request = HttpProbeRequest::new(server.uri(), HttpMethod::Get, Duration::from_millis(200));
        let started = Instant::now();
        let outcome = prober().probe(&request).await;

        assert!(!outcome.outcome.succeeded);
        assert_eq!(outcome.outcome.failure_kind, FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_closed_port_is_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = HttpProbeRequest::new(
            format!("http://127.0.0.1:{}/", port),
            HttpMethod::Head,
            Duration::from_secs(2),
        );
        let outcome = prober().probe(&request).await;

        assert!(!outcome.outcome.succeeded);
        assert_eq!(outcome.outcome.failure_kind, FailureKind::ConnectionRefused);
        assert_eq!(outcome.method_used, HttpMethod::Get);
    }
}
