//! HTTP transport profiles.
//!
//! Two real profiles exist behind one enum — a standard pooled client and a
//! browser-impersonating one for sites that fingerprint clients — plus a
//! scripted profile that replays canned responses (used by tests and dry
//! runs, same role as a dummy provider). The engine constructs one transport
//! at startup and drives its retry loop off the [`FetchOutcome`] variants;
//! transport never raises for per-request failures.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::config::CrawlerConfig;
use crate::crawler::parser::TransportKind;
use crate::error::AppError;

/// Outcome of one HTTP GET, pre-classified for the retry loop.
#[derive(Debug)]
pub enum FetchOutcome {
    /// 200 with a readable body.
    Ok(String),
    /// 404 — or a request timeout when the timeout-as-not-found policy is on.
    NotFound,
    /// 429/403 — the caller should arm the global cooldown and retry.
    RateLimited,
    /// Terminal status outside the retry taxonomy.
    Blocked(String),
    /// Transient failure (5xx, transport error) worth retrying.
    Retryable(String),
}

/// One canned response for the scripted transport. `status == 0` simulates
/// a request timeout.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
}

impl ScriptedResponse {
    pub fn ok(body: &str) -> Self {
        Self { status: 200, body: body.to_string() }
    }

    pub fn status(status: u16) -> Self {
        Self { status, body: String::new() }
    }

    pub fn timeout() -> Self {
        Self { status: 0, body: String::new() }
    }
}

#[derive(Debug)]
pub enum Transport {
    Standard(HttpProfile),
    Impersonating(HttpProfile),
    Scripted(ScriptedProfile),
}

#[derive(Debug)]
pub struct HttpProfile {
    client: Client,
    user_agents: Vec<String>,
    timeout_as_not_found: bool,
}

#[derive(Debug)]
pub struct ScriptedProfile {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    timeout_as_not_found: bool,
}

impl Transport {
    /// Build the transport a parser prefers. Falls back to the standard
    /// profile (with a warning) if the impersonating client cannot be built.
    pub fn for_kind(kind: TransportKind, cfg: &CrawlerConfig) -> Result<Self, AppError> {
        match kind {
            TransportKind::Standard => Self::standard(cfg),
            TransportKind::Impersonating => match Self::impersonating(cfg) {
                Ok(t) => Ok(t),
                Err(e) => {
                    warn!(error = %e, "impersonating transport unavailable, falling back to standard");
                    Self::standard(cfg)
                }
            },
        }
    }

    /// Standard pooled client. Certificate verification is relaxed; several
    /// of the covered sites serve stale intermediate chains.
    pub fn standard(cfg: &CrawlerConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Transport::Standard(HttpProfile {
            client,
            user_agents: cfg.user_agents.clone(),
            timeout_as_not_found: cfg.timeout_as_not_found,
        }))
    }

    /// Browser-like client: pinned header baseline matching a desktop
    /// Chrome profile. Only the User-Agent rotates per request.
    pub fn impersonating(cfg: &CrawlerConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("zh-TW,zh;q=0.9,en;q=0.8"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout))
            .danger_accept_invalid_certs(true)
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Fetch(format!("failed to build impersonating client: {e}")))?;
        Ok(Transport::Impersonating(HttpProfile {
            client,
            user_agents: cfg.user_agents.clone(),
            timeout_as_not_found: cfg.timeout_as_not_found,
        }))
    }

    /// Canned-response transport. Responses are consumed in order; an
    /// exhausted queue answers `NotFound` so range sweeps terminate.
    pub fn scripted(responses: Vec<ScriptedResponse>, timeout_as_not_found: bool) -> Self {
        Transport::Scripted(ScriptedProfile {
            responses: Mutex::new(responses.into()),
            timeout_as_not_found,
        })
    }

    /// The profile to fall back to when this one keeps dying at the network
    /// layer. Only the impersonating profile has one.
    pub fn fallback(&self, cfg: &CrawlerConfig) -> Option<Transport> {
        match self {
            Transport::Impersonating(_) => Self::standard(cfg).ok(),
            _ => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Transport::Standard(_) => "standard",
            Transport::Impersonating(_) => "impersonating",
            Transport::Scripted(_) => "scripted",
        }
    }

    /// One GET, classified. Never returns an error; everything folds into
    /// a [`FetchOutcome`].
    pub async fn get(&self, url: &str) -> FetchOutcome {
        match self {
            Transport::Standard(p) | Transport::Impersonating(p) => p.get(url).await,
            Transport::Scripted(p) => p.get(url),
        }
    }
}

impl HttpProfile {
    fn pick_user_agent(&self) -> Option<&str> {
        let mut rng = rand::thread_rng();
        self.user_agents.choose(&mut rng).map(|s| s.as_str())
    }

    async fn get(&self, url: &str) -> FetchOutcome {
        let mut req = self.client.get(url);
        if let Some(ua) = self.pick_user_agent() {
            req = req.header(USER_AGENT, ua);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                if self.timeout_as_not_found {
                    debug!(%url, "request timeout, classing as NOT_FOUND");
                    return FetchOutcome::NotFound;
                }
                return FetchOutcome::Retryable(format!("timeout: {e}"));
            }
            Err(e) => return FetchOutcome::Retryable(format!("network error: {e}")),
        };

        let status = response.status().as_u16();
        classify(status, || async {
            response
                .text()
                .await
                .map_err(|e| format!("body read failed: {e}"))
        })
        .await
    }
}

impl ScriptedProfile {
    fn get(&self, url: &str) -> FetchOutcome {
        let next = {
            let mut q = self.responses.lock().unwrap_or_else(|p| p.into_inner());
            q.pop_front()
        };
        let Some(resp) = next else {
            debug!(%url, "scripted transport exhausted");
            return FetchOutcome::NotFound;
        };
        if resp.status == 0 {
            if self.timeout_as_not_found {
                return FetchOutcome::NotFound;
            }
            return FetchOutcome::Retryable("scripted timeout".into());
        }
        match resp.status {
            200 => FetchOutcome::Ok(resp.body),
            404 => FetchOutcome::NotFound,
            403 | 429 => FetchOutcome::RateLimited,
            500..=504 => FetchOutcome::Retryable(format!("server error {}", resp.status)),
            other => FetchOutcome::Blocked(format!("unexpected status {other}")),
        }
    }
}

async fn classify<F, Fut>(status: u16, body: F) -> FetchOutcome
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, String>>,
{
    match status {
        200 => match body().await {
            Ok(text) => FetchOutcome::Ok(text),
            Err(e) => FetchOutcome::Retryable(e),
        },
        404 => FetchOutcome::NotFound,
        403 | 429 => FetchOutcome::RateLimited,
        500..=504 => FetchOutcome::Retryable(format!("server error {status}")),
        other => FetchOutcome::Blocked(format!("unexpected status {other}")),
    }
}
