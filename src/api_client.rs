use crate::config::SyncConfig;
use crate::domain::models::YearMonth;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

// Fixed category flag the endpoint expects alongside the page cursors
const CATEGORY_PARAM: (&str, &str) = ("szType", "balloon");

// Body fragments that only appear on the remote login page
const LOGIN_MARKERS: [&str; 3] = ["id=\"loginForm\"", "name=\"login_form\"", "로그인이 필요합니다"];

/// Independent 1-based cursors for the charge ("in") and gift ("out") lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCursors {
    pub incoming: u32,
    pub outgoing: u32,
}

impl PageCursors {
    pub fn first() -> Self {
        Self {
            incoming: 1,
            outgoing: 1,
        }
    }

    pub fn outgoing(page: u32) -> Self {
        Self {
            incoming: 1,
            outgoing: page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Ok { raw_payload: String },
    AuthRequired,
    HttpError { status: u16 },
    NetworkError { message: String },
}

#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// One request per coordinate. Implementations hold no pacing state.
    async fn fetch_page(&self, period: YearMonth, cursors: PageCursors) -> FetchResult;
}

pub struct ReqwestHistoryFetcher {
    client: Client,
    url: String,
    login_host: String,
}

impl ReqwestHistoryFetcher {
    pub fn new(config: &SyncConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.insert(COOKIE, value);
            }
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.history_url.clone(),
            login_host: config.login_host.clone(),
        })
    }
}

#[async_trait]
impl HistoryFetcher for ReqwestHistoryFetcher {
    async fn fetch_page(&self, period: YearMonth, cursors: PageCursors) -> FetchResult {
        let params = [
            ("currpage_in", cursors.incoming.to_string()),
            ("currpage_out", cursors.outgoing.to_string()),
            (CATEGORY_PARAM.0, CATEGORY_PARAM.1.to_string()),
            ("year", period.year.to_string()),
            ("month", format!("{:02}", period.month)),
        ];

        let response = match self
            .client
            .get(&self.url)
            .header("Accept", "text/html")
            .query(&params)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return FetchResult::NetworkError {
                    message: e.to_string(),
                };
            }
        };

        let final_url = response.url().clone();
        if final_url
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.login_host))
        {
            debug!(url = %final_url, "redirected to login host");
            return FetchResult::AuthRequired;
        }

        let status = response.status();
        if !status.is_success() {
            return FetchResult::HttpError {
                status: status.as_u16(),
            };
        }

        match response.text().await {
            Ok(body) => classify_body(body),
            Err(e) => FetchResult::NetworkError {
                message: e.to_string(),
            },
        }
    }
}

fn classify_body(body: String) -> FetchResult {
    if LOGIN_MARKERS.iter().any(|m| body.contains(m)) {
        FetchResult::AuthRequired
    } else {
        FetchResult::Ok { raw_payload: body }
    }
}

// Scripted fetcher for tests and offline runs: canned responses keyed by coordinate
pub struct MockHistoryFetcher {
    responses: HashMap<(YearMonth, PageCursors), FetchResult>,
    fallback: FetchResult,
    calls: Mutex<Vec<(YearMonth, PageCursors)>>,
}

impl MockHistoryFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            fallback: FetchResult::Ok {
                raw_payload: String::new(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(mut self, period: YearMonth, cursors: PageCursors, html: impl Into<String>) -> Self {
        self.responses.insert(
            (period, cursors),
            FetchResult::Ok {
                raw_payload: html.into(),
            },
        );
        self
    }

    pub fn with_result(mut self, period: YearMonth, cursors: PageCursors, result: FetchResult) -> Self {
        self.responses.insert((period, cursors), result);
        self
    }

    /// Response for every coordinate without an explicit entry.
    pub fn with_fallback(mut self, result: FetchResult) -> Self {
        self.fallback = result;
        self
    }

    pub fn calls(&self) -> Vec<(YearMonth, PageCursors)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockHistoryFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryFetcher for MockHistoryFetcher {
    async fn fetch_page(&self, period: YearMonth, cursors: PageCursors) -> FetchResult {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((period, cursors));
        self.responses
            .get(&(period, cursors))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
