use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::config::LauncherConfig;
use crate::errors::{LauncherError, Result};

const USER_AGENT: &str = concat!("patch-launcher/", env!("CARGO_PKG_VERSION"));
const BODY_SNIPPET_CHARS: usize = 240;

/// Client used for file transfers: connect timeout only, since a single
/// game file can take longer than any sensible request timeout.
pub fn transfer_client(config: &LauncherConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.connect_timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, config: &LauncherConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout.min(Duration::from_secs(30)))
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            timeout: config.request_timeout.min(Duration::from_secs(30)),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, &[]).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.request(Method::GET, path, query).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.url(path);
        let mut request = self
            .client
            .request(method, &url)
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LauncherError::Http(format!(
                "HTTP {}: {}",
                status.as_u16(),
                snippet(&text)
            )));
        }

        let body = response.bytes().await?;
        let value = serde_json::from_slice::<T>(&body)?;
        Ok(value)
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
    out.push_str("...");
    out
}
