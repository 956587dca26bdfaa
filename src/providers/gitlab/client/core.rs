use log::warn;
use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

use crate::auth::Token;
use crate::error::{CiArtifactsError, Result};

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY_SECONDS: u64 = 10;
const MAX_CONCURRENT_REQUESTS: usize = 16;

pub struct GitLabClient {
    pub client: Client,
    pub api_url: Url,
    pub token: Option<Token>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    retry_delay: Duration,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ci-artifacts/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CiArtifactsError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Without a trailing slash `join` would drop the last path segment
        // of instances served under a sub-path.
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let api_url = Url::parse(&base)
            .map_err(|e| CiArtifactsError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| CiArtifactsError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
        })
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// URL of `path` below the project, e.g. `jobs/12` for `group/repo`.
    pub fn project_url(&self, project_id: &str, path: &str) -> Result<Url> {
        self.api_url
            .join(&format!(
                "projects/{}/{}",
                urlencoding::encode(project_id),
                path
            ))
            .map_err(|e| CiArtifactsError::Config(format!("Invalid project URL: {e}")))
    }

    /// Send a request with automatic retry on network errors, rate limits and
    /// server errors. Any other non-success status is returned as an error.
    pub(super) async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CiArtifactsError::TaskFailed {
                task: "GitLab request".to_string(),
                reason: e.to_string(),
            })?;

        let mut retry_count = 0;
        loop {
            let request = self.auth_request(build(&self.client));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= self.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {:?} ({}/{})...",
                        e,
                        self.retry_delay,
                        retry_count + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == 429 || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(CiArtifactsError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: self.max_retries,
                    });
                }

                warn!(
                    "GitLab API error (status {status}). Waiting {:?} before retry {}/{}...",
                    self.retry_delay,
                    retry_count + 1,
                    self.max_retries
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(CiArtifactsError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(response);
        }
    }
}
