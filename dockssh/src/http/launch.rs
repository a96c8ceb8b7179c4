//! Launch endpoint client
//!
//! A fresh deployment takes a while before its web service answers, so the
//! launch call is retried on transient statuses and connection failures with
//! exponential backoff. Anything else surfaces on the first attempt.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::DeployError;
use crate::storage::settings::LaunchSettings;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Body returned by a successful launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub recruitment_msg: String,
}

/// Starts a deployed experiment
#[async_trait]
pub trait Launcher: Send + Sync {
    /// POST to `url`; certificate verification is skipped unless `verify_tls`
    async fn launch(&self, url: &str, verify_tls: bool) -> Result<LaunchResponse, DeployError>;
}

/// Retry budget and backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub cooldown: CooldownOptions,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            cooldown: CooldownOptions::default(),
        }
    }
}

impl From<&LaunchSettings> for RetryPolicy {
    fn from(settings: &LaunchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            cooldown: settings.cooldown(),
        }
    }
}

/// Outcome of a failed attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Worth another try; carries the reason for the log and the final error
    Retryable(String),
    /// Give up now
    Fatal(DeployError),
}

/// Statuses a starting service answers with while it is not ready yet
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Run `attempt` until it succeeds, fails fatally, or the budget is spent.
///
/// `attempt` receives the 1-based attempt number. The wait before attempt
/// `n + 1` is the backoff for `n - 1`, so the first retry waits the base delay.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    mut attempt: F,
) -> Result<T, DeployError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for number in 1..=max_attempts {
        if number > 1 {
            let delay = calc_exp_backoff(&policy.cooldown, number - 2);
            debug!("Waiting {:?} before attempt {}", delay, number);
            tokio::time::sleep(delay).await;
        }

        match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Retryable(reason)) => {
                warn!("Attempt {}/{} on {} failed: {}", number, max_attempts, url, reason);
                last_error = reason;
            }
        }
    }

    Err(DeployError::LaunchRetryExhausted {
        url: url.to_string(),
        attempts: max_attempts,
        last_error,
    })
}

/// HTTP launch client with bounded retry
#[derive(Debug, Clone)]
pub struct RetryingLaunchClient {
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl RetryingLaunchClient {
    pub fn new(policy: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            policy,
            request_timeout,
        }
    }

    pub fn from_settings(settings: &LaunchSettings) -> Self {
        Self::new(
            RetryPolicy::from(settings),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn client(&self, verify_tls: bool) -> Result<Client, DeployError> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        Ok(client)
    }
}

impl Default for RetryingLaunchClient {
    fn default() -> Self {
        Self::from_settings(&LaunchSettings::default())
    }
}

async fn attempt_launch(client: &Client, url: &str) -> Result<LaunchResponse, AttemptError> {
    let response = match client.post(url).send().await {
        Ok(response) => response,
        Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
            return Err(AttemptError::Retryable(e.to_string()));
        }
        Err(e) => return Err(AttemptError::Fatal(e.into())),
    };

    let status = response.status();
    if is_retryable_status(status) {
        return Err(AttemptError::Retryable(format!("status {}", status)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AttemptError::Fatal(DeployError::Launch(format!(
            "{} answered {}: {}",
            url, status, body
        ))));
    }

    response.json::<LaunchResponse>().await.map_err(|e| {
        AttemptError::Fatal(DeployError::Launch(format!(
            "{} returned an unexpected body: {}",
            url, e
        )))
    })
}

#[async_trait]
impl Launcher for RetryingLaunchClient {
    async fn launch(&self, url: &str, verify_tls: bool) -> Result<LaunchResponse, DeployError> {
        Url::parse(url)
            .map_err(|e| DeployError::Launch(format!("invalid launch URL {}: {}", url, e)))?;
        let client = self.client(verify_tls)?;
        info!("Launching {}", url);
        let response = with_retry(&self.policy, url, |_| attempt_launch(&client, url)).await?;
        debug!("Launch answered: {}", response.recruitment_msg);
        Ok(response)
    }
}
