//! Async-completion polling state machine.
//!
//! After an initial response starts an async job, the adapter polls the
//! configured status URL until the job completes, fails, or the attempt
//! budget runs out: `POLLING → (DONE | FAILED | TIMED_OUT)`.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use super::detect;
use crate::config::PollingConfig;
use crate::error::{EngineError, Result};
use crate::signer::{canonical, HmacConfig};
use crate::util::template;

/// How status checks are issued.
#[derive(Debug, Clone)]
pub enum PollStrategy {
    /// Plain GET against the rendered status URL.
    Generic,
    /// Freshly-signed POST with a templated body, for the HMAC provider
    /// family.
    Signed(HmacConfig),
}

/// Success code in the signed provider family's response envelope.
const SIGNED_OK_CODE: i64 = 10000;

/// Provider code for an unusable input image, mapped to a readable
/// message instead of the provider's bare number.
const SIGNED_BAD_IMAGE_CODE: i64 = 50411;

/// Drive a started async job to a terminal state. `initial` is the
/// response that started the job.
pub async fn run(
    client: &reqwest::Client,
    config: &PollingConfig,
    strategy: &PollStrategy,
    auth_headers: &reqwest::header::HeaderMap,
    initial: &Value,
) -> Result<Value> {
    let task_id = find_task_id(strategy, initial)?;
    debug!(task_id = task_id.as_str(), "async job started, polling");

    let completed = config.completed_set();
    let failed = config.failed_set();
    let interval = std::time::Duration::from_secs(config.interval_secs.max(1));
    let max_attempts = config.max_attempts();

    for attempt in 0..max_attempts {
        if attempt > 0 {
            tokio::time::sleep(interval).await;
        }

        let body = poll_once(client, config, strategy, auth_headers, &task_id).await?;

        if let PollStrategy::Signed(_) = strategy {
            check_signed_envelope(&body)?;
        }

        let status = detect::detect_status(&body, config.status_path.as_deref());
        let Some(status) = status else {
            // No status field yet; treat as still pending.
            continue;
        };
        let lowered = status.to_ascii_lowercase();

        if completed.contains(&lowered) {
            debug!(task_id = task_id.as_str(), attempt, "async job completed");
            return extract_result(client, &body, config).await;
        }
        if failed.contains(&lowered) {
            let message = detect::detect_error_message(&body)
                .unwrap_or_else(|| format!("task ended with status '{status}'"));
            warn!(task_id = task_id.as_str(), status = status.as_str(), "async job failed");
            return Err(EngineError::task_failed(message));
        }
        // Unrecognized status: not a failure, just not done yet.
    }

    Err(EngineError::PollingTimeout {
        waited_secs: config.max_wait_secs,
    })
}

/// Locate the task identifier in the initial response.
///
/// The generic path scans the candidate list; the signed family's
/// envelope is strict — any non-success top-level code is an immediate
/// terminal error, and the id must be at `data.task_id`.
fn find_task_id(strategy: &PollStrategy, initial: &Value) -> Result<String> {
    match strategy {
        PollStrategy::Generic => {
            detect::detect_task_id(initial).ok_or(EngineError::PollingTaskIdNotFound)
        }
        PollStrategy::Signed(_) => {
            check_signed_envelope(initial)?;
            initial
                .pointer("/data/task_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(EngineError::PollingTaskIdNotFound)
        }
    }
}

/// Reject any signed-family envelope whose top-level code is not the
/// success value, mapping known codes to readable messages.
fn check_signed_envelope(body: &Value) -> Result<()> {
    let Some(code) = body.get("code").and_then(Value::as_i64) else {
        return Ok(());
    };
    if code == SIGNED_OK_CODE {
        return Ok(());
    }
    let message = if code == SIGNED_BAD_IMAGE_CODE {
        "input image invalid or unsupported".to_string()
    } else {
        detect::detect_error_message(body)
            .unwrap_or_else(|| format!("provider returned error code {code}"))
    };
    Err(EngineError::TaskFailed {
        message,
        provider_code: Some(code),
    })
}

async fn poll_once(
    client: &reqwest::Client,
    config: &PollingConfig,
    strategy: &PollStrategy,
    auth_headers: &reqwest::header::HeaderMap,
    task_id: &str,
) -> Result<Value> {
    let vars = [("id", task_id), ("task_id", task_id)];
    let url = template::render(&config.status_url, &vars);

    let response = match strategy {
        PollStrategy::Generic => {
            client
                .get(&url)
                .headers(auth_headers.clone())
                .send()
                .await?
        }
        PollStrategy::Signed(hmac) => {
            let body = config
                .request_body
                .as_ref()
                .map(|t| template::render_value(t, &vars))
                .unwrap_or_else(|| serde_json::json!({ "task_id": task_id }));
            let bytes = serde_json::to_vec(&body)?;
            let parsed = reqwest::Url::parse(&url)
                .map_err(|e| EngineError::InvalidPollingUrl(format!("{url}: {e}")))?;
            let signed =
                canonical::sign_request(hmac, &reqwest::Method::POST, &parsed, &bytes, Utc::now())?;
            client.post(parsed).headers(signed).body(bytes).send().await?
        }
    };

    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(EngineError::api(status.as_u16(), text));
    }
    serde_json::from_str(&text).map_err(EngineError::from)
}

/// Pull the completed job's payload, following a `response_url`
/// indirection when the provider stores results out-of-band.
async fn extract_result(
    client: &reqwest::Client,
    body: &Value,
    config: &PollingConfig,
) -> Result<Value> {
    if config.result_path.is_none() {
        if let Some(url) = body.get("response_url").and_then(Value::as_str) {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EngineError::api(status.as_u16(), "response_url fetch failed"));
            }
            return response.json().await.map_err(EngineError::from);
        }
    }
    Ok(detect::extract_result(body, config.result_path.as_deref()))
}
