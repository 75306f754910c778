//! Chat notification capability (Slack)
//!
//! Strictly best-effort: every method logs failures and returns `None` /
//! `false` instead of erroring, so a chat outage can never stall or fail an
//! investigation. Without a configured token the client degrades to logging
//! each message, which keeps local runs useful.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::defaults::ADAPTER_TIMEOUT_SECS;
use crate::config::AgentConfig;
use crate::integrations::signer::RequestSigner;
use crate::types::IncidentReport;

/// Emoji prefix for a notification severity.
pub fn severity_emoji(severity: &str) -> &'static str {
    match severity.to_lowercase().as_str() {
        "critical" => "🔴",
        "high" => "🟠",
        "medium" => "🟡",
        "low" => "🟢",
        "warning" => "⚠️",
        _ => "ℹ️",
    }
}

/// Outbound chat surface of the orchestrator.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Post a notification; returns the message timestamp when delivered.
    async fn send_notification(
        &self,
        channel: &str,
        message: &str,
        severity: &str,
        incident_id: Option<&str>,
        thread_ts: Option<&str>,
    ) -> Option<String>;

    /// Post a rich investigation summary.
    async fn send_investigation_summary(
        &self,
        channel: &str,
        incident_id: &str,
        result: &IncidentReport,
        thread_ts: Option<&str>,
    ) -> Option<String>;

    /// Post a remediation action with approve / reject buttons.
    async fn send_remediation_approval(
        &self,
        channel: &str,
        incident_id: &str,
        action: &str,
        details: &Value,
        thread_ts: Option<&str>,
    ) -> Option<String>;

    /// Replace an existing message.
    async fn update_message(
        &self,
        channel: &str,
        timestamp: &str,
        message: &str,
        blocks: Option<Value>,
    ) -> bool;

    /// Add an emoji reaction to a message.
    async fn add_reaction(&self, channel: &str, timestamp: &str, reaction: &str) -> bool;
}

/// Slack Web API client.
pub struct SlackClient {
    http: reqwest::Client,
    token: Option<String>,
    grafana_url: String,
    region: String,
    cluster_name: String,
}

impl SlackClient {
    /// Build the client, resolving the bot token from the environment first
    /// and Secrets Manager second. Missing token is not fatal.
    pub async fn connect(config: &AgentConfig, signer: &dyn RequestSigner) -> Self {
        let token = match &config.slack_bot_token {
            Some(token) => Some(token.clone()),
            None => fetch_token_from_secrets(config, signer).await,
        };

        if token.is_none() {
            warn!("Slack token not configured, notifications disabled");
        } else {
            info!("Slack integration initialized");
        }

        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            token,
            grafana_url: config.grafana_url.clone(),
            region: config.region.clone(),
            cluster_name: config.cluster_name.clone(),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            token: None,
            grafana_url: "https://grafana.example.com".to_string(),
            region: "us-east-1".to_string(),
            cluster_name: "PetAdoptions-EKS".to_string(),
        }
    }

    fn grafana_dashboard_url(&self) -> String {
        format!("{}/d/eks-cluster-monitoring", self.grafana_url)
    }

    fn cloudwatch_console_url(&self) -> String {
        format!(
            "https://{region}.console.aws.amazon.com/cloudwatch/home?region={region}\
             #container-insights:performance/EKS:Cluster?~(query~(cluster~'{cluster}))",
            region = self.region,
            cluster = self.cluster_name,
        )
    }

    /// Call a Slack Web API method; returns the message `ts` when ok.
    async fn call_api(&self, method: &str, payload: &Value) -> Option<String> {
        let token = self.token.as_ref()?;
        let result = self
            .http
            .post(format!("https://slack.com/api/{method}"))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let body: Value = resp.json().await.ok()?;
                if body.get("ok").and_then(Value::as_bool) == Some(true) {
                    body.get("ts").and_then(Value::as_str).map(String::from)
                } else {
                    error!(
                        method,
                        error = body.get("error").and_then(|v| v.as_str()).unwrap_or("unknown"),
                        "Slack API call rejected"
                    );
                    None
                }
            }
            Err(e) => {
                error!(method, "Slack API call failed: {e}");
                None
            }
        }
    }

    fn notification_blocks(message: &str, severity: &str, incident_id: Option<&str>) -> Value {
        let emoji = severity_emoji(severity);
        let mut blocks = vec![json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("{emoji} {message}")},
        })];

        if let Some(incident_id) = incident_id {
            blocks.push(json!({
                "type": "context",
                "elements": [{
                    "type": "mrkdwn",
                    "text": format!(
                        "*Incident ID:* {incident_id} | *Timestamp:* {}",
                        chrono::Utc::now().to_rfc3339()
                    ),
                }],
            }));
        }
        Value::Array(blocks)
    }

    fn summary_blocks(&self, incident_id: &str, result: &IncidentReport) -> Value {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("📊 Investigation Summary: {incident_id}"),
                },
            }),
            json!({
                "type": "section",
                "fields": [
                    {"type": "mrkdwn", "text": format!("*Workflow:*\n{}", result.workflow)},
                    {"type": "mrkdwn", "text": format!("*Duration:*\n{:.2}s", result.duration_secs)},
                ],
            }),
            json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Root Cause:*\n{}",
                        result.root_cause.as_deref().unwrap_or("Unknown")
                    ),
                },
            }),
        ];

        if !result.recommendations.is_empty() {
            let bullets: Vec<String> = result
                .recommendations
                .iter()
                .map(|rec| format!("• {rec}"))
                .collect();
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("*Recommendations:*\n{}", bullets.join("\n")),
                },
            }));
        }

        blocks.push(json!({
            "type": "actions",
            "elements": [
                {
                    "type": "button",
                    "text": {"type": "plain_text", "text": "View Grafana Dashboard"},
                    "url": self.grafana_dashboard_url(),
                    "style": "primary",
                },
                {
                    "type": "button",
                    "text": {"type": "plain_text", "text": "View in CloudWatch"},
                    "url": self.cloudwatch_console_url(),
                },
            ],
        }));

        Value::Array(blocks)
    }

    fn approval_blocks(incident_id: &str, action: &str, details: &Value) -> Value {
        json!([
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "⚡ *Remediation Approval Required*\n\n*Incident:* {incident_id}\n*Action:* {action}\n*Details:* {}",
                        details.get("description").and_then(Value::as_str).unwrap_or("N/A")
                    ),
                },
            },
            {
                "type": "actions",
                "block_id": format!("remediation_{incident_id}"),
                "elements": [
                    {
                        "type": "button",
                        "text": {"type": "plain_text", "text": "✅ Approve"},
                        "style": "primary",
                        "value": format!("approve_{incident_id}_{action}"),
                        "action_id": "approve_remediation",
                    },
                    {
                        "type": "button",
                        "text": {"type": "plain_text", "text": "❌ Reject"},
                        "style": "danger",
                        "value": format!("reject_{incident_id}_{action}"),
                        "action_id": "reject_remediation",
                    },
                ],
            },
        ])
    }
}

/// Fetch the bot token from Secrets Manager through the signed HTTP
/// capability (`SecretString` is JSON carrying `bot_token`).
async fn fetch_token_from_secrets(
    config: &AgentConfig,
    signer: &dyn RequestSigner,
) -> Option<String> {
    let url = format!("https://secretsmanager.{}.amazonaws.com/", config.region);
    let payload = json!({"SecretId": config.slack_secret_name}).to_string();
    let base_headers = [
        (
            "content-type".to_string(),
            "application/x-amz-json-1.1".to_string(),
        ),
        (
            "x-amz-target".to_string(),
            "secretsmanager.GetSecretValue".to_string(),
        ),
    ];

    let headers = match signer
        .sign_request("POST", &url, &base_headers, payload.as_bytes())
        .await
    {
        Ok(headers) => headers,
        Err(e) => {
            warn!("Failed to get Slack token from Secrets Manager: {e}");
            return None;
        }
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS))
        .build()
        .ok()?;
    let result = http
        .post(&url)
        .headers(headers)
        .body(payload)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);

    match result {
        Ok(resp) => {
            let body: Value = resp.json().await.ok()?;
            let secret: Value =
                serde_json::from_str(body.get("SecretString")?.as_str()?).ok()?;
            secret
                .get("bot_token")
                .and_then(Value::as_str)
                .map(String::from)
        }
        Err(e) => {
            warn!("Failed to get Slack token from Secrets Manager: {e}");
            None
        }
    }
}

#[async_trait]
impl ChatNotifier for SlackClient {
    async fn send_notification(
        &self,
        channel: &str,
        message: &str,
        severity: &str,
        incident_id: Option<&str>,
        thread_ts: Option<&str>,
    ) -> Option<String> {
        if self.token.is_none() {
            info!("[SLACK] {channel}: {message}");
            return None;
        }

        let mut payload = json!({
            "channel": channel,
            "blocks": Self::notification_blocks(message, severity, incident_id),
            "text": message,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
        }
        self.call_api("chat.postMessage", &payload).await
    }

    async fn send_investigation_summary(
        &self,
        channel: &str,
        incident_id: &str,
        result: &IncidentReport,
        thread_ts: Option<&str>,
    ) -> Option<String> {
        if self.token.is_none() {
            info!("[SLACK] Investigation summary for {incident_id}");
            return None;
        }

        let mut payload = json!({
            "channel": channel,
            "blocks": self.summary_blocks(incident_id, result),
            "text": format!("Investigation summary for {incident_id}"),
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
        }
        self.call_api("chat.postMessage", &payload).await
    }

    async fn send_remediation_approval(
        &self,
        channel: &str,
        incident_id: &str,
        action: &str,
        details: &Value,
        thread_ts: Option<&str>,
    ) -> Option<String> {
        if self.token.is_none() {
            info!("[SLACK] Remediation approval request for {incident_id}: {action}");
            return None;
        }

        let mut payload = json!({
            "channel": channel,
            "blocks": Self::approval_blocks(incident_id, action, details),
            "text": format!("Remediation approval required for {incident_id}"),
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
        }
        self.call_api("chat.postMessage", &payload).await
    }

    async fn update_message(
        &self,
        channel: &str,
        timestamp: &str,
        message: &str,
        blocks: Option<Value>,
    ) -> bool {
        if self.token.is_none() {
            return false;
        }

        let mut payload = json!({
            "channel": channel,
            "ts": timestamp,
            "text": message,
        });
        if let Some(blocks) = blocks {
            payload["blocks"] = blocks;
        }
        self.call_api("chat.update", &payload).await.is_some()
    }

    async fn add_reaction(&self, channel: &str, timestamp: &str, reaction: &str) -> bool {
        if self.token.is_none() {
            return false;
        }

        let payload = json!({
            "channel": channel,
            "timestamp": timestamp,
            "name": reaction,
        });
        self.call_api("reactions.add", &payload).await.is_some()
    }
}
