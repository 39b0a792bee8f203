//! HTTP client for the external optimization service.
//!
//! Implements the [`Executor`] capability over the optimizer's REST
//! surface, with bounded retries and an explicit request timeout so a
//! hung solver surfaces as an executor error instead of leaving its plan
//! in `OPTIMIZING` forever.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempo_core::{
    EntityId, Executor, ExecutorOutcome, RescheduleBatch, RescheduleStrategy, ScheduleError,
    ScheduleResult,
};

use crate::config::ExecutorConfig;

const SCHEDULE_PATH: &str = "/api/v1/optimization/schedule";
const FALLBACK_PATH: &str = "/api/v1/optimization/schedule-with-fallback";

/// Wire request accepted by the optimization service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeRequest {
    user_id: EntityId,
    plan_id: EntityId,
    strategy: RescheduleStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_time_sec: Option<i32>,
}

/// Wire envelope returned by the optimization service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeEnvelope {
    code: i32,
    #[serde(default)]
    message: String,
    data: Option<OptimizeResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeResponse {
    success: bool,
    #[serde(default)]
    updated_event_ids: Vec<EntityId>,
    #[serde(default)]
    duration_ms: i64,
}

/// Reqwest-backed executor.
#[derive(Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    config: ExecutorConfig,
}

impl HttpExecutor {
    pub fn new(config: ExecutorConfig) -> ScheduleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ScheduleError::executor(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url_for(&self, batch: &RescheduleBatch) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match batch.strategy {
            RescheduleStrategy::OptimalReplan => {
                format!("{}{}?strategy={}", base, SCHEDULE_PATH, batch.strategy)
            }
            _ => format!("{}{}", base, FALLBACK_PATH),
        }
    }

    async fn do_request(&self, url: &str, body: &OptimizeRequest) -> ScheduleResult<ExecutorOutcome> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ScheduleError::executor(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScheduleError::executor(format!(
                "optimization service returned {}: {}",
                status, text
            )));
        }

        let envelope: OptimizeEnvelope = response
            .json()
            .await
            .map_err(|e| ScheduleError::executor(format!("invalid response: {}", e)))?;

        if envelope.code != 200 {
            return Err(ScheduleError::executor(format!(
                "optimization service error: {}",
                envelope.message
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| ScheduleError::executor("optimization response missing data"))?;

        Ok(ExecutorOutcome {
            success: data.success,
            updated_event_ids: data.updated_event_ids,
            duration_ms: data.duration_ms,
        })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, batch: &RescheduleBatch) -> ScheduleResult<ExecutorOutcome> {
        let url = self.url_for(batch);
        let body = OptimizeRequest {
            user_id: batch.user_id,
            plan_id: batch.plan_id,
            strategy: batch.strategy,
            max_time_sec: batch.max_time_sec,
        };

        let mut last_err = ScheduleError::executor("no attempts made");
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tracing::info!(attempt, retries = self.config.retry_count, "retrying optimization request");
                tokio::time::sleep(self.config.retry_delay).await;
            }

            match self.do_request(&url, &body).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "optimization request failed");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::new_entity_id;

    #[test]
    fn test_url_selection_by_strategy() {
        let executor = HttpExecutor::new(ExecutorConfig {
            base_url: "http://optimizer:8090/".to_string(),
            ..ExecutorConfig::default()
        })
        .unwrap();

        let mut batch = RescheduleBatch::new(
            new_entity_id(),
            new_entity_id(),
            RescheduleStrategy::OptimalReplan,
        );
        assert_eq!(
            executor.url_for(&batch),
            "http://optimizer:8090/api/v1/optimization/schedule?strategy=OPTIMAL_REPLAN"
        );

        batch.strategy = RescheduleStrategy::Ripple;
        assert_eq!(
            executor.url_for(&batch),
            "http://optimizer:8090/api/v1/optimization/schedule-with-fallback"
        );
    }

    #[test]
    fn test_request_serialization_skips_absent_hint() {
        let body = OptimizeRequest {
            user_id: new_entity_id(),
            plan_id: new_entity_id(),
            strategy: RescheduleStrategy::FullReplan,
            max_time_sec: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["strategy"], "FULL_REPLAN");
        assert!(json.get("maxTimeSec").is_none());
    }

    #[test]
    fn test_envelope_parsing() {
        let raw = serde_json::json!({
            "code": 200,
            "message": "ok",
            "data": {
                "success": true,
                "updatedEventIds": [uuid::Uuid::now_v7()],
                "durationMs": 321,
            }
        });
        let envelope: OptimizeEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.code, 200);
        let data = envelope.data.unwrap();
        assert!(data.success);
        assert_eq!(data.updated_event_ids.len(), 1);
        assert_eq!(data.duration_ms, 321);
    }
}
