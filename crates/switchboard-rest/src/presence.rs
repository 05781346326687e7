// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use switchboard_core::wire::StatusBody;
use switchboard_core::{OperatorId, OperatorPresence, PresenceApi, PresenceStatus, Result};

use crate::client::{RestClient, required};

#[async_trait]
impl PresenceApi for RestClient {
    async fn set_status(&self, status: PresenceStatus) -> Result<OperatorPresence> {
        let data = self.post("/agent/status", &StatusBody { status }).await?;
        required(data, "set status")
    }

    async fn heartbeat(&self) -> Result<()> {
        let _: Option<serde_json::Value> = self.post_empty("/agent/heartbeat").await?;
        Ok(())
    }

    async fn force_status(
        &self,
        operator_id: OperatorId,
        status: PresenceStatus,
    ) -> Result<OperatorPresence> {
        let data = self
            .post(&format!("/admin/agent/{operator_id}/status"), &StatusBody { status })
            .await?;
        required(data, "force status")
    }

    async fn roster(&self) -> Result<Vec<OperatorPresence>> {
        let data = self.get("/admin/agent/roster", &[]).await?;
        Ok(data.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use switchboard_config::model::ApiConfig;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RestClient {
        let config = ApiConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            max_retries: 0,
        };
        RestClient::new(&config, &SecretString::from("tok".to_string())).unwrap()
    }

    #[tokio::test]
    async fn force_status_targets_operator() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/agent/3/status"))
            .and(body_json(serde_json::json!({"status": "AWAY"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "success",
                "data": {
                    "operatorId": 3,
                    "status": "AWAY",
                    "currentSessionCount": 1,
                    "maxSessionCount": 5,
                    "lastActiveAt": "2026-01-01T00:00:00Z"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let presence = client(&server)
            .force_status(OperatorId(3), PresenceStatus::Away)
            .await
            .unwrap();
        assert_eq!(presence.status, PresenceStatus::Away);
        assert_eq!(presence.current_session_count, 1);
    }

    #[tokio::test]
    async fn heartbeat_ignores_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/heartbeat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200, "message": "success", "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).heartbeat().await.unwrap();
    }
}
