// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use switchboard_core::wire::{DecisionBody, SessionBody, TransferBody};
use switchboard_core::{HandoffApi, HandoffRequest, RequestId, Result, SessionId, SwitchboardError};
use tracing::debug;

use crate::client::{RestClient, required};

#[async_trait]
impl HandoffApi for RestClient {
    async fn request_transfer(&self, body: TransferBody) -> Result<HandoffRequest> {
        let data = self.post_once("/customer/handoff/transfer", &body).await?;
        required(data, "transfer")
    }

    async fn status(&self, id: RequestId) -> Result<HandoffRequest> {
        let data = self
            .get(&format!("/customer/handoff/status/{id}"), &[])
            .await
            .map_err(|e| e.for_request(id))?;
        required(data, "status")
    }

    async fn by_session(&self, session_id: SessionId) -> Result<Option<HandoffRequest>> {
        match self
            .get(&format!("/handoff/by-session/{session_id}"), &[])
            .await
        {
            Ok(data) => Ok(data),
            Err(SwitchboardError::NotFound(message)) => {
                debug!(%session_id, %message, "no handoff request for session");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel(&self, id: RequestId) -> Result<HandoffRequest> {
        let data = self
            .post_empty(&format!("/customer/handoff/cancel/{id}"))
            .await
            .map_err(|e| e.for_request(id))?;
        required(data, "cancel")
    }

    async fn end_by_user(&self, session_id: SessionId) -> Result<HandoffRequest> {
        let data = self
            .post("/customer/handoff/end-by-user", &SessionBody { session_id })
            .await?;
        required(data, "end-by-user")
    }

    async fn pending_queue(&self) -> Result<Vec<HandoffRequest>> {
        let data = self.get("/agent/handoff/pending", &[]).await?;
        Ok(data.unwrap_or_default())
    }

    async fn accept(&self, id: RequestId) -> Result<HandoffRequest> {
        let body = DecisionBody {
            handoff_request_id: id,
            reason: None,
        };
        let data = self
            .post("/agent/handoff/accept", &body)
            .await
            .map_err(|e| e.for_request(id))?;
        required(data, "accept")
    }

    async fn reject(&self, id: RequestId, reason: Option<String>) -> Result<HandoffRequest> {
        let body = DecisionBody {
            handoff_request_id: id,
            reason,
        };
        let data = self
            .post("/agent/handoff/reject", &body)
            .await
            .map_err(|e| e.for_request(id))?;
        required(data, "reject")
    }

    async fn complete(&self, id: RequestId) -> Result<HandoffRequest> {
        let data = self
            .post_empty(&format!("/agent/handoff/complete/{id}"))
            .await
            .map_err(|e| e.for_request(id))?;
        required(data, "complete")
    }

    async fn close(&self, id: RequestId) -> Result<HandoffRequest> {
        let data = self
            .post_empty(&format!("/admin/handoff/close/{id}"))
            .await
            .map_err(|e| e.for_request(id))?;
        required(data, "close")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::time::Duration;
    use switchboard_config::model::ApiConfig;
    use switchboard_core::{HandoffStatus, OperatorId};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_json(id: u64, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "sessionId": 42,
            "customerId": 9,
            "reason": "billing issue",
            "status": status,
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
            "revision": 1
        })
    }

    fn ok(data: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 200, "message": "success", "data": data
        }))
    }

    fn client(server: &MockServer) -> RestClient {
        let config = ApiConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            max_retries: 1,
        };
        RestClient::new(&config, &SecretString::from("tok".to_string()))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn transfer_posts_session_and_reason() {
        let server = MockServer::start().await;
        let mut fallback = request_json(1, "FALLBACK_TICKET");
        fallback["ticketId"] = "T-1001".into();
        Mock::given(method("POST"))
            .and(path("/customer/handoff/transfer"))
            .and(body_json(serde_json::json!({
                "sessionId": 42, "reason": "billing issue", "priority": null
            })))
            .respond_with(ok(fallback))
            .expect(1)
            .mount(&server)
            .await;

        let req = client(&server)
            .request_transfer(TransferBody {
                session_id: SessionId(42),
                reason: Some("billing issue".into()),
                priority: None,
            })
            .await
            .unwrap();
        assert_eq!(req.status, HandoffStatus::FallbackTicket);
        assert_eq!(req.ticket_id.as_deref(), Some("T-1001"));
    }

    #[tokio::test]
    async fn slow_transfer_is_not_posted_twice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/customer/handoff/transfer"))
            .respond_with(ok(request_json(1, "PENDING")).set_delay(Duration::from_millis(1500)))
            .expect(1)
            .mount(&server)
            .await;

        let config = ApiConfig {
            base_url: server.uri(),
            timeout_secs: 1,
            max_retries: 1,
        };
        let api = RestClient::new(&config, &SecretString::from("tok".to_string()))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));
        let err = api
            .request_transfer(TransferBody {
                session_id: SessionId(42),
                reason: Some("billing issue".into()),
                priority: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Timeout { .. }));
    }

    #[tokio::test]
    async fn accept_race_lost_carries_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/handoff/accept"))
            .and(body_json(serde_json::json!({"handoffRequestId": 7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 409, "message": "accepted by operator 1", "data": null
            })))
            .mount(&server)
            .await;

        let err = client(&server).accept(RequestId(7)).await.unwrap_err();
        match err {
            SwitchboardError::RaceLost { request_id, .. } => {
                assert_eq!(request_id, Some(RequestId(7)));
            }
            other => panic!("expected RaceLost, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn by_session_without_request_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/handoff/by-session/42"))
            .respond_with(ok(serde_json::Value::Null))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/handoff/by-session/43"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": 404, "message": "unknown session", "data": null
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        assert!(api.by_session(SessionId(42)).await.unwrap().is_none());
        assert!(api.by_session(SessionId(43)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_and_pending_queue_paths() {
        let server = MockServer::start().await;
        let mut done = request_json(7, "COMPLETED");
        done["endedBy"] = "OPERATOR".into();
        Mock::given(method("POST"))
            .and(path("/agent/handoff/complete/7"))
            .respond_with(ok(done))
            .mount(&server)
            .await;
        let mut assigned = request_json(8, "ASSIGNED");
        assigned["assignedOperatorId"] = 3.into();
        Mock::given(method("GET"))
            .and(path("/agent/handoff/pending"))
            .respond_with(ok(serde_json::json!([request_json(9, "PENDING"), assigned])))
            .mount(&server)
            .await;

        let api = client(&server);
        let completed = api.complete(RequestId(7)).await.unwrap();
        assert_eq!(completed.status, HandoffStatus::Completed);

        let queue = api.pending_queue().await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].assigned_operator_id, Some(OperatorId(3)));
    }
}
