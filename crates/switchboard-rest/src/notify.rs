// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification and rating collaborators.

use async_trait::async_trait;
use switchboard_core::wire::{BroadcastBody, MarkReadBody, NotificationQuery};
use switchboard_core::{
    Notification, NotificationApi, NotificationId, PendingRating, RatingApi, RatingSubmission,
    Result, SessionId,
};

use crate::client::{RestClient, required};

#[async_trait]
impl NotificationApi for RestClient {
    async fn broadcast(&self, body: BroadcastBody) -> Result<Notification> {
        let data = self.post_once("/admin/notify/broadcast", &body).await?;
        required(data, "broadcast")
    }

    async fn list(&self, query: NotificationQuery) -> Result<Vec<Notification>> {
        let params = [
            ("unreadOnly", query.unread_only.to_string()),
            ("page", query.page.to_string()),
            ("size", query.size.to_string()),
        ];
        let data = self.get("/notify/list", &params).await?;
        Ok(data.unwrap_or_default())
    }

    async fn mark_read(&self, ids: Vec<NotificationId>) -> Result<u32> {
        let data = self.post("/notify/read", &MarkReadBody { ids }).await?;
        Ok(data.unwrap_or_default())
    }
}

#[async_trait]
impl RatingApi for RestClient {
    async fn pending(&self, session_id: SessionId) -> Result<PendingRating> {
        let data = self
            .get(
                "/customer/handoff/rating/pending",
                &[("sessionId", session_id.to_string())],
            )
            .await?;
        Ok(data.unwrap_or_else(|| PendingRating::none(session_id)))
    }

    async fn submit(&self, rating: RatingSubmission) -> Result<()> {
        let id = rating.handoff_request_id;
        let _: Option<serde_json::Value> = self
            .post_once("/customer/handoff/rating", &rating)
            .await
            .map_err(|e| e.for_request(id))?;
        Ok(())
    }
}
