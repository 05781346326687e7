// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor reporting collaborator.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use switchboard_core::report::{
    HandoffEventRecord, HandoffRecord, LowScoreQuery, RatingProcess, RatingQuery, RatingRecord,
    RatingStats, RatingTrendPoint, RecordQuery,
};
use switchboard_core::{ReportApi, RequestId, Result};

use crate::client::{RestClient, required};

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn paging(params: &mut Vec<(&'static str, String)>, page: u32, size: u32) {
    params.push(("page", page.to_string()));
    params.push(("size", size.to_string()));
}

fn window(
    params: &mut Vec<(&'static str, String)>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) {
    params.extend(since.map(|at| ("since", timestamp(at))));
    params.extend(until.map(|at| ("until", timestamp(at))));
}

#[async_trait]
impl ReportApi for RestClient {
    async fn records(&self, query: RecordQuery) -> Result<Vec<HandoffRecord>> {
        let mut params = Vec::new();
        params.extend(query.customer_id.map(|id| ("customerId", id.to_string())));
        params.extend(query.operator_id.map(|id| ("operatorId", id.to_string())));
        params.extend(query.status.map(|status| ("status", status.to_string())));
        window(&mut params, query.since, query.until);
        paging(&mut params, query.page, query.size);
        let data = self.get("/admin/handoff/records", &params).await?;
        Ok(data.unwrap_or_default())
    }

    async fn events(&self, id: RequestId) -> Result<Vec<HandoffEventRecord>> {
        let data = self
            .get(&format!("/admin/handoff/{id}/events"), &[])
            .await
            .map_err(|e| e.for_request(id))?;
        Ok(data.unwrap_or_default())
    }

    async fn ratings(&self, query: RatingQuery) -> Result<Vec<RatingRecord>> {
        let mut params = Vec::new();
        params.extend(query.operator_id.map(|id| ("operatorId", id.to_string())));
        params.extend(query.score.map(|score| ("score", score.to_string())));
        params.extend(query.status.map(|status| ("status", status.to_string())));
        window(&mut params, query.since, query.until);
        paging(&mut params, query.page, query.size);
        let data = self.get("/admin/handoff/rating/list", &params).await?;
        Ok(data.unwrap_or_default())
    }

    async fn rating_stats(&self) -> Result<RatingStats> {
        let data = self.get("/admin/handoff/rating/stats", &[]).await?;
        Ok(data.unwrap_or_default())
    }

    async fn process_rating(&self, id: RequestId, body: RatingProcess) -> Result<RatingRecord> {
        let data = self
            .post(&format!("/admin/handoff/rating/{id}/process"), &body)
            .await
            .map_err(|e| e.for_request(id))?;
        required(data, "process rating")
    }

    async fn rating_trend(&self, days: u32) -> Result<Vec<RatingTrendPoint>> {
        let data = self
            .get("/admin/handoff/rating/trend", &[("days", days.to_string())])
            .await?;
        Ok(data.unwrap_or_default())
    }

    async fn low_scores(&self, query: LowScoreQuery) -> Result<Vec<RatingRecord>> {
        let params = [
            ("days", query.days.to_string()),
            ("limit", query.limit.to_string()),
            ("maxScore", query.max_score.to_string()),
        ];
        let data = self
            .get("/admin/handoff/rating/low-score/top", &params)
            .await?;
        Ok(data.unwrap_or_default())
    }
}
