// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::Result;
use crate::report::{
    HandoffEventRecord, HandoffRecord, LowScoreQuery, RatingProcess, RatingQuery, RatingRecord,
    RatingStats, RatingTrendPoint, RecordQuery,
};
use crate::types::RequestId;

/// Supervisor reporting collaborator.
#[async_trait]
pub trait ReportApi: Send + Sync + 'static {
    /// Handoff records, newest first.
    async fn records(&self, query: RecordQuery) -> Result<Vec<HandoffRecord>>;

    /// Audit trail of one request, oldest first.
    async fn events(&self, id: RequestId) -> Result<Vec<HandoffEventRecord>>;

    /// Ratings, most recently submitted first.
    async fn ratings(&self, query: RatingQuery) -> Result<Vec<RatingRecord>>;

    async fn rating_stats(&self) -> Result<RatingStats>;

    /// Record a supervisor's follow-up on a submitted rating.
    async fn process_rating(&self, id: RequestId, body: RatingProcess) -> Result<RatingRecord>;

    /// Daily satisfaction over the last 7, 30, or 90 days.
    async fn rating_trend(&self, days: u32) -> Result<Vec<RatingTrendPoint>>;

    /// Lowest recent scores, worst first.
    async fn low_scores(&self, query: LowScoreQuery) -> Result<Vec<RatingRecord>>;
}
