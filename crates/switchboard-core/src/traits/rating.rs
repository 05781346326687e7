// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PendingRating, RatingSubmission, SessionId};

/// Post-handoff rating collaborator.
#[async_trait]
pub trait RatingApi: Send + Sync + 'static {
    async fn pending(&self, session_id: SessionId) -> Result<PendingRating>;

    async fn submit(&self, rating: RatingSubmission) -> Result<()>;
}
