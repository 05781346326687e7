// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor reporting: the handoff event trail, handoff records, and rating
//! review.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};
use crate::types::{
    CustomerId, HandoffStatus, OperatorId, Party, Priority, RatingTag, RequestId, SessionId,
};

const MAX_PAGE_SIZE: u32 = 100;

/// What happened to a request at one point of its life.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HandoffEventKind {
    Created,
    Assigned,
    /// An undecided offer went back to the queue.
    Released,
    Accepted,
    Rejected,
    /// The first message of the live conversation.
    Started,
    Completed,
    Cancelled,
    Closed,
}

/// One entry of a request's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffEventRecord {
    pub id: u64,
    pub handoff_request_id: RequestId,
    pub kind: HandoffEventKind,
    /// Who caused it.
    pub party: Party,
    /// Customer or operator id behind `party`; the operator involved for
    /// system events.
    #[serde(default)]
    pub actor_id: Option<u64>,
    #[serde(default)]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A finished or ongoing handoff as a supervisor reviews it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRecord {
    pub handoff_request_id: RequestId,
    pub session_id: SessionId,
    pub customer_id: CustomerId,
    /// The operator who accepted it, or who holds the current offer.
    #[serde(default)]
    pub operator_id: Option<OperatorId>,
    #[serde(default)]
    pub ticket_id: Option<String>,
    pub status: HandoffStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Creation to acceptance.
    #[serde(default)]
    pub wait_seconds: Option<u64>,
    /// Acceptance to the end of the conversation.
    #[serde(default)]
    pub chat_seconds: Option<u64>,
}

/// Filter and paging for handoff records. Time bounds apply to creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub operator_id: Option<OperatorId>,
    #[serde(default)]
    pub status: Option<HandoffStatus>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            customer_id: None,
            operator_id: None,
            status: None,
            since: None,
            until: None,
            page: default_page(),
            size: default_page_size(),
        }
    }
}

impl RecordQuery {
    pub fn within(&self, at: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| at >= since) && self.until.is_none_or(|until| at <= until)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RatingStatus {
    Waiting,
    Rated,
    /// Rated, then followed up by a supervisor.
    Processed,
    Expired,
}

/// One rating as a supervisor reviews it. Keyed by its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
    pub handoff_request_id: RequestId,
    pub session_id: SessionId,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub operator_id: Option<OperatorId>,
    pub status: RatingStatus,
    #[serde(default)]
    pub score: Option<u8>,
    #[serde(default)]
    pub tags: Vec<RatingTag>,
    #[serde(default)]
    pub comment: Option<String>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_by: Option<u64>,
    #[serde(default)]
    pub processed_note: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Filter and paging for the rating list. Time bounds apply to submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingQuery {
    #[serde(default)]
    pub operator_id: Option<OperatorId>,
    #[serde(default)]
    pub score: Option<u8>,
    #[serde(default)]
    pub status: Option<RatingStatus>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

impl Default for RatingQuery {
    fn default() -> Self {
        Self {
            operator_id: None,
            score: None,
            status: None,
            since: None,
            until: None,
            page: default_page(),
            size: default_page_size(),
        }
    }
}

/// Supervisor follow-up on a rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingProcess {
    #[serde(default)]
    pub note: Option<String>,
}

impl RatingProcess {
    pub const MAX_NOTE_LEN: usize = 1000;

    pub fn validate(&self) -> Result<()> {
        if let Some(note) = &self.note {
            let len = note.chars().count();
            if len > Self::MAX_NOTE_LEN {
                return Err(SwitchboardError::Validation(format!(
                    "processing note is {len} characters, limit is {}",
                    Self::MAX_NOTE_LEN
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate score for one operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorRating {
    pub operator_id: OperatorId,
    pub count: u32,
    pub average: f64,
}

/// Desk-wide rating statistics over rated and processed ratings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    pub count: u32,
    /// 0.0 when nothing has been rated.
    pub average: f64,
    /// Scores 4 and 5.
    pub positive: u32,
    pub neutral: u32,
    /// Scores 1 and 2.
    pub negative: u32,
    /// Percentage of positive scores.
    pub positive_rate: f64,
    pub tags: BTreeMap<RatingTag, u32>,
    pub operators: Vec<OperatorRating>,
}

/// Satisfaction on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingTrendPoint {
    pub date: NaiveDate,
    pub rated_count: u32,
    pub average: f64,
    /// Percentage of positive scores.
    pub positive_rate: f64,
}

/// Trend windows a supervisor may ask for; anything else means 7 days.
pub fn trend_days(days: u32) -> u32 {
    match days {
        7 | 30 | 90 => days,
        _ => 7,
    }
}

/// Worst recent ratings, for an alert card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowScoreQuery {
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_max_score")]
    pub max_score: u8,
}

impl Default for LowScoreQuery {
    fn default() -> Self {
        Self {
            days: default_days(),
            limit: default_limit(),
            max_score: default_max_score(),
        }
    }
}

impl LowScoreQuery {
    /// Replace out-of-range values with the defaults.
    pub fn normalized(&self) -> Self {
        Self {
            days: if self.days == 0 { default_days() } else { self.days },
            limit: if (1..=MAX_PAGE_SIZE).contains(&self.limit) {
                self.limit
            } else {
                default_limit()
            },
            max_score: if (1..=5).contains(&self.max_score) {
                self.max_score
            } else {
                default_max_score()
            },
        }
    }
}

/// Positive is 4 or 5, negative is 1 or 2.
pub fn is_positive(score: u8) -> bool {
    score >= 4
}

pub fn is_negative(score: u8) -> bool {
    score <= 2
}

/// Percentage, 0.0 for an empty population.
pub fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) * 100.0 / f64::from(whole)
    }
}

/// Page `items` from 1, clamping the size to 1..=100.
pub fn paged<T>(items: impl Iterator<Item = T>, page: u32, size: u32) -> Vec<T> {
    let size = size.clamp(1, MAX_PAGE_SIZE) as usize;
    let skip = (page.max(1) as usize - 1) * size;
    items.skip(skip).take(size).collect()
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

fn default_days() -> u32 {
    7
}

fn default_limit() -> u32 {
    10
}

fn default_max_score() -> u8 {
    2
}
