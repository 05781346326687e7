// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-handoff ratings: one WAITING record per completed request, and the
//! supervisor's review of them.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use switchboard_core::report::{
    self, LowScoreQuery, OperatorRating, RatingProcess, RatingQuery, RatingRecord, RatingStats,
    RatingStatus, RatingTrendPoint,
};
use switchboard_core::{
    CustomerId, HandoffRequest, OperatorId, PendingRating, RatingSubmission, RequestId, Result,
    SessionId, SwitchboardError,
};
use tracing::{debug, info};

use crate::state::DeskState;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RatingState {
    Waiting,
    Rated {
        rating: RatingSubmission,
        at: DateTime<Utc>,
    },
    Processed {
        rating: RatingSubmission,
        at: DateTime<Utc>,
        by: u64,
        note: Option<String>,
        processed_at: DateTime<Utc>,
    },
    Expired,
}

#[derive(Debug, Clone)]
pub(crate) struct RatingEntry {
    session_id: SessionId,
    customer_id: CustomerId,
    operator_id: Option<OperatorId>,
    completed_at: DateTime<Utc>,
    state: RatingState,
}

impl RatingEntry {
    /// The submission and when it arrived, once rated.
    fn rated(&self) -> Option<(&RatingSubmission, DateTime<Utc>)> {
        match &self.state {
            RatingState::Rated { rating, at } | RatingState::Processed { rating, at, .. } => {
                Some((rating, *at))
            }
            RatingState::Waiting | RatingState::Expired => None,
        }
    }

    fn status(&self) -> RatingStatus {
        match self.state {
            RatingState::Waiting => RatingStatus::Waiting,
            RatingState::Rated { .. } => RatingStatus::Rated,
            RatingState::Processed { .. } => RatingStatus::Processed,
            RatingState::Expired => RatingStatus::Expired,
        }
    }

    fn view(&self, id: RequestId) -> RatingRecord {
        let rated = self.rated();
        let (processed_by, processed_note, processed_at) = match &self.state {
            RatingState::Processed {
                by,
                note,
                processed_at,
                ..
            } => (Some(*by), note.clone(), Some(*processed_at)),
            _ => (None, None, None),
        };
        RatingRecord {
            handoff_request_id: id,
            session_id: self.session_id,
            customer_id: self.customer_id,
            operator_id: self.operator_id,
            status: self.status(),
            score: rated.map(|(r, _)| r.score),
            tags: rated.map(|(r, _)| r.tags.clone()).unwrap_or_default(),
            comment: rated.and_then(|(r, _)| r.comment.clone()),
            completed_at: self.completed_at,
            submitted_at: rated.map(|(_, at)| at),
            processed_by,
            processed_note,
            processed_at,
        }
    }
}

impl DeskState {
    /// Record that `request` awaits a rating. Repeated calls keep the first.
    pub(crate) fn open_rating(
        &mut self,
        request: &HandoffRequest,
        operator_id: Option<OperatorId>,
        now: DateTime<Utc>,
    ) {
        self.ratings.entry(request.id).or_insert_with(|| RatingEntry {
            session_id: request.session_id,
            customer_id: request.customer_id,
            operator_id,
            completed_at: now,
            state: RatingState::Waiting,
        });
    }

    fn rating_window(&self) -> Duration {
        i64::try_from(self.rating_config.expiry_hours)
            .ok()
            .and_then(Duration::try_hours)
            .unwrap_or(Duration::MAX)
    }

    /// Expire WAITING records older than the rating window.
    fn expire_ratings(&mut self, now: DateTime<Utc>) {
        let window = self.rating_window();
        for (id, record) in &mut self.ratings {
            if record.state == RatingState::Waiting && now - record.completed_at > window {
                debug!(request_id = %id, "rating window closed");
                record.state = RatingState::Expired;
            }
        }
    }

    /// Whether the customer's latest request in `session_id` still awaits a
    /// rating.
    pub fn pending_rating(
        &mut self,
        customer_id: CustomerId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> PendingRating {
        self.expire_ratings(now);
        let Some(id) = self.latest.get(&session_id).copied() else {
            return PendingRating::none(session_id);
        };
        match self.ratings.get(&id) {
            Some(record)
                if record.customer_id == customer_id
                    && record.session_id == session_id
                    && record.state == RatingState::Waiting =>
            {
                PendingRating {
                    need_rating: true,
                    session_id,
                    handoff_request_id: Some(id),
                    operator_id: record.operator_id,
                }
            }
            _ => PendingRating::none(session_id),
        }
    }

    pub fn submit_rating(
        &mut self,
        customer_id: CustomerId,
        rating: RatingSubmission,
        now: DateTime<Utc>,
    ) -> Result<()> {
        rating.validate(self.rating_config.max_comment_len)?;
        self.expire_ratings(now);
        let id = rating.handoff_request_id;
        let record = self
            .ratings
            .get_mut(&id)
            .filter(|r| r.customer_id == customer_id)
            .ok_or_else(|| SwitchboardError::NotFound(format!("no rating expected for request {id}")))?;
        match record.state {
            RatingState::Waiting => {
                info!(request_id = %id, score = rating.score, "rating submitted");
                record.state = RatingState::Rated { rating, at: now };
                Ok(())
            }
            RatingState::Rated { .. } | RatingState::Processed { .. } => {
                Err(SwitchboardError::InvalidTransition {
                    request_id: Some(id),
                    message: "already rated".into(),
                })
            }
            RatingState::Expired => Err(SwitchboardError::InvalidTransition {
                request_id: Some(id),
                message: "rating window has closed".into(),
            }),
        }
    }

    /// Ratings matching `query`, most recently submitted first. Unrated
    /// records sort by completion and drop out when a time bound is given.
    pub fn rating_list(&mut self, query: &RatingQuery, now: DateTime<Utc>) -> Vec<RatingRecord> {
        self.expire_ratings(now);
        let mut rows: Vec<RatingRecord> = self
            .ratings
            .iter()
            .map(|(id, record)| record.view(*id))
            .filter(|r| query.operator_id.is_none_or(|op| r.operator_id == Some(op)))
            .filter(|r| query.score.is_none_or(|score| r.score == Some(score)))
            .filter(|r| query.status.is_none_or(|status| r.status == status))
            .filter(|r| match r.submitted_at {
                Some(at) => {
                    query.since.is_none_or(|since| at >= since)
                        && query.until.is_none_or(|until| at <= until)
                }
                None => query.since.is_none() && query.until.is_none(),
            })
            .collect();
        rows.sort_by(|a, b| {
            let key = |r: &RatingRecord| (r.submitted_at.unwrap_or(r.completed_at), r.handoff_request_id);
            key(b).cmp(&key(a))
        });
        report::paged(rows.into_iter(), query.page, query.size)
    }

    /// Mark a submitted rating as followed up. Processing again replaces the
    /// note.
    pub fn process_rating(
        &mut self,
        id: RequestId,
        supervisor_id: u64,
        body: RatingProcess,
        now: DateTime<Utc>,
    ) -> Result<RatingRecord> {
        body.validate()?;
        self.expire_ratings(now);
        let record = self
            .ratings
            .get_mut(&id)
            .ok_or_else(|| SwitchboardError::NotFound(format!("no rating for request {id}")))?;
        let note = body.note.filter(|n| !n.trim().is_empty());
        let (rating, at) = match &record.state {
            RatingState::Rated { rating, at } | RatingState::Processed { rating, at, .. } => {
                (rating.clone(), *at)
            }
            RatingState::Waiting | RatingState::Expired => {
                return Err(SwitchboardError::InvalidTransition {
                    request_id: Some(id),
                    message: format!("rating is {}, nothing to process", record.status()),
                });
            }
        };
        record.state = RatingState::Processed {
            rating,
            at,
            by: supervisor_id,
            note,
            processed_at: now,
        };
        info!(request_id = %id, supervisor_id, "rating processed");
        Ok(record.view(id))
    }

    pub fn rating_stats(&self) -> RatingStats {
        let mut stats = RatingStats::default();
        let mut total = 0u32;
        let mut per_operator: BTreeMap<OperatorId, (u32, u32)> = BTreeMap::new();

        for record in self.ratings.values() {
            let Some((rating, _)) = record.rated() else {
                continue;
            };
            let score = u32::from(rating.score);
            stats.count += 1;
            total += score;
            if report::is_positive(rating.score) {
                stats.positive += 1;
            } else if report::is_negative(rating.score) {
                stats.negative += 1;
            } else {
                stats.neutral += 1;
            }
            for tag in &rating.tags {
                *stats.tags.entry(*tag).or_default() += 1;
            }
            if let Some(operator_id) = record.operator_id {
                let entry = per_operator.entry(operator_id).or_default();
                entry.0 += 1;
                entry.1 += score;
            }
        }

        stats.average = average(total, stats.count);
        stats.positive_rate = report::percent(stats.positive, stats.count);
        stats.operators = per_operator
            .into_iter()
            .map(|(operator_id, (count, sum))| OperatorRating {
                operator_id,
                count,
                average: average(sum, count),
            })
            .collect();
        stats
    }

    /// One point per UTC day over the window ending today, oldest first.
    pub fn rating_trend(&self, days: u32, now: DateTime<Utc>) -> Vec<RatingTrendPoint> {
        let days = report::trend_days(days);
        let today = now.date_naive();
        let first = today - Duration::days(i64::from(days) - 1);

        // date -> (count, sum, positive)
        let mut by_day: BTreeMap<NaiveDate, (u32, u32, u32)> = BTreeMap::new();
        for record in self.ratings.values() {
            let Some((rating, at)) = record.rated() else {
                continue;
            };
            let date = at.date_naive();
            if date < first || date > today {
                continue;
            }
            let day = by_day.entry(date).or_default();
            day.0 += 1;
            day.1 += u32::from(rating.score);
            day.2 += u32::from(report::is_positive(rating.score));
        }

        first
            .iter_days()
            .take(days as usize)
            .map(|date| {
                let (count, sum, positive) = by_day.get(&date).copied().unwrap_or_default();
                RatingTrendPoint {
                    date,
                    rated_count: count,
                    average: average(sum, count),
                    positive_rate: report::percent(positive, count),
                }
            })
            .collect()
    }

    /// Recent ratings at or below the threshold, lowest score first, newest
    /// first within a score.
    pub fn low_scores(&self, query: &LowScoreQuery, now: DateTime<Utc>) -> Vec<RatingRecord> {
        let query = query.normalized();
        let since = now - Duration::days(i64::from(query.days));
        let mut rows: Vec<RatingRecord> = self
            .ratings
            .iter()
            .filter(|(_, record)| {
                record
                    .rated()
                    .is_some_and(|(rating, at)| at >= since && rating.score <= query.max_score)
            })
            .map(|(id, record)| record.view(*id))
            .collect();
        rows.sort_by(|a, b| a.score.cmp(&b.score).then(b.submitted_at.cmp(&a.submitted_at)));
        rows.truncate(query.limit as usize);
        rows
    }
}

fn average(sum: u32, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        f64::from(sum) / f64::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{desk, online, transfer};
    use switchboard_core::RatingTag;

    fn completed(state: &mut DeskState, session: u64) -> RequestId {
        let request = transfer(state, session, "x");
        state.accept(OperatorId(1), request.id, Utc::now()).unwrap();
        state.complete(OperatorId(1), request.id, Utc::now()).unwrap();
        request.id
    }

    fn rating(id: RequestId, score: u8, tags: Vec<RatingTag>) -> RatingSubmission {
        RatingSubmission {
            handoff_request_id: id,
            score,
            tags,
            comment: None,
        }
    }

    fn rated(state: &mut DeskState, session: u64, score: u8, at: DateTime<Utc>) -> RequestId {
        let id = completed(state, session);
        state
            .submit_rating(CustomerId(9), rating(id, score, vec![]), at)
            .unwrap();
        id
    }

    #[test]
    fn pending_until_submitted() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let id = completed(&mut state, 42);

        let pending = state.pending_rating(CustomerId(9), SessionId(42), Utc::now());
        assert!(pending.need_rating);
        assert_eq!(pending.handoff_request_id, Some(id));
        assert_eq!(pending.operator_id, Some(OperatorId(1)));

        state
            .submit_rating(CustomerId(9), rating(id, 5, vec![RatingTag::Friendly]), Utc::now())
            .unwrap();
        assert!(!state.pending_rating(CustomerId(9), SessionId(42), Utc::now()).need_rating);

        let err = state
            .submit_rating(CustomerId(9), rating(id, 4, vec![]), Utc::now())
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidTransition { .. }));
    }

    #[test]
    fn other_customers_cannot_rate() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let id = completed(&mut state, 42);
        assert!(!state.pending_rating(CustomerId(8), SessionId(42), Utc::now()).need_rating);
        let err = state
            .submit_rating(CustomerId(8), rating(id, 5, vec![]), Utc::now())
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound(_)));
    }

    #[test]
    fn waiting_ratings_expire() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let id = completed(&mut state, 42);
        let later = Utc::now() + Duration::hours(73);

        assert!(!state.pending_rating(CustomerId(9), SessionId(42), later).need_rating);
        let err = state
            .submit_rating(CustomerId(9), rating(id, 5, vec![]), later)
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidTransition { .. }));
    }

    #[test]
    fn invalid_submission_is_rejected_before_lookup() {
        let mut state = desk(true);
        let err = state
            .submit_rating(CustomerId(9), rating(RequestId(99), 6, vec![]), Utc::now())
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Validation(_)));
    }

    #[test]
    fn stats_aggregate_scores_and_tags() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let first = completed(&mut state, 1);
        let second = completed(&mut state, 2);
        completed(&mut state, 3);

        state
            .submit_rating(
                CustomerId(9),
                rating(first, 5, vec![RatingTag::Friendly, RatingTag::Resolved]),
                Utc::now(),
            )
            .unwrap();
        state
            .submit_rating(CustomerId(9), rating(second, 2, vec![RatingTag::LongWait]), Utc::now())
            .unwrap();

        let stats = state.rating_stats();
        assert_eq!(stats.count, 2);
        assert!((stats.average - 3.5).abs() < f64::EPSILON);
        assert_eq!((stats.positive, stats.neutral, stats.negative), (1, 0, 1));
        assert!((stats.positive_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(stats.tags[&RatingTag::Friendly], 1);
        assert_eq!(stats.tags[&RatingTag::LongWait], 1);
        assert_eq!(stats.operators.len(), 1);
        assert_eq!(stats.operators[0].count, 2);
    }

    #[test]
    fn only_submitted_ratings_can_be_processed() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let waiting = completed(&mut state, 1);
        let scored = rated(&mut state, 2, 1, Utc::now());

        let err = state
            .process_rating(waiting, 7, RatingProcess::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidTransition { .. }));
        let err = state
            .process_rating(RequestId(99), 7, RatingProcess::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound(_)));

        let done = state
            .process_rating(
                scored,
                7,
                RatingProcess {
                    note: Some("called back".into()),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(done.status, RatingStatus::Processed);
        assert_eq!(done.processed_by, Some(7));
        assert_eq!(done.processed_note.as_deref(), Some("called back"));
        assert_eq!(done.score, Some(1));

        // Processed ratings still count.
        assert_eq!(state.rating_stats().count, 1);
    }

    #[test]
    fn overlong_processing_note_is_refused() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let id = rated(&mut state, 1, 2, Utc::now());
        let err = state
            .process_rating(
                id,
                7,
                RatingProcess {
                    note: Some("x".repeat(1001)),
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Validation(_)));
    }

    #[test]
    fn list_filters_and_orders_by_submission() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let now = Utc::now();
        let older = rated(&mut state, 1, 5, now - Duration::hours(2));
        let newer = rated(&mut state, 2, 3, now - Duration::hours(1));
        completed(&mut state, 3);

        let all = state.rating_list(&RatingQuery::default(), now);
        assert_eq!(all.len(), 3);

        let submitted = state.rating_list(
            &RatingQuery {
                status: Some(RatingStatus::Rated),
                ..RatingQuery::default()
            },
            now,
        );
        let ids: Vec<RequestId> = submitted.iter().map(|r| r.handoff_request_id).collect();
        assert_eq!(ids, vec![newer, older]);

        let fives = state.rating_list(
            &RatingQuery {
                score: Some(5),
                ..RatingQuery::default()
            },
            now,
        );
        assert_eq!(fives.len(), 1);
        assert_eq!(fives[0].handoff_request_id, older);
    }

    #[test]
    fn trend_covers_every_day_of_the_window() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let now = Utc::now();
        rated(&mut state, 1, 5, now);
        rated(&mut state, 2, 2, now);
        rated(&mut state, 3, 4, now - Duration::days(2));
        rated(&mut state, 4, 1, now - Duration::days(20));

        let week = state.rating_trend(14, now);
        assert_eq!(week.len(), 7);
        assert_eq!(week[6].date, now.date_naive());
        assert_eq!(week[6].rated_count, 2);
        assert!((week[6].average - 3.5).abs() < f64::EPSILON);
        assert!((week[6].positive_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(week[4].rated_count, 1);
        assert_eq!(week.iter().map(|p| p.rated_count).sum::<u32>(), 3);

        let month = state.rating_trend(30, now);
        assert_eq!(month.len(), 30);
        assert_eq!(month.iter().map(|p| p.rated_count).sum::<u32>(), 4);
    }

    #[test]
    fn low_scores_worst_first_then_newest() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let now = Utc::now();
        let two_old = rated(&mut state, 1, 2, now - Duration::hours(5));
        let one = rated(&mut state, 2, 1, now - Duration::hours(4));
        let two_new = rated(&mut state, 3, 2, now - Duration::hours(1));
        rated(&mut state, 4, 5, now);
        rated(&mut state, 5, 1, now - Duration::days(10));

        let rows = state.low_scores(&LowScoreQuery::default(), now);
        let ids: Vec<RequestId> = rows.iter().map(|r| r.handoff_request_id).collect();
        assert_eq!(ids, vec![one, two_new, two_old]);

        let worst = state.low_scores(
            &LowScoreQuery {
                limit: 1,
                ..LowScoreQuery::default()
            },
            now,
        );
        assert_eq!(worst.len(), 1);
        assert_eq!(worst[0].handoff_request_id, one);
    }
}
