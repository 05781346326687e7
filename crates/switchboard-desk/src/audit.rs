// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handoff event trail and the supervisor's record view.

use chrono::{DateTime, Utc};
use switchboard_core::report::{
    self, HandoffEventKind, HandoffEventRecord, HandoffRecord, RecordQuery,
};
use switchboard_core::{Party, RequestId, Result};
use tracing::trace;

use crate::state::{DeskState, Entry, unknown_request};

impl DeskState {
    /// Append to a request's trail. Every status change records one entry.
    pub(crate) fn record_event(
        &mut self,
        id: RequestId,
        kind: HandoffEventKind,
        party: Party,
        actor_id: Option<u64>,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) {
        let event = HandoffEventRecord {
            id: self.next_event,
            handoff_request_id: id,
            kind,
            party,
            actor_id,
            detail,
            created_at: now,
        };
        self.next_event += 1;
        trace!(request_id = %id, kind = %kind, "handoff event");
        self.events.push(event);
    }

    /// A request's trail, oldest first.
    pub fn events_for(&self, id: RequestId) -> Result<Vec<HandoffEventRecord>> {
        if !self.requests.contains_key(&id) {
            return Err(unknown_request(id));
        }
        Ok(self
            .events
            .iter()
            .filter(|e| e.handoff_request_id == id)
            .cloned()
            .collect())
    }

    /// Handoff records matching `query`, newest first.
    pub fn records(&self, query: &RecordQuery) -> Vec<HandoffRecord> {
        let rows = self
            .requests
            .values()
            .rev()
            .map(record_of)
            .filter(|r| query.customer_id.is_none_or(|c| r.customer_id == c))
            .filter(|r| query.operator_id.is_none_or(|op| r.operator_id == Some(op)))
            .filter(|r| query.status.is_none_or(|s| r.status == s))
            .filter(|r| query.within(r.created_at));
        report::paged(rows, query.page, query.size)
    }
}

fn record_of(entry: &Entry) -> HandoffRecord {
    let request = &entry.request;
    let seconds = |from: DateTime<Utc>, to: DateTime<Utc>| {
        u64::try_from((to - from).num_seconds()).unwrap_or(0)
    };
    HandoffRecord {
        handoff_request_id: request.id,
        session_id: request.session_id,
        customer_id: request.customer_id,
        operator_id: entry.served_by.or(request.assigned_operator_id),
        ticket_id: request.ticket_id.clone(),
        status: request.status,
        priority: request.priority,
        created_at: request.created_at,
        accepted_at: entry.accepted_at,
        ended_at: entry.ended_at,
        wait_seconds: entry.accepted_at.map(|at| seconds(request.created_at, at)),
        chat_seconds: entry
            .accepted_at
            .zip(entry.ended_at)
            .map(|(from, to)| seconds(from, to)),
    }
}
