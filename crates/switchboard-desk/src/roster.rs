// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator presence and capacity on the desk.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use switchboard_core::{
    Actor, OperatorId, OperatorPresence, PresenceStatus, Result, Role, message_types,
};
use tracing::info;

use crate::state::{DeskState, unknown_operator};

/// Static attributes an operator registers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorProfile {
    pub operator_id: OperatorId,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub senior: bool,
    #[serde(default)]
    pub auto_accept: bool,
    /// Falls back to `desk.default_max_sessions`.
    #[serde(default)]
    pub max_sessions: Option<u32>,
}

impl OperatorProfile {
    pub fn new(operator_id: OperatorId) -> Self {
        Self {
            operator_id,
            skills: Vec::new(),
            senior: false,
            auto_accept: false,
            max_sessions: None,
        }
    }
}

impl DeskState {
    /// Add an operator, or refresh the profile of a known one. Status and load
    /// are kept on refresh.
    pub fn register_operator(&mut self, profile: OperatorProfile, now: DateTime<Utc>) -> OperatorPresence {
        let max = profile.max_sessions.unwrap_or(self.config.default_max_sessions);
        let presence = self
            .operators
            .entry(profile.operator_id)
            .or_insert_with(|| {
                let mut fresh = OperatorPresence::new(profile.operator_id, max);
                fresh.last_active_at = now;
                fresh
            });
        presence.max_session_count = max;
        presence.skills = profile.skills;
        presence.senior = profile.senior;
        presence.auto_accept = profile.auto_accept;
        presence.revision += 1;
        presence.clone()
    }

    pub fn set_status(
        &mut self,
        operator_id: OperatorId,
        status: PresenceStatus,
        now: DateTime<Utc>,
    ) -> Result<OperatorPresence> {
        let presence = self
            .operators
            .get_mut(&operator_id)
            .ok_or_else(|| unknown_operator(operator_id))?;
        let previous = presence.status;
        presence.status = status;
        presence.last_active_at = now;
        presence.revision += 1;
        let snapshot = presence.clone();

        if previous != status {
            info!(operator_id = %operator_id, from = %previous, to = %status, "presence changed");
        }
        self.push_to(Actor::operator(operator_id), message_types::PRESENCE_UPDATE, &snapshot);
        self.push_to_role(Role::Supervisor, message_types::PRESENCE_UPDATE, &snapshot);

        // Only ONLINE operators take new work; leaving it hands back open offers.
        if previous != status {
            if status != PresenceStatus::Online {
                self.release_offers(operator_id, now);
            }
            self.assign_waiting(now);
            self.publish_queue();
        }
        Ok(snapshot)
    }

    /// Supervisor override; observably identical to the operator's own change.
    pub fn force_status(
        &mut self,
        operator_id: OperatorId,
        status: PresenceStatus,
        now: DateTime<Utc>,
    ) -> Result<OperatorPresence> {
        info!(operator_id = %operator_id, status = %status, "presence forced by supervisor");
        self.set_status(operator_id, status, now)
    }

    pub fn heartbeat(&mut self, operator_id: OperatorId, now: DateTime<Utc>) -> Result<()> {
        let presence = self
            .operators
            .get_mut(&operator_id)
            .ok_or_else(|| unknown_operator(operator_id))?;
        presence.last_active_at = now;
        Ok(())
    }

    /// Demote operators silent for longer than the grace window. Returns who
    /// was demoted.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<OperatorId> {
        let grace = i64::try_from(self.config.offline_grace_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let stale: Vec<OperatorId> = self
            .operators
            .values()
            .filter(|o| o.status != PresenceStatus::Offline && now - o.last_active_at > grace)
            .map(|o| o.operator_id)
            .collect();
        for operator_id in &stale {
            info!(operator_id = %operator_id, "heartbeat lapsed, demoting to offline");
            // Keep the last heartbeat time rather than stamping the sweep.
            let last_seen = self.operators.get(operator_id).map(|o| o.last_active_at);
            if self.set_status(*operator_id, PresenceStatus::Offline, now).is_ok()
                && let (Some(seen), Some(presence)) = (last_seen, self.operators.get_mut(operator_id))
            {
                presence.last_active_at = seen;
            }
        }
        stale
    }

    pub fn roster(&self) -> Vec<OperatorPresence> {
        self.operators.values().cloned().collect()
    }

    pub fn operator(&self, operator_id: OperatorId) -> Result<OperatorPresence> {
        self.operators
            .get(&operator_id)
            .cloned()
            .ok_or_else(|| unknown_operator(operator_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::Target;
    use crate::state::tests::{desk, online, transfer};
    use switchboard_core::HandoffStatus;

    #[test]
    fn register_keeps_status_on_refresh() {
        let mut state = desk(false);
        online(&mut state, 3, &[]);
        let refreshed = state.register_operator(
            OperatorProfile {
                operator_id: OperatorId(3),
                skills: vec!["billing".into()],
                max_sessions: Some(2),
                ..OperatorProfile::new(OperatorId(3))
            },
            Utc::now(),
        );
        assert_eq!(refreshed.status, PresenceStatus::Online);
        assert_eq!(refreshed.max_session_count, 2);
        assert_eq!(refreshed.skills, vec!["billing".to_string()]);
    }

    #[test]
    fn unknown_operator_is_not_found() {
        let mut state = desk(false);
        assert!(state
            .set_status(OperatorId(5), PresenceStatus::Online, Utc::now())
            .is_err());
        assert!(state.heartbeat(OperatorId(5), Utc::now()).is_err());
    }

    #[test]
    fn force_status_pushes_to_operator_and_supervisors() {
        let mut state = desk(false);
        online(&mut state, 3, &[]);
        state.take_pushes();

        state
            .force_status(OperatorId(3), PresenceStatus::Away, Utc::now())
            .unwrap();
        let pushes = state.take_pushes();
        let targets: Vec<Target> = pushes
            .iter()
            .filter(|p| p.envelope.kind == message_types::PRESENCE_UPDATE)
            .map(|p| p.target)
            .collect();
        assert_eq!(
            targets,
            vec![
                Target::Actor(Actor::operator(OperatorId(3))),
                Target::Role(Role::Supervisor)
            ]
        );
        let presence: OperatorPresence = pushes[0].envelope.decode().unwrap();
        assert_eq!(presence.status, PresenceStatus::Away);
    }

    #[test]
    fn going_online_assigns_waiting_requests() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        state
            .set_status(OperatorId(1), PresenceStatus::Offline, Utc::now())
            .unwrap();
        // Admission needs someone online; operator 2 takes the slot and leaves.
        online(&mut state, 2, &[]);
        if let Some(op) = state.operators.get_mut(&OperatorId(2)) {
            op.max_session_count = 0;
        }
        let request = transfer(&mut state, 42, "x");
        assert_eq!(request.status, HandoffStatus::Pending);

        state
            .set_status(OperatorId(1), PresenceStatus::Online, Utc::now())
            .unwrap();
        let after = state.request(request.id).unwrap();
        assert_eq!(after.status, HandoffStatus::Assigned);
        assert_eq!(after.assigned_operator_id, Some(OperatorId(1)));
    }

    #[test]
    fn sweep_demotes_silent_operators_and_releases_offers() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        assert_eq!(request.assigned_operator_id, Some(OperatorId(1)));

        let later = Utc::now() + Duration::seconds(1801);
        assert!(state.sweep(Utc::now()).is_empty());
        assert_eq!(state.sweep(later), vec![OperatorId(1)]);

        let presence = state.operator(OperatorId(1)).unwrap();
        assert_eq!(presence.status, PresenceStatus::Offline);
        assert!(presence.last_active_at < later);

        let released = state.request(request.id).unwrap();
        assert_eq!(released.status, HandoffStatus::Pending);
        assert!(released.assigned_operator_id.is_none());
        assert!(released.revision > request.revision);
    }

    #[test]
    fn going_away_hands_back_open_offers() {
        let mut state = desk(true);
        online(&mut state, 1, &["billing"]);
        online(&mut state, 2, &[]);
        let request = transfer(&mut state, 42, "billing issue");
        assert_eq!(request.assigned_operator_id, Some(OperatorId(1)));

        state
            .set_status(OperatorId(1), PresenceStatus::Away, Utc::now())
            .unwrap();
        let moved = state.request(request.id).unwrap();
        assert_eq!(moved.status, HandoffStatus::Assigned);
        assert_eq!(moved.assigned_operator_id, Some(OperatorId(2)));
        assert!(state.pending_for(OperatorId(1)).is_empty());
    }

    #[test]
    fn every_presence_change_bumps_the_revision() {
        let mut state = desk(false);
        online(&mut state, 1, &[]);
        let before = state.operator(OperatorId(1)).unwrap().revision;
        let away = state
            .set_status(OperatorId(1), PresenceStatus::Away, Utc::now())
            .unwrap();
        assert!(away.revision > before);
        let forced = state
            .force_status(OperatorId(1), PresenceStatus::Online, Utc::now())
            .unwrap();
        assert!(forced.revision > away.revision);
    }

    #[test]
    fn heartbeat_keeps_operator_online() {
        let mut state = desk(false);
        online(&mut state, 1, &[]);
        let later = Utc::now() + Duration::seconds(1700);
        state.heartbeat(OperatorId(1), later).unwrap();
        assert!(state.sweep(later + Duration::seconds(200)).is_empty());
    }
}
