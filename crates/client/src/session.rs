//! Server-authoritative session snapshot and the reconciliation rules that
//! merge inbound `session_info` payloads into it.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, warn};

use memora_protocol::{CistCategory, LifecycleState, SessionInfo};

/// One active conversation session.
///
/// Scalar fields here are server-owned: the client reads whatever the server
/// last reported and never increments or transitions them locally. Only
/// [`apply`](Self::apply) writes them after construction.
#[derive(Debug, Clone)]
pub struct Session {
    /// Client-assigned at creation, superseded by the server-issued id once
    /// the server confirms.
    pub session_id: String,
    pub user_id: String,
    /// Insertion order is display order.
    pub photo_ids: Vec<String>,
    pub turn_count: u32,
    pub lifecycle: LifecycleState,
    pub progress: BTreeMap<CistCategory, bool>,
    pub scores: BTreeMap<CistCategory, f64>,
    pub is_complete: bool,
    pub start_time: String,
    pub last_activity: String,
}

impl Session {
    pub fn new(user_id: &str, photo_ids: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: format!("session_{}_{}", user_id, now.timestamp_millis()),
            user_id: user_id.to_string(),
            photo_ids,
            turn_count: 0,
            lifecycle: LifecycleState::Init,
            progress: BTreeMap::new(),
            scores: BTreeMap::new(),
            is_complete: false,
            start_time: now.to_rfc3339(),
            last_activity: now.to_rfc3339(),
        }
    }

    /// Reconciles a server snapshot into local state.
    ///
    /// Scalars are last-write-wins; the server is the sole authority for
    /// them. Progress booleans merge monotonically: a stale or partial
    /// snapshot cannot revert a category that already read complete. Scores
    /// are overwritten per present key and clamped to the category range;
    /// absent keys keep their held value.
    pub fn apply(&mut self, info: &SessionInfo) {
        if let Some(session_id) = &info.session_id {
            self.session_id = session_id.clone();
        }
        if let Some(turn_count) = info.turn_count {
            if turn_count < self.turn_count {
                // Not rejected: the server stays authoritative even when it
                // regresses, but the regression is worth a trace.
                warn!(
                    target: "chat.session",
                    held = self.turn_count,
                    reported = turn_count,
                    "server turn count went backward"
                );
            }
            self.turn_count = turn_count;
        }
        if let Some(state) = info.current_state {
            if state == LifecycleState::Unknown {
                warn!(target: "chat.session", "ignoring unrecognized lifecycle state");
            } else {
                self.lifecycle = state;
            }
        }
        for (key, done) in &info.cist_progress {
            let Some(category) = CistCategory::parse(key) else {
                debug!(target: "chat.session", category = %key, "ignoring unknown progress category");
                continue;
            };
            let slot = self.progress.entry(category).or_insert(false);
            *slot = *slot || *done;
        }
        for (key, score) in &info.cist_scores {
            let Some(category) = CistCategory::parse(key) else {
                debug!(target: "chat.session", category = %key, "ignoring unknown score category");
                continue;
            };
            let clamped = score.clamp(0.0, category.max_score());
            if (clamped - score).abs() > f64::EPSILON {
                warn!(
                    target: "chat.session",
                    category = %key,
                    score,
                    max = category.max_score(),
                    "score outside category range; clamping"
                );
            }
            self.scores.insert(category, clamped);
        }
        if let Some(is_complete) = info.is_complete {
            self.is_complete = is_complete;
        }
        self.touch();
    }

    /// Records activity on the session.
    pub(crate) fn touch(&mut self) {
        self.last_activity = Utc::now().to_rfc3339();
    }

    /// String-keyed view of the progress map for outbound frames.
    pub(crate) fn progress_wire(&self) -> BTreeMap<String, bool> {
        self.progress
            .iter()
            .map(|(category, done)| (category.as_str().to_string(), *done))
            .collect()
    }

    /// String-keyed view of the score map for outbound frames.
    pub(crate) fn scores_wire(&self) -> BTreeMap<String, f64> {
        self.scores
            .iter()
            .map(|(category, score)| (category.as_str().to_string(), *score))
            .collect()
    }
}
