//! Incremental event mirroring.
//!
//! Fetched events are turned into an ordered push plan, then folded through a
//! push/checkpoint pair. The cursor is only checkpointed after the matching push
//! succeeded and never moves backwards.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::domain::models::{ChargingSession, DataPoint, ErrorNotification, Subtype};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPush {
    pub point: DataPoint,
    /// Cursor candidate to persist once `point` has been pushed.
    pub cursor: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldState {
    pub pushed: usize,
    pub cursor: DateTime<Utc>,
}

#[derive(Debug, PartialEq)]
pub struct FoldFailure<E> {
    pub state: FoldState,
    pub error: E,
}

/// Completed sessions of exactly this connector that end after the cursor,
/// ordered by session start.
pub fn plan_sessions(
    sessions: Vec<ChargingSession>,
    connector_id: &str,
    session_log_asset_id: i32,
    cursor: DateTime<Utc>,
) -> Vec<PlannedPush> {
    let mut completed: Vec<ChargingSession> = sessions
        .into_iter()
        .filter(|session| session.connector_id == connector_id && session.is_completed())
        .filter(|session| session.session_end.is_some_and(|end| end > cursor))
        .collect();
    completed.sort_by_key(|session| session.session_start);

    completed
        .into_iter()
        .filter_map(|session| {
            let end = session.session_end?;
            Some(PlannedPush {
                point: DataPoint {
                    asset_id: session_log_asset_id,
                    subtype: Subtype::Input,
                    timestamp: end,
                    data: object(json!({
                        "count": 1,
                        "energy": session.meter_total.max(0),
                        "duration": session.duration,
                    })),
                },
                cursor: Some(end),
            })
        })
        .collect()
}

/// Notifications for this connector (or the whole charge point) that occurred
/// after the cursor, ordered by occurrence.
pub fn relevant_errors(
    notifications: Vec<ErrorNotification>,
    connector_id: &str,
    cursor: DateTime<Utc>,
) -> Vec<ErrorNotification> {
    let mut relevant: Vec<ErrorNotification> = notifications
        .into_iter()
        .filter(|notification| {
            notification
                .connector_id
                .as_deref()
                .is_none_or(|id| id == connector_id)
        })
        .filter(|notification| notification.occurred_at.is_some_and(|at| at > cursor))
        .collect();
    relevant.sort_by_key(|notification| notification.occurred_at);
    relevant
}

/// Resolved errors reset the indicator at their resolution time but move the
/// cursor to their occurrence time.
pub fn plan_resolved_errors(
    notifications: &[ErrorNotification],
    connector_asset_id: i32,
) -> Vec<PlannedPush> {
    notifications
        .iter()
        .filter_map(|notification| {
            let resolved_at = notification.resolved_at?;
            let occurred_at = notification.occurred_at?;
            Some(PlannedPush {
                point: DataPoint {
                    asset_id: connector_asset_id,
                    subtype: Subtype::Status,
                    timestamp: resolved_at,
                    data: object(json!({ "error": 0, "error_message": "-" })),
                },
                cursor: Some(occurred_at),
            })
        })
        .collect()
}

/// Open errors are pushed with their 1-based position among open errors.
/// They never move the cursor.
pub fn plan_open_errors(
    notifications: &[ErrorNotification],
    connector_asset_id: i32,
) -> Vec<PlannedPush> {
    notifications
        .iter()
        .filter(|notification| !notification.is_resolved())
        .filter_map(|notification| notification.occurred_at.map(|at| (notification, at)))
        .enumerate()
        .map(|(position, (notification, occurred_at))| PlannedPush {
            point: DataPoint {
                asset_id: connector_asset_id,
                subtype: Subtype::Status,
                timestamp: occurred_at,
                data: object(json!({
                    "error": position + 1,
                    "error_message": notification.message(),
                })),
            },
            cursor: None,
        })
        .collect()
}

/// Pushes every planned point in order, checkpointing the cursor after each
/// successful push. Stops at the first failure and reports how far it got.
pub fn apply_plan<E, P, C>(
    plan: Vec<PlannedPush>,
    cursor: DateTime<Utc>,
    mut push: P,
    mut checkpoint: C,
) -> Result<FoldState, FoldFailure<E>>
where
    P: FnMut(&DataPoint) -> Result<(), E>,
    C: FnMut(DateTime<Utc>) -> Result<(), E>,
{
    let initial = FoldState { pushed: 0, cursor };

    plan.into_iter().try_fold(initial, |mut state, planned| {
        push(&planned.point).map_err(|error| FoldFailure { state, error })?;
        state.pushed += 1;

        if let Some(candidate) = planned.cursor
            && candidate > state.cursor
        {
            checkpoint(candidate).map_err(|error| FoldFailure { state, error })?;
            state.cursor = candidate;
        }

        Ok(state)
    })
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
