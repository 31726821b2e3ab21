use crate::converge::{AggregateResult, RunStatus};
use crate::ops::cli::ExitError;
use crate::ring::RingAssignment;

pub fn render_plan(group_name: &str, plan: &RingAssignment) -> String {
    let mut out = format!(
        "plan: {} failover on group {group_name:?} ({} members)\n",
        plan.action().as_str(),
        plan.len()
    );
    for a in plan {
        out.push_str(&format!("  collector {}: {}\n", a.member_id, a.requested_state()));
    }
    out
}

pub fn render_result(result: &AggregateResult) -> String {
    let mut out = String::new();
    for o in &result.outcomes {
        match &o.failure {
            None => out.push_str(&format!("collector {}: ok {}\n", o.member_id, o.requested)),
            Some(failure) => {
                out.push_str(&format!(
                    "collector {}: FAILED {failure} (requested {}",
                    o.member_id, o.requested
                ));
                if let Some(observed) = &o.observed {
                    out.push_str(&format!(", observed {observed}"));
                }
                out.push_str(")\n");
            }
        }
    }
    if !result.not_attempted.is_empty() {
        let ids: Vec<String> = result.not_attempted.iter().map(|id| id.to_string()).collect();
        out.push_str(&format!("not attempted: {}\n", ids.join(", ")));
    }
    out.push_str(&format!(
        "summary: action={} converged={}/{} status={}\n",
        result.action.as_str(),
        result.converged(),
        result.planned,
        match result.status {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
        }
    ));
    out
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ExitError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ExitError::new(4, format!("internal_error: encode json: {e}")))
}
