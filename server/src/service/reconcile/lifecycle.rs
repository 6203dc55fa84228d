//! Time-based desired state overrides

use chrono::{DateTime, Duration, Utc};

use crate::domain::workspace::{ActualState, DesiredState};

/// Inputs of the lifecycle policy, all taken from one pass
#[derive(Debug, Clone, Copy)]
pub struct LifecycleInput {
    pub desired_state: DesiredState,
    pub actual_state: ActualState,
    pub desired_state_updated_at: DateTime<Utc>,
    pub max_active_hours_before_stop: u32,
    pub max_stopped_hours_before_termination: u32,
    pub now: DateTime<Utc>,
}

/// Desired state override forced by the lifecycle policy, if any.
///
/// Age is measured from the last desired state change, not from creation.
pub fn evaluate(input: &LifecycleInput) -> Option<DesiredState> {
    let age = input.now - input.desired_state_updated_at;

    match (input.desired_state, input.actual_state) {
        (DesiredState::Running, ActualState::Running)
            if age > Duration::hours(i64::from(input.max_active_hours_before_stop)) =>
        {
            Some(DesiredState::Stopped)
        }
        (DesiredState::Stopped, ActualState::Stopped)
            if age > Duration::hours(i64::from(input.max_stopped_hours_before_termination)) =>
        {
            Some(DesiredState::Terminated)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(desired: DesiredState, actual: ActualState, age: Duration) -> LifecycleInput {
        let now = Utc::now();
        LifecycleInput {
            desired_state: desired,
            actual_state: actual,
            desired_state_updated_at: now - age,
            max_active_hours_before_stop: 36,
            max_stopped_hours_before_termination: 744,
            now,
        }
    }

    #[test]
    fn test_stops_long_running_workspace() {
        let result = evaluate(&input(
            DesiredState::Running,
            ActualState::Running,
            Duration::hours(37),
        ));
        assert_eq!(result, Some(DesiredState::Stopped));
    }

    #[test]
    fn test_limit_is_exclusive() {
        let result = evaluate(&input(
            DesiredState::Running,
            ActualState::Running,
            Duration::hours(36),
        ));
        assert_eq!(result, None);
    }

    #[test]
    fn test_terminates_long_stopped_workspace() {
        let result = evaluate(&input(
            DesiredState::Stopped,
            ActualState::Stopped,
            Duration::hours(745),
        ));
        assert_eq!(result, Some(DesiredState::Terminated));
    }

    #[test]
    fn test_ignores_workspaces_still_converging() {
        assert_eq!(
            evaluate(&input(
                DesiredState::Running,
                ActualState::Starting,
                Duration::hours(100),
            )),
            None
        );
        assert_eq!(
            evaluate(&input(
                DesiredState::Stopped,
                ActualState::Stopping,
                Duration::hours(1000),
            )),
            None
        );
        assert_eq!(
            evaluate(&input(
                DesiredState::Terminated,
                ActualState::Terminated,
                Duration::hours(10_000),
            )),
            None
        );
    }

    #[test]
    fn test_recent_state_change_resets_timer() {
        // Created long ago, but resumed an hour ago.
        let result = evaluate(&input(
            DesiredState::Running,
            ActualState::Running,
            Duration::hours(1),
        ));
        assert_eq!(result, None);
    }
}
