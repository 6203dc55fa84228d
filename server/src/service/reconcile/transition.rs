//! Desired/actual state transitions for one workspace

use crate::domain::reconcile::{ErrorDetails, WorkspaceAgentInfo};
use crate::domain::workspace::{ActualState, DesiredState};

#[derive(Debug, Clone, Copy)]
pub struct TransitionInput<'a> {
    /// Desired state after lifecycle overrides
    pub desired_state: DesiredState,
    /// Actual state stored before this pass
    pub actual_state: ActualState,
    /// Agent report for this workspace, absent for unreported workspaces
    pub report: Option<&'a WorkspaceAgentInfo>,
    /// Desired state was changed after the last response to the agent
    pub user_intervened: bool,
}

/// What the manifest for this pass must look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRequest {
    pub started: bool,
    pub include_all_resources: bool,
}

/// Reported state the control plane did not expect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// The agent attached a structured error
    AgentError(ErrorDetails),
    /// The reported state does not fit the desired state
    UnexpectedState(ActualState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub desired_state: DesiredState,
    pub actual_state: ActualState,
    /// `None` when nothing must be sent to the agent
    pub config: Option<ConfigRequest>,
    pub anomaly: Option<Anomaly>,
}

/// Whether a report without structured error fits the desired state
fn is_expected(desired: DesiredState, reported: ActualState) -> bool {
    use ActualState as A;
    use DesiredState as D;

    match (desired, reported) {
        (_, A::Unknown | A::Error | A::CreationRequested) => false,
        (D::Terminated, A::Starting | A::Running | A::Stopping | A::Stopped) => true,
        (D::Terminated, A::Terminating | A::Terminated) => true,
        (D::Running | D::Stopped | D::RestartRequested, A::Terminating | A::Terminated) => false,
        (
            D::Running | D::Stopped | D::RestartRequested,
            A::Starting | A::Running | A::Stopping | A::Stopped,
        ) => true,
    }
}

/// Resolve the next desired/actual pair and the config instruction.
pub fn resolve(input: &TransitionInput<'_>) -> Transition {
    let (actual_state, anomaly) = match input.report {
        // Nothing was materialized yet, so there is nothing to tear down
        None if input.actual_state == ActualState::CreationRequested
            && input.desired_state == DesiredState::Terminated =>
        {
            (ActualState::Terminated, None)
        }
        None => (input.actual_state, None),
        Some(info) => match &info.error_details {
            Some(details) => (ActualState::Error, Some(Anomaly::AgentError(details.clone()))),
            None => {
                let reported = info.current_actual_state;
                let anomaly = (!is_expected(input.desired_state, reported))
                    .then_some(Anomaly::UnexpectedState(reported));
                (reported, anomaly)
            }
        },
    };

    let desired_state = match (input.desired_state, actual_state) {
        (DesiredState::RestartRequested, ActualState::Stopped) => DesiredState::Running,
        (desired, _) => desired,
    };

    let provisioning = actual_state == ActualState::CreationRequested;
    // Only a desired state change made while the error was already known
    // releases the hold
    let released = input.actual_state == ActualState::Error && input.user_intervened;
    let withheld = actual_state == ActualState::Error && !released;
    let needs_config = !desired_state.is_reached_by(actual_state)
        || provisioning
        || actual_state == ActualState::Unknown;

    let config = (needs_config && !withheld).then_some(ConfigRequest {
        started: desired_state == DesiredState::Running,
        include_all_resources: provisioning,
    });

    Transition {
        desired_state,
        actual_state,
        config,
        anomaly,
    }
}
