use crate::foundation::{RequestId, ThresholdError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Arrived,
    Validating,
    Executing,
    AwaitingPartners,
    QuorumCheck,
    Confirmed,
    Failed,
    TimedOut,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Arrived => "ARRIVED",
            RequestStatus::Validating => "VALIDATING",
            RequestStatus::Executing => "EXECUTING",
            RequestStatus::AwaitingPartners => "AWAITING_PARTNERS",
            RequestStatus::QuorumCheck => "QUORUM_CHECK",
            RequestStatus::Confirmed => "CONFIRMED",
            RequestStatus::Failed => "FAILED",
            RequestStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const VALID_TRANSITIONS: &[(RequestStatus, RequestStatus)] = &[
    (RequestStatus::Arrived, RequestStatus::Validating),
    (RequestStatus::Arrived, RequestStatus::Failed),
    (RequestStatus::Validating, RequestStatus::Executing),
    (RequestStatus::Validating, RequestStatus::Failed),
    (RequestStatus::Executing, RequestStatus::AwaitingPartners),
    (RequestStatus::Executing, RequestStatus::Confirmed),
    (RequestStatus::Executing, RequestStatus::Failed),
    (RequestStatus::AwaitingPartners, RequestStatus::QuorumCheck),
    (RequestStatus::AwaitingPartners, RequestStatus::Failed),
    (RequestStatus::AwaitingPartners, RequestStatus::TimedOut),
    (RequestStatus::QuorumCheck, RequestStatus::AwaitingPartners),
    (RequestStatus::QuorumCheck, RequestStatus::Confirmed),
    (RequestStatus::QuorumCheck, RequestStatus::Failed),
    (RequestStatus::QuorumCheck, RequestStatus::TimedOut),
];

pub fn is_terminal(status: RequestStatus) -> bool {
    matches!(status, RequestStatus::Confirmed | RequestStatus::Failed | RequestStatus::TimedOut)
}

pub fn ensure_valid_transition(from: RequestStatus, to: RequestStatus) -> Result<(), ThresholdError> {
    if from == to || VALID_TRANSITIONS.contains(&(from, to)) {
        return Ok(());
    }
    Err(ThresholdError::InvalidStateTransition { from: from.to_string(), to: to.to_string() })
}

/// Tracks the coordinator-side status of one request.
#[derive(Debug)]
pub struct RequestProgress {
    req_id: RequestId,
    status: RequestStatus,
}

impl RequestProgress {
    pub fn new(req_id: RequestId) -> Self {
        Self { req_id, status: RequestStatus::Arrived }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn advance(&mut self, to: RequestStatus) -> Result<RequestStatus, ThresholdError> {
        ensure_valid_transition(self.status, to)?;
        let from = std::mem::replace(&mut self.status, to);
        if from != to {
            debug!("request status transition req_id={:#x} from={} to={}", self.req_id, from, to);
        }
        Ok(from)
    }

    /// Moves to a terminal state from wherever the request stopped.
    pub fn fail(&mut self, timed_out: bool) -> RequestStatus {
        let target = if timed_out && self.status != RequestStatus::Validating && self.status != RequestStatus::Executing {
            RequestStatus::TimedOut
        } else {
            RequestStatus::Failed
        };
        if !is_terminal(self.status) && ensure_valid_transition(self.status, target).is_ok() {
            self.status = target;
        }
        self.status
    }
}
