//! Response polling state machine for the feature-report channel
//!
//! After a Set-Feature the device needs a moment before a Get-Feature returns
//! the answer, and may report "busy" any number of times. The poller decides
//! what to do after each response; the transport owns the timer and the I/O.
//!
//! ```text
//! AwaitingFirstPoll --response--> Retrying --response--> ... --> Resolved
//!         \____________________________________________________/
//! ```

use std::time::Duration;

use crate::command::ResponseState;
use crate::error::ProtocolError;
use crate::protocol::{timing, ResponseStatus};

/// Delays applied between Set-Feature and the Get-Feature polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub initial_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(timing::INITIAL_POLL_DELAY_MS),
            retry_delay: Duration::from_millis(timing::RETRY_POLL_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    AwaitingFirstPoll,
    Retrying,
    Resolved,
}

/// What the transport should do next
#[derive(Debug)]
pub enum PollStep {
    /// Wait, then issue a Get-Feature
    Poll { after: Duration },
    /// Request finished
    Done(Result<(), ProtocolError>),
}

#[derive(Debug)]
pub struct ResponsePoller {
    phase: PollPhase,
    timing: PollTiming,
    remaining_failures: u32,
    polls: u32,
}

impl ResponsePoller {
    /// `error_retry_budget` is the number of extra polls granted after a
    /// `Failure` status. Busy responses never consume it.
    pub fn new(error_retry_budget: u32, timing: PollTiming) -> Self {
        Self {
            phase: PollPhase::AwaitingFirstPoll,
            timing,
            remaining_failures: error_retry_budget,
            polls: 0,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Number of responses seen so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn start(&self) -> PollStep {
        PollStep::Poll {
            after: self.timing.initial_delay,
        }
    }

    pub fn on_response(&mut self, state: ResponseState) -> PollStep {
        if self.phase == PollPhase::Resolved {
            return PollStep::Done(Err(ProtocolError::invalid_payload(
                "response after request resolved",
            )));
        }
        self.polls += 1;

        let outcome = match state {
            ResponseState::Success => Ok(()),
            ResponseState::MustRetry => return self.retry(),
            ResponseState::Failure if self.remaining_failures > 0 => {
                self.remaining_failures -= 1;
                return self.retry();
            }
            ResponseState::Failure => Err(ProtocolError::Rejected {
                status: ResponseStatus::Failure,
            }),
            ResponseState::DeviceNotConnected => Err(ProtocolError::DeviceUnreachable),
            ResponseState::UnsupportedParameter => Err(ProtocolError::Rejected {
                status: ResponseStatus::UnsupportedParameter,
            }),
            ResponseState::Corrupted(corruption) => Err(ProtocolError::Corrupted(corruption)),
        };
        self.phase = PollPhase::Resolved;
        PollStep::Done(outcome)
    }

    fn retry(&mut self) -> PollStep {
        self.phase = PollPhase::Retrying;
        PollStep::Poll {
            after: self.timing.retry_delay,
        }
    }
}
