use crate::error::{Error, Result};
use crate::okta::api_responses::{FactorResult, Response, TransactionState};
use std::time::Duration;
use tokio::time::Instant;

/// Where an out-of-band factor (push) stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Challenged,
    Waiting,
    Approved,
    Rejected,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Approved | PollState::Rejected | PollState::TimedOut
        )
    }

    /// Reads the state a verify or poll response reports.
    pub fn from_response(response: &Response) -> Result<PollState> {
        match response.status() {
            Some(TransactionState::Success) => Ok(PollState::Approved),
            Some(TransactionState::MfaChallenge) => match response.factor_result() {
                Some(FactorResult::Challenge) => Ok(PollState::Challenged),
                Some(FactorResult::Waiting) => Ok(PollState::Waiting),
                Some(FactorResult::Rejected) => Ok(PollState::Rejected),
                Some(FactorResult::Timeout) => Ok(PollState::TimedOut),
                Some(FactorResult::Success) => Ok(PollState::Approved),
                Some(FactorResult::Other(result)) => Err(Error::UnexpectedProviderStatus(result)),
                None => Ok(PollState::Waiting),
            },
            Some(status) => Err(Error::UnexpectedProviderStatus(status.as_str().to_string())),
            None => Err(Error::UnexpectedProviderStatus(String::new())),
        }
    }
}

/// Moves from `current` to the next state.
///
/// Terminal states never change. Anything still pending once `elapsed` reaches
/// `timeout` is timed out, whatever the provider said.
pub fn transition(
    current: PollState,
    observed: PollState,
    elapsed: Duration,
    timeout: Duration,
) -> PollState {
    if current.is_terminal() {
        return current;
    }

    if !observed.is_terminal() && elapsed >= timeout {
        return PollState::TimedOut;
    }

    observed
}

/// Tracks one push verification against its wall-clock budget.
pub struct FactorPoller {
    state: PollState,
    started: Instant,
    interval: Duration,
    timeout: Duration,
    ticks: u32,
}

impl FactorPoller {
    pub fn new(interval: Duration, timeout: Duration) -> FactorPoller {
        FactorPoller {
            state: PollState::Challenged,
            started: Instant::now(),
            interval,
            timeout,
            ticks: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Feeds a provider response into the machine.
    pub fn observe(&mut self, response: &Response) -> Result<PollState> {
        let observed = PollState::from_response(response)?;
        self.state = transition(self.state, observed, self.started.elapsed(), self.timeout);
        self.ticks += 1;

        Ok(self.state)
    }

    /// Re-checks the deadline without a new response.
    pub fn expire_if_due(&mut self) -> PollState {
        self.state = transition(self.state, self.state, self.started.elapsed(), self.timeout);
        self.state
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    /// How long to wait before the next status check, never past the deadline.
    pub fn next_delay(&self) -> Duration {
        self.interval.min(self.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn response(json: &str) -> Response {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_from_response() {
        let waiting = response(r#"{"status":"MFA_CHALLENGE","factorResult":"WAITING"}"#);
        let rejected = response(r#"{"status":"MFA_CHALLENGE","factorResult":"REJECTED"}"#);
        let timeout = response(r#"{"status":"MFA_CHALLENGE","factorResult":"TIMEOUT"}"#);
        let success = response(r#"{"status":"SUCCESS","sessionToken":"abc"}"#);

        assert_eq!(PollState::from_response(&waiting).unwrap(), PollState::Waiting);
        assert_eq!(PollState::from_response(&rejected).unwrap(), PollState::Rejected);
        assert_eq!(PollState::from_response(&timeout).unwrap(), PollState::TimedOut);
        assert_eq!(PollState::from_response(&success).unwrap(), PollState::Approved);
    }

    #[test]
    fn test_from_response_unexpected() {
        let locked = response(r#"{"status":"LOCKED_OUT"}"#);
        let err = PollState::from_response(&locked).unwrap_err();
        assert!(matches!(err, Error::UnexpectedProviderStatus(ref s) if s == "LOCKED_OUT"));

        let odd = response(r#"{"status":"MFA_CHALLENGE","factorResult":"CANCELLED"}"#);
        let err = PollState::from_response(&odd).unwrap_err();
        assert!(matches!(err, Error::UnexpectedProviderStatus(ref s) if s == "CANCELLED"));
    }

    #[test]
    fn test_transition_follows_provider() {
        let elapsed = Duration::from_secs(1);

        assert_eq!(
            transition(PollState::Challenged, PollState::Waiting, elapsed, TIMEOUT),
            PollState::Waiting
        );
        assert_eq!(
            transition(PollState::Waiting, PollState::Approved, elapsed, TIMEOUT),
            PollState::Approved
        );
        assert_eq!(
            transition(PollState::Waiting, PollState::Rejected, elapsed, TIMEOUT),
            PollState::Rejected
        );
    }

    #[test]
    fn test_transition_times_out_pending_states() {
        assert_eq!(
            transition(PollState::Waiting, PollState::Waiting, TIMEOUT, TIMEOUT),
            PollState::TimedOut
        );
        assert_eq!(
            transition(
                PollState::Challenged,
                PollState::Challenged,
                TIMEOUT + Duration::from_secs(5),
                TIMEOUT
            ),
            PollState::TimedOut
        );
    }

    #[test]
    fn test_transition_approval_at_deadline_wins() {
        assert_eq!(
            transition(PollState::Waiting, PollState::Approved, TIMEOUT, TIMEOUT),
            PollState::Approved
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        let elapsed = Duration::from_secs(1);

        for terminal in [PollState::Approved, PollState::Rejected, PollState::TimedOut] {
            for observed in [PollState::Waiting, PollState::Approved, PollState::Rejected] {
                assert_eq!(transition(terminal, observed, elapsed, TIMEOUT), terminal);
            }
        }
    }

    #[test]
    fn test_poller_with_zero_timeout_expires() {
        let mut poller = FactorPoller::new(Duration::from_secs(2), Duration::ZERO);
        let waiting = response(r#"{"status":"MFA_CHALLENGE","factorResult":"WAITING"}"#);

        assert_eq!(poller.state(), PollState::Challenged);
        assert_eq!(poller.remaining(), Duration::ZERO);
        assert_eq!(poller.next_delay(), Duration::ZERO);
        assert_eq!(poller.observe(&waiting).unwrap(), PollState::TimedOut);
        assert_eq!(poller.ticks(), 1);
    }

    #[test]
    fn test_poller_waits_then_approves() {
        let mut poller = FactorPoller::new(Duration::from_secs(2), TIMEOUT);
        let waiting = response(r#"{"status":"MFA_CHALLENGE","factorResult":"WAITING"}"#);
        let success = response(r#"{"status":"SUCCESS","sessionToken":"abc"}"#);

        assert_eq!(poller.observe(&waiting).unwrap(), PollState::Waiting);
        assert_eq!(poller.expire_if_due(), PollState::Waiting);
        assert_eq!(poller.next_delay(), Duration::from_secs(2));
        assert!(poller.remaining() <= TIMEOUT);
        assert!(poller.remaining() > Duration::from_secs(2));
        assert_eq!(poller.observe(&success).unwrap(), PollState::Approved);
        assert_eq!(poller.ticks(), 2);
    }
}
