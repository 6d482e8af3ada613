use crate::okta::factors::MfaFactor;
use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Where factor choices and one-time codes come from.
///
/// The engine never renders UI itself; a terminal front-end implements this by
/// listing the factors and reading stdin.
pub trait MfaPrompter: Send + Sync {
    /// Picks a factor by its position in `factors`.
    fn choose_factor(&self, factors: &[MfaFactor]) -> Result<usize>;

    /// Returns a code (or security answer) for `factor`. `attempt` starts at 1.
    fn passcode(&self, factor: &MfaFactor, attempt: u32) -> Result<String>;
}

/// A non-interactive prompter: a fixed factor index and a queue of codes.
pub struct FixedPrompter {
    factor_index: usize,
    passcodes: Mutex<VecDeque<String>>,
}

impl FixedPrompter {
    pub fn new(factor_index: usize) -> FixedPrompter {
        FixedPrompter {
            factor_index,
            passcodes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_passcodes(self, passcodes: Vec<String>) -> FixedPrompter {
        FixedPrompter {
            factor_index: self.factor_index,
            passcodes: Mutex::new(passcodes.into()),
        }
    }
}

impl MfaPrompter for FixedPrompter {
    fn choose_factor(&self, _factors: &[MfaFactor]) -> Result<usize> {
        Ok(self.factor_index)
    }

    fn passcode(&self, factor: &MfaFactor, _attempt: u32) -> Result<String> {
        self.passcodes
            .lock()
            .map_err(|_| anyhow!("passcode queue poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("no passcode available for {}", factor.identifier()))
    }
}
