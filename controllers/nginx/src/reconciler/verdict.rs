//! Outcome of a reconciliation pass and of its individual steps.

use crate::error::ControllerError;
use kube_runtime::controller::Action;
use std::fmt;
use std::ops::ControlFlow;
use std::time::Duration;

/// Whether and when the trigger mechanism should run the pass again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Converged; wait for the next change
    Done,
    /// Run again immediately
    Now,
    /// Run again after the given delay
    After(Duration),
}

impl Requeue {
    pub fn into_action(self) -> Action {
        match self {
            Requeue::Done => Action::await_change(),
            Requeue::Now => Action::requeue(Duration::ZERO),
            Requeue::After(delay) => Action::requeue(delay),
        }
    }
}

/// Requeue decision of a pass, optionally paired with an error for operators.
#[derive(Debug)]
pub struct Verdict {
    pub requeue: Requeue,
    pub error: Option<ControllerError>,
}

impl Verdict {
    pub fn done() -> Self {
        Self {
            requeue: Requeue::Done,
            error: None,
        }
    }

    pub fn requeue_now() -> Self {
        Self {
            requeue: Requeue::Now,
            error: None,
        }
    }

    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: Requeue::After(delay),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<ControllerError>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[cfg(test)]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.requeue {
            Requeue::Done => write!(f, "done")?,
            Requeue::Now => write!(f, "requeue now")?,
            Requeue::After(delay) => write!(f, "requeue after {:?}", delay)?,
        }
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

/// Result of one pipeline step: carry on with a value, or stop the pass.
pub type Step<T> = ControlFlow<Verdict, T>;
