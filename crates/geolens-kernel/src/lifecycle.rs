//! Session lifecycle state machine.
//!
//! ```text
//!  Idle ──initialize──▶ Initializing ──probe ok──▶ Active ◀─┐ update / orientation / resize
//!                            │                       │ └────┘
//!                            └──fail──▶ Error ◀──fail─┤
//!  Idle / Initializing / Active ──end──▶ Ended        │
//! ```
//!
//! `Error` and `Ended` are terminal; a new session is needed to retry.
//! `end` is idempotent: on `Ended` it is a no-op, and on `Error` the phase
//! stays `Error` so the reason remains visible.
//!
//! Every phase change goes through [`Lifecycle::apply`]; an event that is not
//! allowed in the current phase returns [`GeoLensError::InvalidTransition`]
//! and leaves the phase untouched.

use std::fmt;

use geolens_types::{GeoLensError, SessionPhase};
use tracing::info;

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Initialize,
    ProbeSucceeded,
    /// Unrecoverable failure with a human-readable reason.
    Fail(String),
    ObserverOrAgentsChanged,
    OrientationReading,
    Resize,
    End,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionEvent::Initialize => "initialize",
            SessionEvent::ProbeSucceeded => "probe succeeded",
            SessionEvent::Fail(_) => "fail",
            SessionEvent::ObserverOrAgentsChanged => "observer or agents changed",
            SessionEvent::OrientationReading => "orientation reading",
            SessionEvent::Resize => "resize",
            SessionEvent::End => "end",
        };
        f.write_str(s)
    }
}

/// Target phase for `event` in phase `from`.
pub fn next_phase(from: SessionPhase, event: &SessionEvent) -> Result<SessionPhase, GeoLensError> {
    use SessionEvent as E;
    use SessionPhase as P;

    let to = match (from, event) {
        (P::Idle, E::Initialize) => P::Initializing,
        (P::Initializing, E::ProbeSucceeded) => P::Active,
        (P::Initializing | P::Active, E::Fail(_)) => P::Error,
        (P::Active, E::ObserverOrAgentsChanged | E::OrientationReading | E::Resize) => P::Active,
        (P::Idle | P::Initializing | P::Active | P::Ended, E::End) => P::Ended,
        (P::Error, E::End) => P::Error,
        _ => {
            return Err(GeoLensError::InvalidTransition {
                from,
                event: event.to_string(),
            });
        }
    };
    Ok(to)
}

/// Current phase plus the reason of the last failure.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: SessionPhase,
    last_error: Option<String>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            last_error: None,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `true` for `Error` and `Ended`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, SessionPhase::Error | SessionPhase::Ended)
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, GeoLensError> {
        let to = next_phase(self.phase, &event)?;
        if to != self.phase {
            info!(from = %self.phase, to = %to, event = %event, "session phase changed");
        }
        if let SessionEvent::Fail(reason) = event {
            self.last_error = Some(reason);
        }
        self.phase = to;
        Ok(to)
    }
}
