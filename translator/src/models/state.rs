//! Lifecycle state machine. Single source of truth for valid transitions.
//!
//! ```text
//! Unconfigured ──Configure──> Configured ──BeginPrepare──> Preparing ──Loaded──> Ready
//!                                  ^                            │                  │
//!                                  │                         [Fail]           [Unload]
//!                                  │                            v                  │
//!                                  └────────Recover──────── Failed                 │
//!                                  └───────────────────────────────────────────────┘
//! ```
//!
//! `Configure` is accepted in every state.

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LifecycleEvent {
    /// A configuration was applied
    Configure,
    /// A prepare attempt started
    BeginPrepare,
    /// The runtime loaded the model
    Loaded,
    /// The prepare attempt failed
    Fail,
    /// Leave Failed so the next prepare can retry
    Recover,
    /// The runtime was dropped
    Unload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum LifecycleState {
    #[default]
    Unconfigured,
    Configured,
    Preparing,
    Ready,
    Failed,
}

/// Reason a transition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{attempted_event} event rejected in {current_state} state")]
pub struct TransitionRejection {
    pub current_state: LifecycleState,
    pub attempted_event: LifecycleEvent,
}

/// Compute the state `event` leads to from `current`.
pub fn transition(
    current: LifecycleState,
    event: LifecycleEvent,
) -> Result<LifecycleState, TransitionRejection> {
    use LifecycleEvent as E;
    use LifecycleState as S;

    let next = match (current, event) {
        (_, E::Configure) => Some(S::Configured),
        (S::Configured | S::Failed, E::BeginPrepare) => Some(S::Preparing),
        (S::Preparing, E::Loaded) => Some(S::Ready),
        (S::Preparing, E::Fail) => Some(S::Failed),
        (S::Failed, E::Recover) => Some(S::Configured),
        (S::Ready, E::Unload) => Some(S::Configured),
        // Dropping a runtime that never finished loading is harmless
        (S::Configured, E::Unload) => Some(S::Configured),
        _ => None,
    };

    next.ok_or(TransitionRejection {
        current_state: current,
        attempted_event: event,
    })
}
