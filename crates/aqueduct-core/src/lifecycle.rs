//! Lifecycle state machine shared by every resource kind.
//!
//! ```text
//!          open           initialize          start
//! Closed ───────▶ Open ─────────────▶ Initialized ──────▶ Running
//!                  ▲     uninitialize      │  ▲     stop      │
//!                  └───────────────────────┘  └───────────────┘
//!
//! close: any state ──▶ Closed
//! ```
//!
//! Topology operations (add/remove node, connect, disconnect) are legal in
//! `Open` and `Initialized` and leave the state unchanged. While `Running`
//! they are refused as recoverable: the engine holds the graph for
//! rendering, and the caller may stop and retry.

use std::fmt;

use crate::engine::ResourceKind;
use crate::error::{Error, Reason, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    Closed,
    Open,
    Initialized,
    Running,
}

impl LifecycleState {
    pub const ALL: [Self; 4] = [Self::Closed, Self::Open, Self::Initialized, Self::Running];

    /// State right after the native create succeeds.
    ///
    /// Graphs must be opened explicitly; every other kind is opened by its
    /// native constructor.
    pub const fn initial(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Graph => Self::Closed,
            _ => Self::Open,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Initialized => "initialized",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Initialize,
    Start,
    Stop,
    Uninitialize,
    Close,
    AddNode,
    RemoveNode,
    Connect,
    Disconnect,
}

impl Operation {
    pub const ALL: [Self; 10] = [
        Self::Open,
        Self::Initialize,
        Self::Start,
        Self::Stop,
        Self::Uninitialize,
        Self::Close,
        Self::AddNode,
        Self::RemoveNode,
        Self::Connect,
        Self::Disconnect,
    ];

    pub const fn is_topology(self) -> bool {
        matches!(
            self,
            Self::AddNode | Self::RemoveNode | Self::Connect | Self::Disconnect
        )
    }
}

/// The state `op` leads to from `state`, or why it is illegal.
///
/// Pure: callers apply the returned state only after the native call
/// succeeds.
pub const fn transition(state: LifecycleState, op: Operation) -> Result<LifecycleState> {
    use LifecycleState::*;

    match (state, op) {
        (Closed, Operation::Open) => Ok(Open),
        (Open, Operation::Initialize) => Ok(Initialized),
        (Initialized, Operation::Start) => Ok(Running),
        (Running, Operation::Stop) => Ok(Initialized),
        (Initialized, Operation::Uninitialize) => Ok(Open),
        (_, Operation::Close) => Ok(Closed),
        (Open | Initialized, op) if op.is_topology() => Ok(state),
        (Running, op) if op.is_topology() => {
            Err(Error::Recoverable(Reason::CannotModifyWhileRunning))
        }
        _ => Err(Error::invalid_state()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legal(state: LifecycleState, op: Operation) -> Option<LifecycleState> {
        use LifecycleState::*;
        match (state, op) {
            (Closed, Operation::Open) => Some(Open),
            (Open, Operation::Initialize) => Some(Initialized),
            (Initialized, Operation::Start) => Some(Running),
            (Running, Operation::Stop) => Some(Initialized),
            (Initialized, Operation::Uninitialize) => Some(Open),
            (_, Operation::Close) => Some(Closed),
            (Open, _) | (Initialized, _) if op.is_topology() => Some(state),
            _ => None,
        }
    }

    #[test]
    fn test_every_pair() {
        for state in LifecycleState::ALL {
            for op in Operation::ALL {
                let result = transition(state, op);
                match legal(state, op) {
                    Some(next) => assert_eq!(result, Ok(next), "{state} {op:?}"),
                    None if state == LifecycleState::Running && op.is_topology() => assert_eq!(
                        result,
                        Err(Error::Recoverable(Reason::CannotModifyWhileRunning))
                    ),
                    None => assert_eq!(result, Err(Error::Fatal(Reason::InvalidState))),
                }
            }
        }
    }

    #[test]
    fn test_start_from_open_is_illegal() {
        assert_eq!(
            transition(LifecycleState::Open, Operation::Start),
            Err(Error::Fatal(Reason::InvalidState))
        );
    }

    #[test]
    fn test_initial_states() {
        assert_eq!(LifecycleState::initial(ResourceKind::Graph), LifecycleState::Closed);
        assert_eq!(LifecycleState::initial(ResourceKind::Unit), LifecycleState::Open);
        assert_eq!(LifecycleState::initial(ResourceKind::File), LifecycleState::Open);
    }
}
