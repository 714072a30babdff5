//! Table-driven state tracker for the control loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌────────────────┬──────────────────────────────────────┐   │
//! │  │ StateId        │ legal successors                     │   │
//! │  ├────────────────┼──────────────────────────────────────┤   │
//! │  │ Authenticating │ Polling, Sleeping                    │   │
//! │  │ Polling        │ Advising, Authenticating, Sleeping   │   │
//! │  │ Advising       │ Arbitrating                          │   │
//! │  │ Arbitrating    │ Dispatching                          │   │
//! │  │ Dispatching    │ Sleeping, Authenticating             │   │
//! │  │ Sleeping       │ Polling, Authenticating              │   │
//! │  └────────────────┴──────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The driver performs the stage work itself (it needs the ports); the
//! engine only records where the loop is and refuses edges the table does
//! not list.  There is no terminal state.

pub mod context;
pub mod states;

use log::{debug, error};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all control-loop states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Authenticating = 0,
    Polling = 1,
    Advising = 2,
    Arbitrating = 3,
    Dispatching = 4,
    Sleeping = 5,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 6;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Sleeping` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Authenticating,
            1 => Self::Polling,
            2 => Self::Advising,
            3 => Self::Arbitrating,
            4 => Self::Dispatching,
            5 => Self::Sleeping,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Sleeping
            }
        }
    }

    /// True for states that issue network calls.
    pub fn touches_network(self) -> bool {
        matches!(
            self,
            Self::Authenticating | Self::Polling | Self::Advising | Self::Dispatching
        )
    }
}

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single loop state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub successors: &'static [StateId],
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Refused transition, returned by [`Fsm::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: StateId,
    pub to: StateId,
}

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the current state.
    current: usize,
    /// Number of accepted transitions since construction.
    transitions: u64,
}

impl Fsm {
    /// Construct a tracker with the given table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            transitions: 0,
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// Display name of a state.
    pub fn name_of(&self, id: StateId) -> &'static str {
        self.table[id as usize].name
    }

    /// Whether `to` is listed as a successor of `from`.
    pub fn is_legal(&self, from: StateId, to: StateId) -> bool {
        self.table[from as usize].successors.contains(&to)
    }

    /// Move to `next`.  Staying in the current state is a no-op.
    pub fn transition(&mut self, next: StateId) -> Result<(), IllegalTransition> {
        let from = self.current_state();
        if from == next {
            return Ok(());
        }
        if !self.is_legal(from, next) {
            error!(
                "FSM refused transition: {} -> {}",
                self.table[self.current].name,
                self.table[next as usize].name
            );
            return Err(IllegalTransition { from, to: next });
        }
        debug!(
            "FSM transition: {} -> {}",
            self.table[self.current].name,
            self.table[next as usize].name
        );
        self.current = next as usize;
        self.transitions += 1;
        Ok(())
    }

    /// Accepted transitions since construction.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}
