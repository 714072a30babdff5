//! State table builder.
//!
//! ```text
//!  AUTHENTICATING ──▶ POLLING ──▶ ADVISING ──▶ ARBITRATING ──▶ DISPATCHING
//!        ▲  │            │  │                                     │   │
//!        │  │      [401] │  │ [transport error]            [401] │   │
//!        │  └──[login    │  ▼                                     │   ▼
//!        │     failed]──▶ SLEEPING ◀──────────────────────────────┼───┘
//!        │                   │                                    │
//!        └───────────────────┴◀───────────────────────────────────┘
//! ```

use super::{StateDescriptor, StateId};

/// Build the static state table.  Called once per supervisor.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // 0: Authenticating
        StateDescriptor {
            id: StateId::Authenticating,
            name: "Authenticating",
            successors: &[StateId::Polling, StateId::Sleeping],
        },
        // 1: Polling
        StateDescriptor {
            id: StateId::Polling,
            name: "Polling",
            successors: &[StateId::Advising, StateId::Authenticating, StateId::Sleeping],
        },
        // 2: Advising
        StateDescriptor {
            id: StateId::Advising,
            name: "Advising",
            successors: &[StateId::Arbitrating],
        },
        // 3: Arbitrating
        StateDescriptor {
            id: StateId::Arbitrating,
            name: "Arbitrating",
            successors: &[StateId::Dispatching],
        },
        // 4: Dispatching
        StateDescriptor {
            id: StateId::Dispatching,
            name: "Dispatching",
            successors: &[StateId::Sleeping, StateId::Authenticating],
        },
        // 5: Sleeping
        StateDescriptor {
            id: StateId::Sleeping,
            name: "Sleeping",
            successors: &[StateId::Polling, StateId::Authenticating],
        },
    ]
}
