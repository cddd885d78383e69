#![forbid(unsafe_code)]

//! Tether public facade crate.
//!
//! Scoped broadcast cells with stable dispatch handles and optimistic
//! updates. Most programs only need the prelude.

pub use tether_core as core;
pub use tether_runtime as runtime;

pub use tether_runtime::{
    BroadcastCell, CellConfig, Computed, Delivery, Dispatcher, Reducer, ScopeError, Subscription,
    UpdateError, UpdateRejected, ValueCell, scope,
};

pub mod prelude {
    pub use tether_core as core;
    pub use tether_core::lifeline::{Lifeline, LifelineOwner};
    pub use tether_runtime as runtime;
    pub use tether_runtime::backend::{Backend, SimulatedBackend};
    pub use tether_runtime::executor::{Executor, Task};
    pub use tether_runtime::optimistic::{
        Optimistic, Patchable, UpdateAction, UpdateOutcome, UpdatePhase, UpdateRequest, update,
    };
    pub use tether_runtime::{
        BroadcastCell, CellConfig, Computed, Delivery, Dispatcher, Reducer, ScopeError,
        Subscription, UpdateError, UpdateRejected, ValueCell, scope,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_covers_a_scoped_round_trip() {
        let seen = scope::enter(3u32, |_| {
            scope::dispatch::<u32>(|n| n * 2).expect("provided");
            scope::read::<u32>()
        });
        assert_eq!(seen, Ok(6));
        assert!(scope::read::<u32>().is_err());
    }
}
