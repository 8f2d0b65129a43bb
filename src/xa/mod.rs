//! XA transaction subsystem (spec §4.3/§4.4/§4.9, C10-C12): Xid identity,
//! the branch state machine, the per-pool backend session pool, the
//! per-pool transaction registry, and the multinode XA budget coordinator.

pub mod backend_pool;
pub mod coordinator;
pub mod registry;
pub mod types;

pub use backend_pool::{XaBackendPool, XaBackendSession, XaLogicalConnection};
pub use coordinator::XaBudgetCoordinator;
pub use registry::{TxContext, XaTransactionRegistry};
pub use types::{XaError, XaState, XaVote, Xid, XidData, XidKey};
