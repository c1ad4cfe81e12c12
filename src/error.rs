//! Error types for flowstore.
//!
//! Every variant here is a configuration or invariant violation rather than
//! a transient failure. They are reported through
//! [`StoreMonitor::fatal`](crate::monitor::StoreMonitor::fatal) and, where an
//! API can refuse the request, also returned to the caller.

use thiserror::Error;

use crate::depender::DependerId;
use crate::runtime::StoreId;

/// Fatal-class diagnostics raised by stores, the directory and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Needed depender '{depender}' while reducing state '{state}' with action '{action}'")]
    MissingDepender {
        depender: DependerId,
        state: &'static str,
        action: String,
    },

    #[error("Duplicate registration of reduce depender '{depender}'")]
    DuplicateDepender { depender: DependerId },

    #[error("Exist cyclic observe from {from} to {to}")]
    CyclicObserve { from: StoreId, to: StoreId },

    #[error("Store {store} already observes {target}{}", field_suffix(.field))]
    DuplicateSubscription {
        store: StoreId,
        target: StoreId,
        field: Option<&'static str>,
    },

    #[error("Never update state directly! Use send/dispatch action instead")]
    DirectUpdateInStrictMode { store: StoreId },

    #[error(
        "Attach State[{child}] to UpState[{parent}] with stateId[{state_id}] failed: \
         exist State[{existing}] with same stateId!"
    )]
    DuplicateAttach {
        child: &'static str,
        parent: &'static str,
        state_id: String,
        existing: &'static str,
    },

    #[error("'{operation}' must run on the main context")]
    OffMainContext { operation: &'static str },
}

fn field_suffix(field: &Option<&'static str>) -> String {
    field.map(|f| format!(" on field '{f}'")).unwrap_or_default()
}

/// Result alias used by fallible registration and subscription APIs.
pub type StoreResult<T> = Result<T, StoreError>;
