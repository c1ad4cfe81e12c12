//! Diagnostic event stream for stores.
//!
//! External tools attach observers to the [`StoreMonitor`] to follow store
//! creation, reduces, updates and configuration mistakes. Fatal-class
//! diagnostics halt the process when nobody is listening, depending on the
//! configured [`FatalPolicy`].

mod monitor;
mod settings;

pub use monitor::{StoreEvent, StoreMonitor};
pub use settings::{FatalPolicy, Settings};
