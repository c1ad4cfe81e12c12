//! Reduce dependers and the process-wide directory.
//!
//! A reducer may be registered with a list of depender ids. Before it runs,
//! every listed depender is asked whether the reduce may go ahead.

mod directory;

pub use directory::{Depender, DependerId, Directory};
