//! Process-isolated execution of pipeline functions
//!
//! The parent (`IsolatedExecutor`) spawns a child per call, sends it an
//! `IsolatedRequest` on stdin and reads an `Envelope` back from stdout.
//! The child side (`serve`) runs in the binary's hidden `worker` subcommand.

mod child;
mod executor;
mod protocol;

pub use child::{external_command, serve, Failure, IsolatedFn, IsolatedRegistry};
pub use executor::{IsolatedExecutor, DEFAULT_GRACE_PERIOD};
pub use protocol::{Envelope, IsolatedRequest};
