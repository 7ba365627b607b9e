//! Shared type definitions for the AMI command client.
//!
//! These types carry no I/O. They describe what a caller hands to the
//! executor ([`ExecutionOptions`]), what comes back ([`ExecOutcome`] or
//! [`ExecFailure`]), and the session lookup structures derived from a
//! successful `GetSessionInfo` response ([`SessionInfo`]).

mod options;
mod outcome;
mod session;

pub use options::*;
pub use outcome::*;
pub use session::*;
