//! AMI command-execution client.
//!
//! This crate sends AMI commands to a front-end endpoint and turns the
//! responses into typed results. It covers:
//!
//! - Building the command text and form fields from a template and parameters
//! - Racing each request against a per-call timeout
//! - Classifying responses into [`ExecOutcome`] or [`ExecFailure`]
//! - Folding `GetSessionInfo` responses into a [`SessionInfo`]
//!
//! The primary entry point is [`AmiClient`]. Create one with
//! [`AmiClient::new`] or [`AmiClient::from_config`], then call
//! [`AmiClient::execute`] or one of the sign-in methods.
//!
//! # Example
//!
//! ```ignore
//! use ami_api::AmiClient;
//! use ami_types::ExecutionOptions;
//!
//! async fn whoami() -> anyhow::Result<()> {
//!     let client = AmiClient::new("https://ami.example.org/AMI/FrontEnd")?;
//!     let outcome = client.sign_in_by_password("alice", "secret", ExecutionOptions::new()).await?;
//!     println!("signed in as {}", outcome.session().user_name());
//!     Ok(())
//! }
//! ```
//!
//! [`ExecOutcome`]: ami_types::ExecOutcome
//! [`ExecFailure`]: ami_types::ExecFailure
//! [`SessionInfo`]: ami_types::SessionInfo

mod client;
mod executor;
mod session;
pub mod transport;

pub use client::{AmiClient, ClientError};
pub use executor::{classify_envelope, classify_structured};
pub use session::{
    CERTIFICATE_SIGN_IN_COMMAND, CODE_SIGN_IN_COMMAND, NO_CERT_FIELD, PASSWORD_SIGN_IN_COMMAND, SessionFailure, SessionOutcome,
    SessionResult, TOKEN_SIGN_IN_COMMAND, extract_session, normalize,
};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};
