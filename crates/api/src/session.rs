//! Session normalization and the sign-in/sign-out entry points.
//!
//! Every entry point runs a `GetSessionInfo` variant through the executor
//! and folds the returned rowsets into a [`SessionInfo`]. A failed call still
//! yields a well-formed session (the guest identity with empty mappings), so
//! callers can always read [`SessionOutcome::session`] or
//! [`SessionFailure::session`] without special-casing "no session".

use ami_types::{
    DEFAULT_CONVERTER, ExecFailure, ExecOutcome, ExecutionOptions, Fields, KeyedRows, RowsetBinding, RowsetBindings, RowsetMapping,
    SessionInfo,
};
use ami_util::{row_fields, rowset_rows};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::AmiClient;

pub const PASSWORD_SIGN_IN_COMMAND: &str = "GetSessionInfo -AMIUser=? -AMIPass=?";
pub const CERTIFICATE_SIGN_IN_COMMAND: &str = "GetSessionInfo";
pub const CODE_SIGN_IN_COMMAND: &str = "GetSessionInfo -AMICode=?";
pub const TOKEN_SIGN_IN_COMMAND: &str = "GetSessionInfo -AMIToken=?";

/// Extra field telling the server to ignore any client certificate.
pub const NO_CERT_FIELD: &str = "NoCert";

/// A session command the server accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub result: ExecOutcome,
    pub session: SessionInfo,
}

impl SessionOutcome {
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn message(&self) -> &str {
        &self.result.message
    }
}

/// A session command that failed; `session` is the guest session.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", failure.message)]
pub struct SessionFailure {
    pub failure: ExecFailure,
    pub session: SessionInfo,
}

impl SessionFailure {
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn message(&self) -> &str {
        &self.failure.message
    }
}

pub type SessionResult = Result<SessionOutcome, SessionFailure>;

/// Fold an executor result into session mappings.
///
/// Successes are folded per `bindings`; failures keep their payload and
/// message and get the guest session.
pub fn normalize(result: Result<ExecOutcome, ExecFailure>, bindings: &RowsetBindings) -> SessionResult {
    match result {
        Ok(result) => {
            let session = match result.payload.as_json() {
                Some(document) => extract_session(document, bindings),
                None => {
                    warn!("session command returned a raw payload; no rowsets to fold");
                    extract_session(&Value::Null, bindings)
                }
            };
            Ok(SessionOutcome { result, session })
        }
        Err(failure) => {
            debug!(kind = %failure.kind, "session command failed; falling back to guest");
            Err(SessionFailure {
                failure,
                session: SessionInfo::guest(bindings),
            })
        }
    }
}

/// Fold the rowsets of `document` into a [`SessionInfo`].
///
/// Rowsets that are absent or have no rows produce empty mappings. Duplicate
/// fields or keys are last-write-wins.
pub fn extract_session(document: &Value, bindings: &RowsetBindings) -> SessionInfo {
    SessionInfo {
        user_info: fold_flat(&rows_of(document, &bindings.user)),
        role_info: fold_rowset(document, &bindings.role),
        bookmark_info: fold_rowset(document, &bindings.bookmark),
        dashboard_info: fold_rowset(document, &bindings.dashboard),
        sso_info: fold_rowset(document, &bindings.sso),
    }
}

fn fold_rowset(document: &Value, binding: &RowsetBinding) -> RowsetMapping {
    let rows = rows_of(document, &binding.rowset_type);
    match &binding.key_field {
        Some(key_field) => RowsetMapping::Keyed(fold_keyed(&rows, key_field)),
        None => RowsetMapping::Flat(fold_flat(&rows)),
    }
}

fn rows_of<'a>(document: &'a Value, rowset_type: &str) -> Vec<&'a Value> {
    rowset_rows(document, rowset_type).unwrap_or_else(|error| {
        warn!(rowset_type, error = %error, "rowset type cannot be queried");
        Vec::new()
    })
}

fn fold_flat(rows: &[&Value]) -> Fields {
    rows.iter().flat_map(|row| row_fields(row)).collect()
}

fn fold_keyed(rows: &[&Value], key_field: &str) -> KeyedRows {
    let mut keyed = KeyedRows::new();
    for row in rows {
        let fields = row_fields(row).into_iter().collect::<Fields>();
        match fields.get(key_field).cloned() {
            Some(key) => {
                keyed.insert(key, fields);
            }
            None => debug!(key_field, "skipping row without key field"),
        }
    }
    keyed
}

impl AmiClient {
    /// Sign in with a user name and password.
    pub async fn sign_in_by_password(&self, username: &str, password: &str, options: ExecutionOptions) -> SessionResult {
        self.session_command(PASSWORD_SIGN_IN_COMMAND, vec![username.into(), password.into()], true, options)
            .await
    }

    /// Sign in with the client certificate presented by the transport.
    pub async fn sign_in_by_certificate(&self, options: ExecutionOptions) -> SessionResult {
        self.session_command(CERTIFICATE_SIGN_IN_COMMAND, Vec::new(), false, options).await
    }

    /// Sign in with a one-time code.
    pub async fn sign_in_by_code(&self, code: &str, options: ExecutionOptions) -> SessionResult {
        self.session_command(CODE_SIGN_IN_COMMAND, vec![code.into()], true, options).await
    }

    /// Sign in with a bearer token.
    pub async fn sign_in_by_token(&self, token: &str, options: ExecutionOptions) -> SessionResult {
        self.session_command(TOKEN_SIGN_IN_COMMAND, vec![token.into()], true, options).await
    }

    /// Sign out by re-authenticating with empty credentials.
    pub async fn sign_out(&self, options: ExecutionOptions) -> SessionResult {
        self.session_command(PASSWORD_SIGN_IN_COMMAND, vec!["".into(), "".into()], true, options)
            .await
    }

    async fn session_command(&self, command: &str, params: Vec<Value>, ignore_certificate: bool, mut options: ExecutionOptions) -> SessionResult {
        options.params = params;
        options.converter = Some(DEFAULT_CONVERTER.to_string());
        if ignore_certificate {
            options.extras.insert(NO_CERT_FIELD.to_string(), None);
        }
        normalize(self.execute(command, options).await, &self.bindings)
    }
}
