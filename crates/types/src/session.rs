use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field name to value, in document order.
pub type Fields = IndexMap<String, String>;

/// Rows keyed by one of their fields.
pub type KeyedRows = IndexMap<String, Fields>;

/// User name reported for an unauthenticated session.
pub const GUEST_USER: &str = "guest";

/// The fixed user record used whenever session retrieval fails.
pub fn guest_user_info() -> Fields {
    [
        ("AMIUser", GUEST_USER),
        ("guestUser", GUEST_USER),
        ("clientDNInAMI", ""),
        ("issuerDNInAMI", ""),
        ("clientDNInSession", ""),
        ("issuerDNInSession", ""),
        ("notBefore", ""),
        ("notAfter", ""),
        ("valid", "false"),
        ("certEnabled", "false"),
        ("vomsEnabled", "false"),
        ("ssoEnabled", "false"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Binds a session slot to a server rowset type.
///
/// Without a `key_field` every row of the rowset is folded into one flat
/// field map (last write wins). With a `key_field` each row becomes an entry
/// keyed by the value of that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsetBinding {
    pub rowset_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
}

impl RowsetBinding {
    pub fn flat(rowset_type: impl Into<String>) -> Self {
        Self {
            rowset_type: rowset_type.into(),
            key_field: None,
        }
    }

    pub fn keyed(rowset_type: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            rowset_type: rowset_type.into(),
            key_field: Some(key_field.into()),
        }
    }

    /// An empty mapping with the shape this binding produces.
    pub fn empty_mapping(&self) -> RowsetMapping {
        match self.key_field {
            Some(_) => RowsetMapping::Keyed(KeyedRows::new()),
            None => RowsetMapping::Flat(Fields::new()),
        }
    }
}

/// Which rowset types feed which session slot.
///
/// Server versions disagree on the names of the last two slots
/// (`udp`/`sso` versus `dashboard`/`awf`), so the binding is data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsetBindings {
    /// Rowset folded flat into [`SessionInfo::user_info`].
    pub user: String,
    pub role: RowsetBinding,
    pub bookmark: RowsetBinding,
    pub dashboard: RowsetBinding,
    pub sso: RowsetBinding,
}

impl RowsetBindings {
    /// Vocabulary of current servers.
    pub fn current() -> Self {
        Self {
            user: "user".into(),
            role: RowsetBinding::keyed("role", "name"),
            bookmark: RowsetBinding::keyed("bookmark", "hash"),
            dashboard: RowsetBinding::flat("udp"),
            sso: RowsetBinding::flat("sso"),
        }
    }

    /// Vocabulary of older servers.
    pub fn legacy() -> Self {
        Self {
            user: "user".into(),
            role: RowsetBinding::keyed("role", "name"),
            bookmark: RowsetBinding::keyed("bookmark", "hash"),
            dashboard: RowsetBinding::keyed("dashboard", "hash"),
            sso: RowsetBinding::flat("awf"),
        }
    }
}

impl Default for RowsetBindings {
    fn default() -> Self {
        Self::current()
    }
}

/// A folded rowset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RowsetMapping {
    Flat(Fields),
    Keyed(KeyedRows),
}

impl RowsetMapping {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Flat(fields) => fields.is_empty(),
            Self::Keyed(rows) => rows.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(fields) => fields.len(),
            Self::Keyed(rows) => rows.len(),
        }
    }

    pub fn as_flat(&self) -> Option<&Fields> {
        match self {
            Self::Flat(fields) => Some(fields),
            Self::Keyed(_) => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&KeyedRows> {
        match self {
            Self::Keyed(rows) => Some(rows),
            Self::Flat(_) => None,
        }
    }

    /// Value of a flat field.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.as_flat().and_then(|fields| fields.get(name)).map(String::as_str)
    }

    /// Fields of a keyed row.
    pub fn row(&self, key: &str) -> Option<&Fields> {
        self.as_keyed().and_then(|rows| rows.get(key))
    }
}

/// Lookup structures derived from a session response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_info: Fields,
    pub role_info: RowsetMapping,
    pub bookmark_info: RowsetMapping,
    pub dashboard_info: RowsetMapping,
    pub sso_info: RowsetMapping,
}

impl SessionInfo {
    /// The guest identity with four empty mappings shaped per `bindings`.
    pub fn guest(bindings: &RowsetBindings) -> Self {
        Self {
            user_info: guest_user_info(),
            role_info: bindings.role.empty_mapping(),
            bookmark_info: bindings.bookmark.empty_mapping(),
            dashboard_info: bindings.dashboard.empty_mapping(),
            sso_info: bindings.sso.empty_mapping(),
        }
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_info.get("AMIUser").map(String::as_str)
    }

    pub fn is_guest(&self) -> bool {
        self.user_name().is_none_or(|name| name == GUEST_USER)
    }
}
