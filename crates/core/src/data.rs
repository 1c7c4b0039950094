//! Record payloads
//!
//! A [`Data`] value is what callers store: an external id, the ids of the
//! records it relates to, an opaque JSON body, and a fixed capability set.
//! The store never interprets the body. Permissions gate admission in the
//! authorization layer; the core only carries them.

use crate::types::RequestType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capabilities fixed when a payload is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    /// Record may be read
    pub can_read: bool,
    /// Record may be created
    pub can_write: bool,
    /// Record may be overwritten
    pub can_update: bool,
    /// Record may be removed
    pub can_delete: bool,
}

impl Permissions {
    /// Every operation allowed
    pub const fn full() -> Self {
        Self {
            can_read: true,
            can_write: true,
            can_update: true,
            can_delete: true,
        }
    }

    /// Readable only; cannot be created, changed or removed through requests
    pub const fn read_only() -> Self {
        Self {
            can_read: true,
            can_write: false,
            can_update: false,
            can_delete: false,
        }
    }

    /// Readable and writable, but never deleted
    pub const fn read_write() -> Self {
        Self {
            can_read: true,
            can_write: true,
            can_update: true,
            can_delete: false,
        }
    }

    /// Written once, never read back through requests nor changed
    pub const fn protected() -> Self {
        Self {
            can_read: false,
            can_write: true,
            can_update: false,
            can_delete: false,
        }
    }

    /// Whether a request of the given type is permitted
    pub const fn allows(&self, request_type: RequestType) -> bool {
        match request_type {
            RequestType::Create => self.can_write,
            RequestType::Read => self.can_read,
            RequestType::Update => self.can_update,
            RequestType::Delete => self.can_delete,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::full()
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    /// External record id, unique among live records
    pub id: String,
    /// Ids of records this one points at
    #[serde(default)]
    pub related_ids: Vec<String>,
    /// Opaque body
    #[serde(default)]
    pub body: serde_json::Value,
    /// Capability set
    #[serde(default)]
    pub permissions: Permissions,
}

impl Data {
    /// Create a payload with no relations, a null body and full permissions
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            related_ids: Vec::new(),
            body: serde_json::Value::Null,
            permissions: Permissions::full(),
        }
    }

    /// Set the body
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// Declare related record ids
    pub fn with_related<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the capability set
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Whether this payload permits a request of the given type
    pub fn permits(&self, request_type: RequestType) -> bool {
        self.permissions.allows(request_type)
    }

    /// Whether `other` declares the same relations, ignoring order and duplicates
    pub fn same_relations(&self, other: &Data) -> bool {
        let mut mine: Vec<&str> = self.related_ids.iter().map(String::as_str).collect();
        let mut theirs: Vec<&str> = other.related_ids.iter().map(String::as_str).collect();
        mine.sort_unstable();
        mine.dedup();
        theirs.sort_unstable();
        theirs.dedup();
        mine == theirs
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data {{ id: {}, related_ids: [{}], body: {} }}",
            self.id,
            self.related_ids.join(", "),
            self.body
        )
    }
}
