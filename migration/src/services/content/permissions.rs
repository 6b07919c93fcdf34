use super::ContentType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Well-known capability names
pub mod capability_names {
    pub const READ: &str = "Read";
    pub const WRITE: &str = "Write";
    pub const EXPORT_DATA: &str = "ExportData";
    pub const CONNECT: &str = "Connect";
    pub const PROJECT_LEADER: &str = "ProjectLeader";
    pub const INHERITED_PROJECT_LEADER: &str = "InheritedProjectLeader";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GranteeType {
    User,
    Group,
}

impl GranteeType {
    pub fn content_type(&self) -> ContentType {
        match self {
            GranteeType::User => ContentType::User,
            GranteeType::Group => ContentType::Group,
        }
    }

    /// URL segment used by capability deletes
    pub fn url_segment(&self) -> &'static str {
        match self {
            GranteeType::User => "users",
            GranteeType::Group => "groups",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityMode {
    Allow,
    Deny,
}

impl CapabilityMode {
    /// Deny wins over Allow
    pub fn resolve(self, other: CapabilityMode) -> CapabilityMode {
        if self == CapabilityMode::Deny || other == CapabilityMode::Deny {
            CapabilityMode::Deny
        } else {
            CapabilityMode::Allow
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Allow" => Some(CapabilityMode::Allow),
            "Deny" => Some(CapabilityMode::Deny),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityMode::Allow => "Allow",
            CapabilityMode::Deny => "Deny",
        }
    }
}

impl fmt::Display for CapabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub mode: CapabilityMode,
}

impl Capability {
    pub fn new(name: impl Into<String>, mode: CapabilityMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }

    pub fn allow(name: impl Into<String>) -> Self {
        Self::new(name, CapabilityMode::Allow)
    }

    pub fn deny(name: impl Into<String>) -> Self {
        Self::new(name, CapabilityMode::Deny)
    }
}

/// The capabilities granted to one user or group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranteeCapability {
    pub grantee_type: GranteeType,
    pub grantee_id: Uuid,
    pub capabilities: Vec<Capability>,
}

impl GranteeCapability {
    pub fn new(grantee_type: GranteeType, grantee_id: Uuid, capabilities: Vec<Capability>) -> Self {
        Self {
            grantee_type,
            grantee_id,
            capabilities,
        }
    }

    pub fn with_grantee_id(mut self, grantee_id: Uuid) -> Self {
        self.grantee_id = grantee_id;
        self
    }
}

/// Permission set of one content item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub grantee_capabilities: Vec<GranteeCapability>,
}

impl Permissions {
    pub fn new(grantee_capabilities: Vec<GranteeCapability>) -> Self {
        Self {
            grantee_capabilities,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grantee_capabilities.is_empty()
    }

    pub fn contains(&self, grantee_type: GranteeType, grantee_id: Uuid, capability: &Capability) -> bool {
        self.grantee_capabilities.iter().any(|gc| {
            gc.grantee_type == grantee_type
                && gc.grantee_id == grantee_id
                && gc.capabilities.contains(capability)
        })
    }
}
