//! Content model shared by the API clients and the migration pipeline
//!
//! Every migratable item is identified by a [`ContentReference`]: its id on
//! the site it came from, its display name and its [`ContentLocation`]. Source
//! and destination ids never coincide, so the location is what lets a source
//! item be found again at the destination.

mod entities;
mod permissions;
mod publishable;

pub use entities::*;
pub use permissions::*;
pub use publishable::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Kinds of content the migration knows how to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    User,
    Group,
    Project,
    DataSource,
    Workbook,
    View,
}

impl ContentType {
    /// Pipeline stages; types inside a stage have no dependency on each other
    ///
    /// Group members are users, and project permissions name both users and
    /// groups, so neither can share a stage with what it references.
    pub const MIGRATION_STAGES: &'static [&'static [ContentType]] = &[
        &[ContentType::User],
        &[ContentType::Group],
        &[ContentType::Project],
        &[ContentType::DataSource],
        &[ContentType::Workbook],
    ];

    /// URL segment of the REST collection
    pub fn url_segment(&self) -> &'static str {
        match self {
            ContentType::User => "users",
            ContentType::Group => "groups",
            ContentType::Project => "projects",
            ContentType::DataSource => "datasources",
            ContentType::Workbook => "workbooks",
            ContentType::View => "views",
        }
    }

    /// Types that must be migrated before this one
    pub fn dependencies(&self) -> &'static [ContentType] {
        match self {
            ContentType::User => &[],
            ContentType::Group => &[ContentType::User],
            ContentType::Project => &[ContentType::User, ContentType::Group],
            ContentType::DataSource | ContentType::Workbook => {
                &[ContentType::User, ContentType::Group, ContentType::Project]
            }
            ContentType::View => &[ContentType::Workbook],
        }
    }

    pub fn stage_index(&self) -> Option<usize> {
        Self::MIGRATION_STAGES
            .iter()
            .position(|stage| stage.contains(self))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentType::User => "user",
            ContentType::Group => "group",
            ContentType::Project => "project",
            ContentType::DataSource => "data source",
            ContentType::Workbook => "workbook",
            ContentType::View => "view",
        };
        f.write_str(name)
    }
}

/// Hierarchical path of an item, `/`-joined when printed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ContentLocation {
    segments: Vec<String>,
}

impl ContentLocation {
    pub const SEPARATOR: &'static str = "/";

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_path(path: &str) -> Self {
        Self::new(
            path.split(Self::SEPARATOR)
                .filter(|segment| !segment.is_empty()),
        )
    }

    /// Users and groups live under their identity domain
    pub fn for_domain(domain: Option<&str>, name: &str) -> Self {
        match domain {
            Some(domain) if !domain.is_empty() => Self::new([domain, name]),
            _ => Self::new(["local", name]),
        }
    }

    pub fn append(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        match self.segments.split_last() {
            Some((_, rest)) if !rest.is_empty() => Some(Self::new(rest.iter().cloned())),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn path(&self) -> String {
        self.segments.join(Self::SEPARATOR)
    }
}

impl fmt::Display for ContentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl From<String> for ContentLocation {
    fn from(path: String) -> Self {
        Self::from_path(&path)
    }
}

impl From<ContentLocation> for String {
    fn from(location: ContentLocation) -> Self {
        location.path()
    }
}

/// Immutable identity of an item on one site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentReference {
    id: Uuid,
    name: String,
    location: ContentLocation,
}

impl ContentReference {
    pub fn new(id: Uuid, name: impl Into<String>, location: ContentLocation) -> Self {
        Self {
            id,
            name: name.into(),
            location,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &ContentLocation {
        &self.location
    }
}

impl fmt::Display for ContentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.id)
    }
}

/// An item listed from a site
pub trait ContentItem {
    fn reference(&self) -> ContentReference;
}

/// Resolved destination references keyed by source type and id
pub type ReferenceMap = HashMap<(ContentType, Uuid), ContentReference>;

/// An item carrying references to other content that must be rewritten to
/// destination ids before publishing
pub trait WithReferences {
    /// References that must resolve or the item fails
    fn required_references(&self) -> Vec<(ContentType, Uuid)> {
        Vec::new()
    }

    /// References that are dropped when they do not resolve
    fn optional_references(&self) -> Vec<(ContentType, Uuid)> {
        Vec::new()
    }

    /// Swap every reference found in `resolved`; drop unresolved optional ones
    fn apply_references(&mut self, _resolved: &ReferenceMap) {}
}

/// An item carrying permission sets
pub trait WithPermissions {
    fn permissions_mut(&mut self) -> Vec<&mut Permissions>;
}

pub(crate) fn replace_reference(
    reference: &mut ContentReference,
    content_type: ContentType,
    resolved: &ReferenceMap,
) {
    if let Some(destination) = resolved.get(&(content_type, reference.id())) {
        *reference = destination.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_path_round_trip() {
        let location = ContentLocation::from_path("/Finance/Quarterly/");
        assert_eq!(location.segments(), &["Finance", "Quarterly"]);
        assert_eq!(location.path(), "Finance/Quarterly");
        assert_eq!(location.name(), Some("Quarterly"));
        assert_eq!(location.parent(), Some(ContentLocation::new(["Finance"])));
        assert_eq!(ContentLocation::new(["Finance"]).parent(), None);
    }

    #[test]
    fn test_user_locations_use_domain() {
        assert_eq!(
            ContentLocation::for_domain(Some("corp"), "alice").path(),
            "corp/alice"
        );
        assert_eq!(ContentLocation::for_domain(None, "bob").path(), "local/bob");
    }

    #[test]
    fn test_reference_serializes_location_as_path() {
        let reference = ContentReference::new(
            Uuid::nil(),
            "Quarterly",
            ContentLocation::new(["Finance", "Quarterly"]),
        );
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["location"], "Finance/Quarterly");

        let parsed: ContentReference = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn test_stages_follow_dependencies() {
        for stage in ContentType::MIGRATION_STAGES {
            for content_type in *stage {
                let index = content_type.stage_index().unwrap();
                for dependency in content_type.dependencies() {
                    assert!(dependency.stage_index().unwrap() < index);
                }
            }
        }
        assert_eq!(ContentType::View.stage_index(), None);
    }
}
