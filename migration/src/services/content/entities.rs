use super::{ContentItem, ContentLocation, ContentReference};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub domain: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub site_role: String,
    pub auth_setting: Option<String>,
}

impl User {
    pub fn location(&self) -> ContentLocation {
        ContentLocation::for_domain(self.domain.as_deref(), &self.name)
    }
}

impl ContentItem for User {
    fn reference(&self) -> ContentReference {
        ContentReference::new(self.id, &self.name, self.location())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub domain: Option<String>,
    pub minimum_site_role: Option<String>,
}

impl Group {
    pub fn location(&self) -> ContentLocation {
        ContentLocation::for_domain(self.domain.as_deref(), &self.name)
    }
}

impl ContentItem for Group {
    fn reference(&self) -> ContentReference {
        ContentReference::new(self.id, &self.name, self.location())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<ContentReference>,
    pub owner: ContentReference,
    pub content_permissions: Option<String>,
    pub location: ContentLocation,
}

impl ContentItem for Project {
    fn reference(&self) -> ContentReference {
        ContentReference::new(self.id, &self.name, self.location.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub content_url: Option<String>,
    /// Connector type, e.g. `excel-direct`
    pub data_source_type: Option<String>,
    pub project: ContentReference,
    pub owner: ContentReference,
    pub is_certified: bool,
    pub certification_note: Option<String>,
    pub encrypt_extracts: bool,
    pub has_extracts: bool,
    pub tags: Vec<String>,
}

impl DataSource {
    pub fn location(&self) -> ContentLocation {
        self.project.location().append(&self.name)
    }
}

impl ContentItem for DataSource {
    fn reference(&self) -> ContentReference {
        ContentReference::new(self.id, &self.name, self.location())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub content_url: Option<String>,
    pub project: ContentReference,
    pub owner: ContentReference,
    pub show_tabs: bool,
    pub encrypt_extracts: bool,
    /// Size in megabytes as reported by the server
    pub size: Option<u64>,
    pub tags: Vec<String>,
    pub views: Vec<View>,
}

impl Workbook {
    pub fn location(&self) -> ContentLocation {
        self.project.location().append(&self.name)
    }
}

impl ContentItem for Workbook {
    fn reference(&self) -> ContentReference {
        ContentReference::new(self.id, &self.name, self.location())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub id: Uuid,
    pub name: String,
    pub content_url: Option<String>,
    pub workbook_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub connection_type: Option<String>,
    pub server_address: Option<String>,
    pub server_port: Option<String>,
    pub username: Option<String>,
    pub embed_password: bool,
    pub query_tagging_enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workbook_location_is_under_project() {
        let project = ContentReference::new(
            Uuid::new_v4(),
            "Quarterly",
            ContentLocation::new(["Finance", "Quarterly"]),
        );
        let owner = ContentReference::new(
            Uuid::new_v4(),
            "alice",
            ContentLocation::new(["local", "alice"]),
        );
        let workbook = Workbook {
            id: Uuid::new_v4(),
            name: "Revenue".to_string(),
            description: None,
            content_url: Some("Revenue".to_string()),
            project,
            owner,
            show_tabs: true,
            encrypt_extracts: false,
            size: Some(2),
            tags: vec![],
            views: vec![],
        };

        let reference = workbook.reference();
        assert_eq!(reference.location().path(), "Finance/Quarterly/Revenue");
        assert_eq!(reference.name(), "Revenue");
    }
}
