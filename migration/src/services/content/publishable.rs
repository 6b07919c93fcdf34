use super::{
    replace_reference, Connection, ContentReference, ContentType, DataSource, Group, Permissions,
    Project, ReferenceMap, User, View, WithPermissions, WithReferences, Workbook,
};
use crate::services::files::ContentFileHandle;

/// Users are published as listed; they reference nothing else
impl WithReferences for User {}

/// A group and its members, as pulled from the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishableGroup {
    pub group: Group,
    pub users: Vec<ContentReference>,
}

impl WithReferences for PublishableGroup {
    fn optional_references(&self) -> Vec<(ContentType, uuid::Uuid)> {
        self.users
            .iter()
            .map(|user| (ContentType::User, user.id()))
            .collect()
    }

    fn apply_references(&mut self, resolved: &ReferenceMap) {
        self.users = self
            .users
            .iter()
            .filter_map(|user| resolved.get(&(ContentType::User, user.id())).cloned())
            .collect();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishableProject {
    pub project: Project,
    pub permissions: Permissions,
}

impl WithReferences for PublishableProject {
    fn required_references(&self) -> Vec<(ContentType, uuid::Uuid)> {
        let mut references = vec![(ContentType::User, self.project.owner.id())];
        if let Some(parent) = &self.project.parent {
            references.push((ContentType::Project, parent.id()));
        }
        references
    }

    fn apply_references(&mut self, resolved: &ReferenceMap) {
        replace_reference(&mut self.project.owner, ContentType::User, resolved);
        if let Some(parent) = self.project.parent.as_mut() {
            replace_reference(parent, ContentType::Project, resolved);
        }
    }
}

impl WithPermissions for PublishableProject {
    fn permissions_mut(&mut self) -> Vec<&mut Permissions> {
        vec![&mut self.permissions]
    }
}

/// A data source with its downloaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishableDataSource {
    pub data_source: DataSource,
    pub connections: Vec<Connection>,
    pub permissions: Permissions,
    pub file: ContentFileHandle,
}

impl WithReferences for PublishableDataSource {
    fn required_references(&self) -> Vec<(ContentType, uuid::Uuid)> {
        vec![
            (ContentType::Project, self.data_source.project.id()),
            (ContentType::User, self.data_source.owner.id()),
        ]
    }

    fn apply_references(&mut self, resolved: &ReferenceMap) {
        replace_reference(&mut self.data_source.project, ContentType::Project, resolved);
        replace_reference(&mut self.data_source.owner, ContentType::User, resolved);
    }
}

impl WithPermissions for PublishableDataSource {
    fn permissions_mut(&mut self) -> Vec<&mut Permissions> {
        vec![&mut self.permissions]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPermissions {
    pub view: View,
    pub permissions: Permissions,
}

/// A workbook with its downloaded file and per-view permissions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishableWorkbook {
    pub workbook: Workbook,
    pub connections: Vec<Connection>,
    pub permissions: Permissions,
    pub views: Vec<ViewPermissions>,
    pub file: ContentFileHandle,
}

impl WithReferences for PublishableWorkbook {
    fn required_references(&self) -> Vec<(ContentType, uuid::Uuid)> {
        vec![
            (ContentType::Project, self.workbook.project.id()),
            (ContentType::User, self.workbook.owner.id()),
        ]
    }

    fn apply_references(&mut self, resolved: &ReferenceMap) {
        replace_reference(&mut self.workbook.project, ContentType::Project, resolved);
        replace_reference(&mut self.workbook.owner, ContentType::User, resolved);
    }
}

impl WithPermissions for PublishableWorkbook {
    fn permissions_mut(&mut self) -> Vec<&mut Permissions> {
        let mut all = vec![&mut self.permissions];
        all.extend(self.views.iter_mut().map(|view| &mut view.permissions));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::content::ContentLocation;
    use uuid::Uuid;

    fn reference(name: &str) -> ContentReference {
        ContentReference::new(Uuid::new_v4(), name, ContentLocation::new(["local", name]))
    }

    #[test]
    fn test_group_members_drop_when_unresolved() {
        let alice = reference("alice");
        let bob = reference("bob");
        let mut group = PublishableGroup {
            group: Group {
                id: Uuid::new_v4(),
                name: "Analysts".to_string(),
                domain: None,
                minimum_site_role: None,
            },
            users: vec![alice.clone(), bob],
        };

        let destination_alice = reference("alice");
        let mut resolved = ReferenceMap::new();
        resolved.insert((ContentType::User, alice.id()), destination_alice.clone());

        group.apply_references(&resolved);
        assert_eq!(group.users, vec![destination_alice]);
    }

    #[test]
    fn test_project_requires_owner_and_parent() {
        let parent = reference("Finance");
        let owner = reference("alice");
        let project = PublishableProject {
            project: Project {
                id: Uuid::new_v4(),
                name: "Quarterly".to_string(),
                description: None,
                parent: Some(parent.clone()),
                owner: owner.clone(),
                content_permissions: None,
                location: ContentLocation::new(["Finance", "Quarterly"]),
            },
            permissions: Permissions::default(),
        };

        assert_eq!(
            project.required_references(),
            vec![
                (ContentType::User, owner.id()),
                (ContentType::Project, parent.id())
            ]
        );
    }
}
