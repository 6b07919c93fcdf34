//! REST API wire types (JSON)
//!
//! Field names follow the server's camelCase JSON. Numbers and booleans may
//! arrive as strings and are decoded with the flexible deserializers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::serialization::{
    deserialize_bool_flexible, deserialize_option_u64_flexible, deserialize_u64_flexible,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(deserialize_with = "deserialize_u64_flexible")]
    pub page_number: u64,
    #[serde(deserialize_with = "deserialize_u64_flexible")]
    pub page_size: u64,
    #[serde(deserialize_with = "deserialize_u64_flexible")]
    pub total_available: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRef {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainType {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsType {
    #[serde(default)]
    pub tag: Vec<TagType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagType {
    pub label: String,
}

impl TagsType {
    pub fn labels(&self) -> Vec<String> {
        self.tag.iter().map(|t| t.label.clone()).collect()
    }

    pub fn from_labels(labels: &[String]) -> Self {
        Self {
            tag: labels
                .iter()
                .map(|label| TagType {
                    label: label.clone(),
                })
                .collect(),
        }
    }
}

/// `{"error": {...}}` envelope of non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorType {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: String,
}

// Server info & authentication

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoResponse {
    pub server_info: ServerInfoType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoType {
    pub product_version: ProductVersionType,
    pub rest_api_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductVersionType {
    pub value: String,
    #[serde(default)]
    pub build: String,
}

#[derive(Serialize)]
pub struct SignInRequest<'a> {
    pub credentials: SignInCredentials<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInCredentials<'a> {
    pub personal_access_token_name: &'a str,
    pub personal_access_token_secret: &'a str,
    pub site: SiteContentUrl<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContentUrl<'a> {
    pub content_url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInResponse {
    pub credentials: CredentialsType,
}

#[derive(Clone, Deserialize)]
pub struct CredentialsType {
    pub token: String,
    pub site: SiteType,
    pub user: IdRef,
}

impl std::fmt::Debug for CredentialsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsType")
            .field("site", &self.site)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteType {
    pub id: Uuid,
    #[serde(default)]
    pub content_url: String,
}

// Users

#[derive(Debug, Clone, Deserialize)]
pub struct UsersResponse {
    pub pagination: Pagination,
    #[serde(default)]
    pub users: UserListType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListType {
    #[serde(default)]
    pub user: Vec<UserType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub user: UserType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserType {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub site_role: Option<String>,
    #[serde(default)]
    pub auth_setting: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub domain: Option<DomainType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateUserRequest {
    pub user: CreateUserType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserType {
    pub name: String,
    pub site_role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_setting: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateUserRequest {
    pub user: UpdateUserType,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_role: Option<String>,
}

// Groups

#[derive(Debug, Clone, Deserialize)]
pub struct GroupsResponse {
    pub pagination: Pagination,
    #[serde(default)]
    pub groups: GroupListType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupListType {
    #[serde(default)]
    pub group: Vec<GroupType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupResponse {
    pub group: GroupType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupType {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub domain: Option<DomainType>,
    #[serde(default)]
    pub minimum_site_role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGroupRequest {
    pub group: CreateGroupType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupType {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_site_role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddUserToGroupRequest {
    pub user: IdRef,
}

// Projects

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectsResponse {
    pub pagination: Pagination,
    #[serde(default)]
    pub projects: ProjectListType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectListType {
    #[serde(default)]
    pub project: Vec<ProjectType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectResponse {
    pub project: ProjectType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectType {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_project_id: Option<Uuid>,
    #[serde(default)]
    pub content_permissions: Option<String>,
    #[serde(default)]
    pub owner: Option<IdRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRequest {
    pub project: ProjectRequestType,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequestType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_project_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdRef>,
}

// Data sources

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourcesResponse {
    pub pagination: Pagination,
    #[serde(default)]
    pub datasources: DataSourceListType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataSourceListType {
    #[serde(default)]
    pub datasource: Vec<DataSourceType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceResponse {
    pub datasource: DataSourceType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceType {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default, rename = "type")]
    pub data_source_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub is_certified: bool,
    #[serde(default)]
    pub certification_note: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub encrypt_extracts: bool,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub has_extracts: bool,
    #[serde(default)]
    pub project: Option<NamedRef>,
    #[serde(default)]
    pub owner: Option<IdRef>,
    #[serde(default)]
    pub tags: TagsType,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSourceRequest {
    pub datasource: DataSourceRequestType,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRequestType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_certified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_extracts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<IdRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdRef>,
}

// Workbooks & views

#[derive(Debug, Clone, Deserialize)]
pub struct WorkbooksResponse {
    pub pagination: Pagination,
    #[serde(default)]
    pub workbooks: WorkbookListType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkbookListType {
    #[serde(default)]
    pub workbook: Vec<WorkbookType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkbookResponse {
    pub workbook: WorkbookType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookType {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub show_tabs: bool,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub encrypt_extracts: bool,
    #[serde(default, deserialize_with = "deserialize_option_u64_flexible")]
    pub size: Option<u64>,
    #[serde(default)]
    pub project: Option<NamedRef>,
    #[serde(default)]
    pub owner: Option<IdRef>,
    #[serde(default)]
    pub tags: TagsType,
    #[serde(default)]
    pub views: ViewListType,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkbookRequest {
    pub workbook: WorkbookRequestType,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookRequestType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_tabs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_extracts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<IdRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewsResponse {
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub views: ViewListType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewListType {
    #[serde(default)]
    pub view: Vec<ViewType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewType {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub workbook: Option<IdRef>,
    #[serde(default)]
    pub project: Option<IdRef>,
    #[serde(default)]
    pub tags: TagsType,
}

// Connections

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionsResponse {
    #[serde(default)]
    pub connections: ConnectionListType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionListType {
    #[serde(default)]
    pub connection: Vec<ConnectionType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionType {
    pub id: Uuid,
    #[serde(default, rename = "type")]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub server_address: Option<String>,
    #[serde(default)]
    pub server_port: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub embed_password: bool,
    #[serde(default)]
    pub query_tagging_enabled: Option<bool>,
}

// Permissions

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsEnvelope {
    pub permissions: PermissionsType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsType {
    #[serde(default)]
    pub grantee_capabilities: Vec<GranteeCapabilitiesType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranteeCapabilitiesType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<IdRef>,
    #[serde(default)]
    pub capabilities: CapabilitiesType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesType {
    #[serde(default)]
    pub capability: Vec<CapabilityType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityType {
    pub name: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagsRequest {
    pub tags: TagsType,
}

// File uploads

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResponse {
    pub file_upload: FileUploadType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadType {
    pub upload_session_id: String,
    #[serde(default, deserialize_with = "deserialize_option_u64_flexible")]
    pub file_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_accepts_string_numbers() {
        let response: UsersResponse = serde_json::from_value(serde_json::json!({
            "pagination": { "pageNumber": "1", "pageSize": "100", "totalAvailable": "2" },
            "users": { "user": [
                { "id": "9f9e9d9c-0000-4000-8000-000000000001", "name": "alice",
                  "siteRole": "Creator", "domain": { "name": "local" } },
                { "id": "9f9e9d9c-0000-4000-8000-000000000002", "name": "bob" }
            ]}
        }))
        .unwrap();

        assert_eq!(response.pagination.total_available, 2);
        assert_eq!(response.users.user.len(), 2);
        assert_eq!(response.users.user[0].site_role.as_deref(), Some("Creator"));
        assert!(response.users.user[1].domain.is_none());
    }

    #[test]
    fn test_empty_list_is_omitted() {
        let response: WorkbooksResponse = serde_json::from_value(serde_json::json!({
            "pagination": { "pageNumber": "1", "pageSize": "100", "totalAvailable": "0" },
            "workbooks": {}
        }))
        .unwrap();
        assert!(response.workbooks.workbook.is_empty());
    }

    #[test]
    fn test_update_requests_skip_unset_fields() {
        let request = WorkbookRequest {
            workbook: WorkbookRequestType {
                owner: Some(IdRef { id: Uuid::nil() }),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "workbook": { "owner": { "id": Uuid::nil() } } })
        );
    }
}
