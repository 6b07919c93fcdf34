//! Content API clients
//!
//! One client per content type, each built on the [`RestClient`] and the
//! paged list accessor. Permissions, tags, connections and file publishing
//! are separate sub-clients that the content clients hold.
//!
//! [`RestClient`]: crate::services::client::rest_client::RestClient

pub mod connections;
pub mod data_sources;
pub mod groups;
pub mod permissions;
pub mod projects;
pub mod publishing;
pub mod references;
pub mod site;
pub mod tags;
pub mod users;
pub mod views;
pub mod workbooks;

pub use connections::ConnectionsApiClient;
pub use data_sources::DataSourcesApiClient;
pub use groups::GroupsApiClient;
pub use permissions::PermissionsApiClient;
pub use projects::ProjectsApiClient;
pub use publishing::{plan_chunks, FilePublisher, PublishOptions};
pub use references::ContentReferenceCache;
pub use site::SiteApiClient;
pub use tags::TagsApiClient;
pub use users::UsersApiClient;
pub use views::ViewsApiClient;
pub use workbooks::WorkbooksApiClient;
