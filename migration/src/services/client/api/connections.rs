use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::client::errors::ClientResult;
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{ConnectionType, ConnectionsResponse};
use crate::services::content::{Connection, ContentType};

/// Connections of data sources or workbooks
pub struct ConnectionsApiClient {
    rest: Arc<RestClient>,
    content_type: ContentType,
}

impl ConnectionsApiClient {
    pub fn new(rest: Arc<RestClient>, content_type: ContentType) -> Self {
        Self { rest, content_type }
    }

    pub async fn list(&self, content_id: Uuid, cancel: &CancellationToken) -> ClientResult<Vec<Connection>> {
        let response: ConnectionsResponse = self
            .rest
            .get(self.content_type.url_segment())
            .segment(content_id)
            .segment("connections")
            .send_json(cancel)
            .await?;
        Ok(response
            .connections
            .connection
            .into_iter()
            .map(connection_from_wire)
            .collect())
    }
}

fn connection_from_wire(connection: ConnectionType) -> Connection {
    Connection {
        id: connection.id,
        connection_type: connection.connection_type,
        server_address: connection.server_address,
        server_port: connection.server_port,
        username: connection.user_name,
        embed_password: connection.embed_password,
        query_tagging_enabled: connection.query_tagging_enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::client::test_support::{signed_in_rest, ScriptedTransport};
    use reqwest::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_connections() {
        let leaf = ScriptedTransport::new();
        let id = Uuid::new_v4();
        leaf.push_json(
            StatusCode::OK,
            json!({ "connections": { "connection": [
                { "id": Uuid::new_v4(), "type": "postgres", "serverAddress": "db.internal",
                  "serverPort": "5432", "userName": "report", "embedPassword": "true" }
            ]}}),
        );
        let client = ConnectionsApiClient::new(signed_in_rest(leaf.clone()), ContentType::DataSource);

        let connections = client.list(id, &CancellationToken::new()).await.unwrap();

        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].connection_type.as_deref(), Some("postgres"));
        assert_eq!(connections[0].username.as_deref(), Some("report"));
        assert!(connections[0].embed_password);
        assert!(leaf.requests()[0]
            .url
            .path()
            .ends_with(&format!("/datasources/{}/connections", id)));
    }
}
