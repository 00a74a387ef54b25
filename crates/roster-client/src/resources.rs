//! Generic CRUD over the resource registry.
//!
//! Writes are validated against the resource schema before anything is sent.

use reqwest::Method;
use roster_core::{Record, RecordId, ResourceKind, ResourceTable};
use serde_json::Value;

use crate::client::ApiClient;
use crate::error::ApiResult;

impl ApiClient {
    pub async fn list_records(&self, kind: ResourceKind) -> ApiResult<Vec<Record>> {
        self.get_list(kind.api_base(), kind.path()).await
    }

    /// Fetch every row into a searchable, pageable table.
    pub async fn load_table(&self, kind: ResourceKind) -> ApiResult<ResourceTable> {
        let rows = self.list_records(kind).await?;
        tracing::debug!(resource = kind.path(), rows = rows.len(), "table loaded");
        Ok(ResourceTable::new(kind.schema(), rows))
    }

    /// Create a row. Returns the server's copy, or the submitted record when
    /// the server answers without one.
    pub async fn create_record(&self, kind: ResourceKind, record: &Record) -> ApiResult<Record> {
        let schema = kind.schema();
        schema.ensure_writable()?;
        schema.validate(record, false)?;

        let data = self
            .send_json(Method::POST, kind.api_base(), kind.path(), record)
            .await?;
        tracing::info!(resource = kind.path(), "record created");
        Ok(into_record(data, record))
    }

    /// Send only the changed fields.
    pub async fn update_record(
        &self,
        kind: ResourceKind,
        id: &RecordId,
        changes: &Record,
    ) -> ApiResult<Record> {
        let schema = kind.schema();
        schema.ensure_writable()?;
        schema.validate(changes, true)?;

        let path = format!("{}/{id}", kind.path());
        let data = self
            .send_json(Method::PUT, kind.api_base(), &path, changes)
            .await?;
        tracing::info!(resource = kind.path(), %id, "record updated");
        Ok(into_record(data, changes))
    }

    pub async fn delete_record(&self, kind: ResourceKind, id: &RecordId) -> ApiResult<()> {
        kind.schema().ensure_writable()?;
        let path = format!("{}/{id}", kind.path());
        self.send(self.request(Method::DELETE, kind.api_base(), &path))
            .await?
            .into_payload()?;
        tracing::info!(resource = kind.path(), %id, "record deleted");
        Ok(())
    }
}

fn into_record(data: Value, fallback: &Record) -> Record {
    match data {
        Value::Object(map) => map,
        _ => fallback.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::test_support::client_for;
    use roster_core::resource::SchemaError;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_load_table_uses_district_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/districts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "Metro Manila North" },
                { "id": 2, "name": "Bulacan" }
            ])))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some("tok"));
        let table = client.load_table(ResourceKind::Districts).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.search("bulacan").len(), 1);
    }

    #[tokio::test]
    async fn test_create_validates_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some("tok"));
        let err = client
            .create_record(ResourceKind::Departments, &record(json!({ "description": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Schema(SchemaError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_create_returns_server_copy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/departments"))
            .and(body_json(json!({ "name": "Finance" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true, "data": { "id": 31, "name": "Finance" }
            })))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some("tok"));
        let created = client
            .create_record(ResourceKind::Departments, &record(json!({ "name": "Finance" })))
            .await
            .unwrap();
        assert_eq!(RecordId::from_record(&created), Some(RecordId::from(31)));
    }

    #[tokio::test]
    async fn test_update_and_delete_address_the_row() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/groups/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/groups/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some("tok"));
        let id = RecordId::from(5);
        let changes = record(json!({ "description": "Updated" }));
        let updated = client
            .update_record(ResourceKind::Groups, &id, &changes)
            .await
            .unwrap();
        assert_eq!(updated, changes);
        client.delete_record(ResourceKind::Groups, &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_lookup_refuses_writes() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server, Some("tok"));
        let err = client
            .delete_record(ResourceKind::LocalCongregations, &RecordId::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Schema(SchemaError::ReadOnly { .. })));
    }
}
