// `/compilations/*` façade: the user's trips and their ordered items.

use tracing::info;

use crate::{
    api::{ApiClient, ApiError},
    models::{AddItemRequest, Compilation, CompilationPatch, NewCompilation, RemoveItemRequest},
};

pub const DEFAULT_COMPILATION_NAME: &str = "Ma compilation";

#[derive(Clone)]
pub struct CompilationsService {
    api: ApiClient,
}

impl CompilationsService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Compilation>, ApiError> {
        let raw: Option<Vec<Compilation>> = self.api.get("/compilations/", &[]).await?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(Compilation::normalize)
            .collect())
    }

    pub async fn get(&self, id: i64) -> Result<Compilation, ApiError> {
        let raw: Compilation = self.api.get(&format!("/compilations/{id}/"), &[]).await?;
        Ok(raw.normalize())
    }

    /// Creates a trip. A missing or blank name falls back to the default
    /// trip name.
    pub async fn create(
        &self,
        name: Option<&str>,
        profile: &str,
        country: &str,
    ) -> Result<Compilation, ApiError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_COMPILATION_NAME);

        let request = NewCompilation {
            name: name.to_string(),
            profile: profile.to_string(),
            country: country.to_string(),
        };
        let created: Compilation = self.api.post("/compilations/", &request).await?;
        info!(compilation_id = created.id, name = %created.name, "created compilation");
        Ok(created.normalize())
    }

    // Sent as PUT; only the fields set on `patch` are serialized
    pub async fn update(&self, id: i64, patch: &CompilationPatch) -> Result<Compilation, ApiError> {
        let raw: Compilation = self
            .api
            .put(&format!("/compilations/{id}/"), patch)
            .await?;
        Ok(raw.normalize())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let _: Option<serde_json::Value> = self.api.delete(&format!("/compilations/{id}/")).await?;
        info!(compilation_id = id, "deleted compilation");
        Ok(())
    }

    pub async fn add_item(
        &self,
        id: i64,
        attraction_id: i64,
        order_index: Option<i32>,
    ) -> Result<Compilation, ApiError> {
        let request = AddItemRequest {
            attraction_id,
            order_index,
        };
        let raw: Compilation = self
            .api
            .post(&format!("/compilations/{id}/add_item/"), &request)
            .await?;
        Ok(raw.normalize())
    }

    pub async fn remove_item(&self, id: i64, attraction_id: i64) -> Result<Compilation, ApiError> {
        let request = RemoveItemRequest { attraction_id };
        let raw: Compilation = self
            .api
            .post(&format!("/compilations/{id}/remove_item/"), &request)
            .await?;
        Ok(raw.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        mock_server::{client, MockResponse, MockServer},
        Method,
    };
    use crate::session::Session;
    use serde_json::json;
    use std::sync::Arc;

    fn service(server: &Arc<MockServer>) -> CompilationsService {
        CompilationsService::new(client(server, Session::in_memory()))
    }

    #[tokio::test]
    async fn test_create_defaults_blank_name() {
        let server = Arc::new(MockServer::new());
        server
            .respond(
                Method::Post,
                "/compilations/",
                MockResponse::json(201, json!({"id": 3, "name": "Ma compilation", "items": []})),
            )
            .await;
        let compilations = service(&server);

        let created = compilations.create(Some("   "), "tourist", "France").await.unwrap();
        assert_eq!(created.id, 3);

        let sent = server.last_request(Method::Post, "/compilations/").await.unwrap();
        assert_eq!(
            sent.body,
            Some(json!({"name": "Ma compilation", "profile": "tourist", "country": "France"}))
        );

        compilations.create(None, "tourist", "France").await.unwrap();
        let sent = server.last_request(Method::Post, "/compilations/").await.unwrap();
        assert_eq!(sent.body.unwrap()["name"], "Ma compilation");
    }

    #[tokio::test]
    async fn test_list_normalizes_item_locations() {
        let server = Arc::new(MockServer::new());
        server
            .respond(
                Method::Get,
                "/compilations/",
                MockResponse::json(
                    200,
                    json!([{
                        "id": 1,
                        "name": "Paris",
                        "items": [{"id": 7, "order_index": 0, "attraction_id": 2,
                                   "attraction": {"id": 2, "place_id": "p2", "location": {"lat": 48.8, "lng": 2.3}}}]
                    }]),
                ),
            )
            .await;

        let list = service(&server).list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].items[0].attraction.latitude, Some(48.8));
    }

    #[tokio::test]
    async fn test_update_sends_only_present_fields() {
        let server = Arc::new(MockServer::new());
        server
            .respond(
                Method::Put,
                "/compilations/5/",
                MockResponse::json(200, json!({"id": 5, "name": "Rome"})),
            )
            .await;

        let patch = CompilationPatch {
            name: Some("Rome".into()),
            ..Default::default()
        };
        let updated = service(&server).update(5, &patch).await.unwrap();
        assert_eq!(updated.name, "Rome");

        let sent = server.last_request(Method::Put, "/compilations/5/").await.unwrap();
        assert_eq!(sent.body, Some(json!({"name": "Rome"})));
        assert_eq!(server.request_count(Method::Patch, "/compilations/5/").await, 0);
    }

    #[tokio::test]
    async fn test_item_endpoints() {
        let server = Arc::new(MockServer::new());
        server
            .respond(
                Method::Post,
                "/compilations/5/add_item/",
                MockResponse::json(200, json!({"id": 5, "items": [{"id": 1, "attraction_id": 9}]})),
            )
            .await;
        server
            .respond(
                Method::Post,
                "/compilations/5/remove_item/",
                MockResponse::json(200, json!({"id": 5, "items": []})),
            )
            .await;
        server
            .respond(Method::Delete, "/compilations/5/", MockResponse::raw(204, ""))
            .await;
        let compilations = service(&server);

        let added = compilations.add_item(5, 9, None).await.unwrap();
        assert_eq!(added.items.len(), 1);
        let sent = server
            .last_request(Method::Post, "/compilations/5/add_item/")
            .await
            .unwrap();
        assert_eq!(sent.body, Some(json!({"attraction_id": 9})));

        let removed = compilations.remove_item(5, 9).await.unwrap();
        assert!(removed.items.is_empty());

        tokio_test::assert_ok!(compilations.delete(5).await);
    }

    #[tokio::test]
    async fn test_missing_compilation_is_not_found() {
        let server = Arc::new(MockServer::new());
        let err = service(&server).get(42).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
