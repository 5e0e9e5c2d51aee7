use crate::core::distance::calculate_bounding_box;
use crate::models::{Profile, UserId};
use crate::services::store::{BlockList, ProfileSource, StorageError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

/// Documents fetched per page
const PAGE_SIZE: usize = 100;

/// Errors that can occur when interacting with Appwrite
#[derive(Debug, Error)]
pub enum AppwriteError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Appwrite API client
///
/// Read-only view of the data the engine consumes:
/// - Profiles (for browsing and the daily pick)
/// - Block relationships owned by trust-and-safety
pub struct AppwriteClient {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    client: Client,
    collections: AppwriteCollections,
}

/// Collection IDs in Appwrite
#[derive(Debug, Clone)]
pub struct AppwriteCollections {
    pub profiles: String,
    pub blocks: String,
}

impl AppwriteClient {
    /// Create a new Appwrite client
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        collections: AppwriteCollections,
    ) -> Result<Self, AppwriteError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            database_id,
            client,
            collections,
        })
    }

    fn documents_url(&self, collection: &str) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.database_id,
            collection
        )
    }

    /// Fetch every document matching `queries`, following pagination
    async fn list_documents(&self, collection: &str, queries: &[String]) -> Result<Vec<Value>, AppwriteError> {
        let url = self.documents_url(collection);
        let mut documents = Vec::new();

        loop {
            let mut page_queries = queries.to_vec();
            page_queries.push(format!("limit({})", PAGE_SIZE));
            page_queries.push(format!("offset({})", documents.len()));

            let query_string = page_queries
                .iter()
                .map(|q| format!("queries[]={}", urlencoding::encode(q)))
                .collect::<Vec<_>>()
                .join("&");
            let full_url = format!("{}?{}", url, query_string);

            let response = self
                .client
                .get(&full_url)
                .header("X-Appwrite-Key", &self.api_key)
                .header("X-Appwrite-Project", &self.project_id)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(AppwriteError::Unauthorized);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
                tracing::error!("Failed to list {}: {} - {}", collection, status, body);
                return Err(AppwriteError::ApiError(format!("Failed to list {}: {}", collection, status)));
            }

            let json: Value = response.json().await?;
            let page = json
                .get("documents")
                .and_then(|d| d.as_array())
                .ok_or_else(|| AppwriteError::InvalidResponse("Missing documents array".into()))?;

            let fetched = page.len();
            documents.extend(page.iter().cloned());

            if fetched < PAGE_SIZE {
                break;
            }
        }

        tracing::debug!("Fetched {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    /// Fetch profiles matching `queries`; documents that fail to parse are skipped
    async fn query_profiles(&self, queries: &[String]) -> Result<Vec<Profile>, AppwriteError> {
        let documents = self.list_documents(&self.collections.profiles, queries).await?;

        let profiles = documents
            .iter()
            .filter_map(|doc| match parse_profile(doc) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!("Skipping unreadable profile document: {}", e);
                    None
                }
            })
            .collect();

        Ok(profiles)
    }

    /// Get a single profile by user ID
    pub async fn fetch_profile(&self, user_id: &str) -> Result<Profile, AppwriteError> {
        tracing::debug!("Fetching profile for user: {}", user_id);

        let queries = [format!("equal(\"userId\", [\"{}\"])", user_id)];
        let documents = self.list_documents(&self.collections.profiles, &queries).await?;

        let doc = documents
            .first()
            .ok_or_else(|| AppwriteError::NotFound(format!("Profile not found for user {}", user_id)))?;

        parse_profile(doc)
    }

    /// ACTIVE profiles inside the seeker's bounding box, plus those without a location
    pub async fn query_candidates(&self, seeker: &Profile) -> Result<Vec<Profile>, AppwriteError> {
        let active = "equal(\"state\", [\"active\"])".to_string();

        let Some((lat, lon)) = seeker.coordinates() else {
            return self.query_profiles(&[active]).await;
        };

        // Add geospatial bounding box filter, one query per longitude range
        let bbox = calculate_bounding_box(lat, lon, seeker.max_distance_km);
        let mut queries: Vec<Vec<String>> = bbox
            .longitude_ranges()
            .into_iter()
            .map(|(min_lon, max_lon)| {
                vec![
                    active.clone(),
                    format!("greaterThanEqual(\"latitude\", {})", bbox.min_lat),
                    format!("lessThanEqual(\"latitude\", {})", bbox.max_lat),
                    format!("greaterThanEqual(\"longitude\", {})", min_lon),
                    format!("lessThanEqual(\"longitude\", {})", max_lon),
                ]
            })
            .collect();
        queries.push(vec![active, "isNull(\"latitude\")".to_string()]);

        let mut by_id: HashMap<UserId, Profile> = HashMap::new();
        for query in &queries {
            for profile in self.query_profiles(query).await? {
                by_id.insert(profile.user_id.clone(), profile);
            }
        }

        tracing::debug!("Queried {} candidates for {}", by_id.len(), seeker.user_id);
        Ok(by_id.into_values().collect())
    }

    /// IDs blocked by `user_id` and IDs that blocked `user_id`
    pub async fn fetch_blocks(&self, user_id: &str) -> Result<HashSet<UserId>, AppwriteError> {
        let mut blocked = HashSet::new();

        for (filter_field, other_field) in [("blockerId", "blockedId"), ("blockedId", "blockerId")] {
            let queries = [format!("equal(\"{}\", [\"{}\"])", filter_field, user_id)];
            let documents = self.list_documents(&self.collections.blocks, &queries).await?;

            for doc in documents {
                let data = doc.get("data").unwrap_or(&doc);
                match data.get(other_field).and_then(|v| v.as_str()) {
                    Some(id) if id != user_id => {
                        blocked.insert(id.to_string());
                    }
                    Some(_) => {}
                    None => tracing::warn!("Block document without {}", other_field),
                }
            }
        }

        Ok(blocked)
    }
}

/// Extract a profile from an Appwrite document
fn parse_profile(doc: &Value) -> Result<Profile, AppwriteError> {
    let data = doc.get("data").unwrap_or(doc);
    serde_json::from_value(data.clone())
        .map_err(|e| AppwriteError::InvalidResponse(format!("Failed to parse profile: {}", e)))
}

#[async_trait]
impl ProfileSource for AppwriteClient {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StorageError> {
        match self.fetch_profile(user_id).await {
            Ok(profile) => Ok(Some(profile)),
            Err(AppwriteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_active(&self) -> Result<Vec<Profile>, StorageError> {
        Ok(self.query_profiles(&["equal(\"state\", [\"active\"])".to_string()]).await?)
    }

    async fn candidate_pool(&self, seeker: &Profile) -> Result<Vec<Profile>, StorageError> {
        Ok(self.query_candidates(seeker).await?)
    }
}

#[async_trait]
impl BlockList for AppwriteClient {
    async fn blocked_ids(&self, user_id: &str) -> Result<HashSet<UserId>, StorageError> {
        Ok(self.fetch_blocks(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn collections() -> AppwriteCollections {
        AppwriteCollections {
            profiles: "profiles".to_string(),
            blocks: "blocks".to_string(),
        }
    }

    fn client_for(url: &str) -> AppwriteClient {
        AppwriteClient::new(
            url.to_string(),
            "test_key".to_string(),
            "test_project".to_string(),
            "test_db".to_string(),
            collections(),
        )
        .unwrap()
    }

    fn profile_json(id: &str) -> Value {
        json!({
            "$id": format!("doc_{}", id),
            "userId": id,
            "name": "Test User",
            "state": "active",
            "gender": "female",
            "interestedIn": ["male"],
            "age": 27,
            "minAge": 21,
            "maxAge": 35,
            "latitude": 40.7128,
            "longitude": -74.0060,
            "interests": ["hiking"]
        })
    }

    #[test]
    fn test_appwrite_client_creation() {
        let client = client_for("https://appwrite.test/v1/");

        assert_eq!(client.api_key, "test_key");
        assert_eq!(
            client.documents_url("profiles"),
            "https://appwrite.test/v1/databases/test_db/collections/profiles/documents"
        );
    }

    #[test]
    fn test_parse_profile_defaults() {
        let profile = parse_profile(&profile_json("u1")).unwrap();
        assert_eq!(profile.user_id, "u1");
        assert_eq!(profile.max_distance_km, 50.0);
        assert!(profile.pace.is_none());
        assert!(!profile.dealbreakers.has_any());
    }

    #[tokio::test]
    async fn test_get_profile_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/databases/test_db/collections/profiles/documents".to_string()))
            .match_header("x-appwrite-key", "test_key")
            .match_header("x-appwrite-project", "test_project")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "total": 1, "documents": [profile_json("u1")] }).to_string())
            .create_async()
            .await;

        let client = client_for(&server.url());
        let profile = client.get_profile("u1").await.unwrap();

        assert_eq!(profile.map(|p| p.user_id), Some("u1".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_profile_missing_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/databases/test_db/collections/profiles/documents".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "total": 0, "documents": [] }).to_string())
            .create_async()
            .await;

        let client = client_for(&server.url());
        assert!(client.get_profile("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.fetch_profile("u1").await.unwrap_err();
        assert!(matches!(err, AppwriteError::Unauthorized));
    }

    #[tokio::test]
    async fn test_blocked_ids_both_directions() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/databases/test_db/collections/blocks/documents".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "total": 2,
                    "documents": [
                        { "blockerId": "me", "blockedId": "x" },
                        { "blockerId": "y", "blockedId": "me" }
                    ]
                })
                .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let blocked = client.blocked_ids("me").await.unwrap();

        // Both queries see both documents here; each side contributes the other party
        assert!(blocked.contains("x"));
        assert!(blocked.contains("y"));
        assert!(!blocked.contains("me"));
    }

    #[tokio::test]
    async fn test_candidate_query_splits_at_antimeridian() {
        let mut server = mockito::Server::new_async().await;
        let path = Matcher::Regex(r"^/databases/test_db/collections/profiles/documents".to_string());

        let mut east = profile_json("east");
        east["longitude"] = json!(179.95);
        let mut west = profile_json("west");
        west["longitude"] = json!(-179.95);

        let east_mock = server
            .mock("GET", path.clone())
            .match_query(Matcher::UrlEncoded(
                "queries[]".to_string(),
                "lessThanEqual(\"longitude\", 180)".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "total": 1, "documents": [east] }).to_string())
            .expect(1)
            .create_async()
            .await;
        let west_mock = server
            .mock("GET", path.clone())
            .match_query(Matcher::UrlEncoded(
                "queries[]".to_string(),
                "greaterThanEqual(\"longitude\", -180)".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "total": 1, "documents": [west] }).to_string())
            .expect(1)
            .create_async()
            .await;
        let unlocated_mock = server
            .mock("GET", path)
            .match_query(Matcher::UrlEncoded(
                "queries[]".to_string(),
                "isNull(\"latitude\")".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "total": 0, "documents": [] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let mut seeker = parse_profile(&profile_json("seeker")).unwrap();
        seeker.latitude = Some(-17.0);
        seeker.longitude = Some(179.9);

        let client = client_for(&server.url());
        let mut ids: Vec<String> = client
            .query_candidates(&seeker)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.user_id)
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["east".to_string(), "west".to_string()]);
        east_mock.assert_async().await;
        west_mock.assert_async().await;
        unlocated_mock.assert_async().await;
    }
}
