//! Search engine client (Typesense).

use async_trait::async_trait;
use cadenza_core::models::SongDocument;
use cadenza_core::AppError;
use serde::Deserialize;
use serde_json::json;

/// Narrow interface over the search collaborator. Upserts are
/// create-or-replace and deletes tolerate absent documents, so both are
/// safe under event redelivery.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the collection schema if it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), AppError>;

    async fn upsert_song(&self, document: &SongDocument) -> Result<(), AppError>;

    /// Delete by song id; deleting an absent document is success.
    async fn delete_song(&self, id: &str) -> Result<(), AppError>;

    async fn search(&self, query: &str) -> Result<Vec<SongDocument>, AppError>;
}

pub struct TypesenseSearchIndex {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    collection: String,
}

impl TypesenseSearchIndex {
    pub fn new(base_url: String, api_key: String, collection: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            collection,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("X-TYPESENSE-API-KEY", &self.api_key)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    document: SongDocument,
}

#[async_trait]
impl SearchIndex for TypesenseSearchIndex {
    async fn ensure_collection(&self) -> Result<(), AppError> {
        let existing = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}", self.collection),
            )
            .send()
            .await
            .map_err(|e| AppError::Search(e.to_string()))?;

        if existing.status().is_success() {
            return Ok(());
        }
        if existing.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::Search(format!(
                "Collection lookup failed: {}",
                existing.status()
            )));
        }

        let schema = json!({
            "name": self.collection,
            "fields": [
                { "name": "id", "type": "string" },
                { "name": "title", "type": "string", "facet": true },
                { "name": "artist", "type": "string", "facet": true },
                { "name": "album", "type": "string", "facet": true },
                { "name": "cover_url", "type": "string" },
                { "name": "url", "type": "string" }
            ]
        });

        let created = self
            .request(reqwest::Method::POST, "/collections")
            .json(&schema)
            .send()
            .await
            .map_err(|e| AppError::Search(e.to_string()))?;

        // A concurrent create is fine.
        if created.status().is_success() || created.status() == reqwest::StatusCode::CONFLICT {
            tracing::info!(collection = %self.collection, "Search collection ready");
            Ok(())
        } else {
            Err(AppError::Search(format!(
                "Collection create failed: {}",
                created.status()
            )))
        }
    }

    async fn upsert_song(&self, document: &SongDocument) -> Result<(), AppError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/documents?action=upsert", self.collection),
            )
            .json(document)
            .send()
            .await
            .map_err(|e| AppError::Search(e.to_string()))?;

        if response.status().is_success() {
            tracing::debug!(song_id = %document.id, "Search document upserted");
            Ok(())
        } else {
            Err(AppError::Search(format!(
                "Upsert of {} failed: {}",
                document.id,
                response.status()
            )))
        }
    }

    async fn delete_song(&self, id: &str) -> Result<(), AppError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/collections/{}/documents/{}", self.collection, id),
            )
            .send()
            .await
            .map_err(|e| AppError::Search(e.to_string()))?;

        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(AppError::Search(format!(
                "Delete of {} failed: {}",
                id,
                response.status()
            )))
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SongDocument>, AppError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}/documents/search", self.collection),
            )
            .query(&[("q", query), ("query_by", "title,artist,album")])
            .send()
            .await
            .map_err(|e| AppError::Search(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Search(format!(
                "Search failed: {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Search(e.to_string()))?;
        Ok(body.hits.into_iter().map(|h| h.document).collect())
    }
}
