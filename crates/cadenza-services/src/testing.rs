//! Test doubles shared by unit and integration tests.

use async_trait::async_trait;
use cadenza_core::models::SongDocument;
use cadenza_core::AppError;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::search::client::SearchIndex;

/// Recording in-memory search index.
#[derive(Default)]
pub struct InMemorySearchIndex {
    documents: Mutex<HashMap<String, SongDocument>>,
}

impl InMemorySearchIndex {
    pub fn documents(&self) -> HashMap<String, SongDocument> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn ensure_collection(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn upsert_song(&self, document: &SongDocument) -> Result<(), AppError> {
        self.documents
            .lock()
            .unwrap()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_song(&self, id: &str) -> Result<(), AppError> {
        // Absent documents are fine, mirroring the real client.
        self.documents.lock().unwrap().remove(id);
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SongDocument>, AppError> {
        let needle = query.to_lowercase();
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|d| {
                d.title.to_lowercase().contains(&needle)
                    || d.artist.to_lowercase().contains(&needle)
                    || d.album.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}
