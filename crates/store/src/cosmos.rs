//! Cosmos DB catalog backend.
//!
//! Talks to the Cosmos SQL REST API directly with `reqwest`. Every request
//! carries a master-key auth token: an HMAC-SHA256 over the verb, resource
//! type, resource link, and RFC 1123 date, base64-encoded and then
//! percent-encoded into the `authorization` header. Documents use the book
//! `id` as both document id and partition key, so reads and writes are
//! single-partition point operations; only the list query fans out.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde_json::json;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::{fresh_id, Book, BookPatch, BookStore, NewBook, StoreError};

/// Cosmos REST API version used for all requests.
const COSMOS_API_VERSION: &str = "2018-12-31";

#[derive(Debug)]
pub struct CosmosBookStore {
    client: reqwest::Client,
    base_url: String,
    key_bytes: Vec<u8>,
    database: String,
    collection: String,
}

impl CosmosBookStore {
    /// Build a client and perform the startup handshake: a read of the
    /// target collection. Callers treat a failure here as fatal; the server
    /// must not accept requests against an unready store.
    pub async fn connect(
        endpoint: &str,
        master_key: &str,
        database: &str,
        collection: &str,
    ) -> Result<Self, StoreError> {
        if master_key.is_empty() {
            return Err(StoreError::Credential(
                "database master key is not configured".to_string(),
            ));
        }
        let key_bytes = BASE64_STANDARD
            .decode(master_key)
            .map_err(|e| StoreError::Credential(format!("master key is not valid base64: {e}")))?;

        let store = Self {
            client: reqwest::Client::new(),
            base_url: endpoint.trim_end_matches('/').to_string(),
            key_bytes,
            database: database.to_string(),
            collection: collection.to_string(),
        };

        let link = store.collection_link();
        let date = rfc1123_lower();
        let token = store.auth_token("get", "colls", &link, &date)?;

        let response = store
            .client
            .get(format!("{}/{}", store.base_url, link))
            .header("authorization", token)
            .header("x-ms-date", &date)
            .header("x-ms-version", COSMOS_API_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        tracing::info!(
            database = %store.database,
            collection = %store.collection,
            "document store handshake succeeded"
        );
        Ok(store)
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.collection)
    }

    fn document_link(&self, id: &str) -> String {
        format!("{}/docs/{}", self.collection_link(), id)
    }

    /// Master-key token for one request.
    ///
    /// String-to-sign (all lowercase, trailing double newline is part of the
    /// format):
    ///
    /// ```text
    /// {verb}\n{resource_type}\n{resource_link}\n{date}\n\n
    /// ```
    fn auth_token(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String, StoreError> {
        let string_to_sign = format!("{verb}\n{resource_type}\n{resource_link}\n{date}\n\n");

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(&self.key_bytes)
            .map_err(|e| StoreError::Credential(format!("HMAC key error: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        let token = format!("type=master&ver=1.0&sig={signature}");
        Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
    }

    fn partition_key_header(id: &str) -> String {
        format!("[{}]", serde_json::Value::String(id.to_string()))
    }

    async fn backend_error(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::Backend { status, body }
    }

    async fn read_document(&self, id: &str) -> Result<Book, StoreError> {
        let link = self.document_link(id);
        let date = rfc1123_lower();
        let token = self.auth_token("get", "docs", &link, &date)?;

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, link))
            .header("authorization", token)
            .header("x-ms-date", &date)
            .header("x-ms-version", COSMOS_API_VERSION)
            .header("x-ms-documentdb-partitionkey", Self::partition_key_header(id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn replace_document(&self, book: &Book) -> Result<Book, StoreError> {
        let link = self.document_link(&book.id);
        let date = rfc1123_lower();
        let token = self.auth_token("put", "docs", &link, &date)?;

        let response = self
            .client
            .put(format!("{}/{}", self.base_url, link))
            .header("authorization", token)
            .header("x-ms-date", &date)
            .header("x-ms-version", COSMOS_API_VERSION)
            .header(
                "x-ms-documentdb-partitionkey",
                Self::partition_key_header(&book.id),
            )
            .json(book)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(book.id.clone()));
        }
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait::async_trait]
impl BookStore for CosmosBookStore {
    async fn list_all(&self) -> Result<Vec<Book>, StoreError> {
        let link = self.collection_link();
        let date = rfc1123_lower();
        let token = self.auth_token("post", "docs", &link, &date)?;

        // RFC 3339 UTC timestamps sort lexicographically, so the string
        // ORDER BY matches creation order.
        let query = json!({
            "query": "SELECT * FROM c ORDER BY c.createdAt DESC",
            "parameters": []
        });

        let response = self
            .client
            .post(format!("{}/{}/docs", self.base_url, link))
            .header("authorization", token)
            .header("x-ms-date", &date)
            .header("x-ms-version", COSMOS_API_VERSION)
            .header("x-ms-documentdb-isquery", "True")
            .header("x-ms-documentdb-query-enablecrosspartition", "True")
            .header("content-type", "application/query+json")
            .body(query.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        #[derive(serde::Deserialize)]
        struct QueryResponse {
            #[serde(rename = "Documents", default)]
            documents: Vec<Book>,
        }

        let body = response.text().await?;
        let parsed: QueryResponse = serde_json::from_str(&body)?;
        Ok(parsed.documents)
    }

    async fn get(&self, id: &str) -> Result<Book, StoreError> {
        self.read_document(id).await
    }

    async fn create(&self, new: NewBook) -> Result<Book, StoreError> {
        let book = Book {
            id: fresh_id(),
            title: new.title,
            author: new.author,
            price: new.price,
            cover_blob: new.cover_blob,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };

        let link = self.collection_link();
        let date = rfc1123_lower();
        let token = self.auth_token("post", "docs", &link, &date)?;

        let response = self
            .client
            .post(format!("{}/{}/docs", self.base_url, link))
            .header("authorization", token)
            .header("x-ms-date", &date)
            .header("x-ms-version", COSMOS_API_VERSION)
            .header(
                "x-ms-documentdb-partitionkey",
                Self::partition_key_header(&book.id),
            )
            .json(&book)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn update(&self, id: &str, patch: BookPatch) -> Result<Book, StoreError> {
        // Read-modify-write keeps the merge policy in one place; the catalog
        // has no concurrent writers racing on a single record in practice.
        let mut book = self.read_document(id).await?;
        patch.apply(&mut book, OffsetDateTime::now_utc());
        self.replace_document(&book).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let link = self.document_link(id);
        let date = rfc1123_lower();
        let token = self.auth_token("delete", "docs", &link, &date)?;

        let response = self
            .client
            .delete(format!("{}/{}", self.base_url, link))
            .header("authorization", token)
            .header("x-ms-date", &date)
            .header("x-ms-version", COSMOS_API_VERSION)
            .header("x-ms-documentdb-partitionkey", Self::partition_key_header(id))
            .send()
            .await?;

        // Deleting a record that is already gone is a success.
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(Self::backend_error(response).await)
    }
}

/// Current UTC date in lowercase RFC 1123, as the auth scheme requires.
fn rfc1123_lower() -> String {
    httpdate::fmt_http_date(std::time::SystemTime::now()).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> CosmosBookStore {
        CosmosBookStore {
            client: reqwest::Client::new(),
            base_url: "https://example.documents.azure.com".to_string(),
            key_bytes: b"0123456789abcdef0123456789abcdef".to_vec(),
            database: "BookstoreDB".to_string(),
            collection: "Books".to_string(),
        }
    }

    #[test]
    fn resource_links_follow_rest_layout() {
        let store = test_store();
        assert_eq!(store.collection_link(), "dbs/BookstoreDB/colls/Books");
        assert_eq!(
            store.document_link("b-1"),
            "dbs/BookstoreDB/colls/Books/docs/b-1"
        );
    }

    #[test]
    fn auth_token_is_master_versioned_and_encoded() {
        let store = test_store();
        let token = store
            .auth_token("get", "docs", "dbs/x/colls/y/docs/z", "mon, 01 jan 2024 00:00:00 gmt")
            .unwrap();

        // "type=master&ver=1.0&sig=" with '=' and '&' percent-encoded.
        assert!(token.starts_with("type%3Dmaster%26ver%3D1.0%26sig%3D"), "{token}");
    }

    #[test]
    fn auth_token_depends_on_verb() {
        let store = test_store();
        let date = "mon, 01 jan 2024 00:00:00 gmt";
        let get = store.auth_token("get", "docs", "dbs/x", date).unwrap();
        let post = store.auth_token("post", "docs", "dbs/x", date).unwrap();
        assert_ne!(get, post);
    }

    #[test]
    fn partition_key_header_is_a_json_array() {
        assert_eq!(
            CosmosBookStore::partition_key_header("b-1"),
            "[\"b-1\"]"
        );
    }

    #[tokio::test]
    async fn connect_rejects_missing_key() {
        let err = CosmosBookStore::connect("https://example", "", "db", "coll")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Credential(_)));
    }

    #[tokio::test]
    async fn connect_rejects_non_base64_key() {
        let err = CosmosBookStore::connect("https://example", "not-base64!!", "db", "coll")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Credential(_)));
    }
}
