use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stacks_blob::BlobClient;
use stacks_http::error::AppError;
use stacks_kernel::{InitCtx, Module};

/// Cover image module: hands out signed upload and read URLs so clients
/// exchange image bytes with the storage service directly.
pub struct CoversModule {
    blob: Arc<BlobClient>,
}

impl CoversModule {
    pub fn new(blob: Arc<BlobClient>) -> Self {
        Self { blob }
    }
}

#[async_trait]
impl Module for CoversModule {
    fn name(&self) -> &'static str {
        "covers"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        // Container bootstrap is not fatal: catalog reads and writes work
        // without it, and signed-URL requests will surface the failure.
        if let Err(err) = self.blob.ensure_container().await {
            tracing::warn!(
                container = self.blob.container(),
                error = %err,
                "storage container bootstrap failed; signed-URL requests may fail"
            );
        }
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/generate-sas", post(generate_sas))
            .route("/cover-url", get(cover_url))
            .with_state(self.blob.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/generate-sas": {
                    "post": {
                        "summary": "Issue a signed upload URL for a cover image",
                        "tags": ["Covers"],
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "filename": { "type": "string" }
                                        },
                                        "required": ["filename"]
                                    }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Signed upload URL, valid five minutes",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/SignedUpload" }
                                    }
                                }
                            },
                            "400": {
                                "description": "Missing filename",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/cover-url": {
                    "get": {
                        "summary": "Redirect to a signed read URL for a cover blob",
                        "tags": ["Covers"],
                        "parameters": [
                            { "name": "blob", "in": "query", "required": true, "schema": { "type": "string" } }
                        ],
                        "responses": {
                            "307": { "description": "Redirect to the signed read URL" },
                            "400": {
                                "description": "Missing blob parameter",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "SignedUpload": {
                        "type": "object",
                        "properties": {
                            "url": { "type": "string" },
                            "blobName": { "type": "string" }
                        },
                        "required": ["url", "blobName"]
                    }
                }
            }
        }))
    }
}

/// Request body for `POST /generate-sas`. Optional so a missing field maps
/// to a 400 instead of a body-rejection status.
#[derive(Debug, Deserialize)]
struct GenerateSasRequest {
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateSasResponse {
    url: String,
    blob_name: String,
}

#[derive(Debug, Deserialize)]
struct CoverUrlQuery {
    blob: Option<String>,
}

async fn generate_sas(
    State(blob): State<Arc<BlobClient>>,
    Json(request): Json<GenerateSasRequest>,
) -> Result<Json<GenerateSasResponse>, AppError> {
    let filename = request
        .filename
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::bad_request("filename is required"))?;

    let signed = blob
        .issue_upload_url(&filename)
        .map_err(|err| AppError::Upstream(anyhow::Error::new(err)))?;

    Ok(Json(GenerateSasResponse {
        url: signed.url,
        blob_name: signed.blob_name,
    }))
}

async fn cover_url(
    State(blob): State<Arc<BlobClient>>,
    Query(query): Query<CoverUrlQuery>,
) -> Result<Redirect, AppError> {
    let blob_name = query
        .blob
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::bad_request("blob query parameter is required"))?;

    let signed = blob
        .issue_read_url(&blob_name)
        .map_err(|err| AppError::Upstream(anyhow::Error::new(err)))?;

    // The client's image loader follows this transparently.
    Ok(Redirect::temporary(&signed.url))
}

/// Create a new instance of the covers module with its storage dependency.
pub fn create_module(blob: Arc<BlobClient>) -> Arc<dyn Module> {
    Arc::new(CoversModule::new(blob))
}
