pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;

use stacks_http::error::AppError;
use stacks_kernel::{InitCtx, Module};
use stacks_store::{Book, BookStore, StoreError};

use models::{CreateBookRequest, UpdateBookRequest};

/// Catalog CRUD module. Holds the injected store handle; every handler is a
/// thin pass-through to it.
pub struct BooksModule {
    store: Arc<dyn BookStore>,
}

impl BooksModule {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/books", get(list_books).post(create_book))
            .route(
                "/books/{id}",
                get(get_book).put(update_book).delete(delete_book),
            )
            .with_state(self.store.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/books": {
                    "get": {
                        "summary": "List books, most recently created first",
                        "tags": ["Books"],
                        "responses": {
                            "200": {
                                "description": "List of books",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Book" }
                                        }
                                    }
                                }
                            },
                            "500": {
                                "description": "Internal server error",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Create a book",
                        "tags": ["Books"],
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/CreateBook" }
                                }
                            }
                        },
                        "responses": {
                            "201": {
                                "description": "Created book with generated id",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            },
                            "400": {
                                "description": "Missing title or author",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/books/{id}": {
                    "get": {
                        "summary": "Fetch one book",
                        "tags": ["Books"],
                        "parameters": [
                            { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                        ],
                        "responses": {
                            "200": {
                                "description": "The book",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            },
                            "404": {
                                "description": "Unknown id",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    },
                    "put": {
                        "summary": "Update a book (only provided fields change)",
                        "tags": ["Books"],
                        "parameters": [
                            { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                        ],
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/UpdateBook" }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Updated book",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            },
                            "404": {
                                "description": "Unknown id",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    },
                    "delete": {
                        "summary": "Delete a book (idempotent)",
                        "tags": ["Books"],
                        "parameters": [
                            { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                        ],
                        "responses": {
                            "200": {
                                "description": "Acknowledgment, whether or not the id existed"
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "price": { "type": "number" },
                            "coverBlob": { "type": "string" },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "title", "author", "createdAt"]
                    },
                    "CreateBook": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "price": { "type": "number" },
                            "coverBlob": { "type": "string" }
                        },
                        "required": ["title", "author"]
                    },
                    "UpdateBook": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "price": { "type": "number" },
                            "coverBlob": { "type": "string" }
                        }
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Map store failures to HTTP errors: a missing record is a 404, everything
/// else surfaces as a 500 with the upstream description.
fn store_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound(id) => AppError::not_found(format!("book {id} not found")),
        other => AppError::Upstream(anyhow::Error::new(other)),
    }
}

async fn list_books(
    State(store): State<Arc<dyn BookStore>>,
) -> Result<Json<Vec<Book>>, AppError> {
    let books = store.list_all().await.map_err(store_error)?;
    Ok(Json(books))
}

async fn get_book(
    State(store): State<Arc<dyn BookStore>>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    let book = store.get(&id).await.map_err(store_error)?;
    Ok(Json(book))
}

async fn create_book(
    State(store): State<Arc<dyn BookStore>>,
    Json(request): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let new_book = request
        .into_new_book()
        .map_err(|field| AppError::bad_request(format!("{field} is required")))?;

    let book = store.create(new_book).await.map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
    State(store): State<Arc<dyn BookStore>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateBookRequest>,
) -> Result<Json<Book>, AppError> {
    let book = store.update(&id, request.into()).await.map_err(store_error)?;
    Ok(Json(book))
}

async fn delete_book(
    State(store): State<Arc<dyn BookStore>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    store.delete(&id).await.map_err(store_error)?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}

/// Create a new instance of the books module with its store dependency.
pub fn create_module(store: Arc<dyn BookStore>) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(store))
}
