use serde::Deserialize;

use stacks_store::{BookPatch, NewBook};

/// Request body for `POST /books`. `title` and `author` are required but
/// modeled as options so the handler can reject their absence with a 400
/// instead of a generic body-rejection status.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub price: Option<f64>,
    pub cover_blob: Option<String>,
}

impl CreateBookRequest {
    /// Validate required fields; `Err` carries the offending field name.
    pub fn into_new_book(self) -> Result<NewBook, &'static str> {
        let title = match self.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => return Err("title"),
        };
        let author = match self.author {
            Some(author) if !author.trim().is_empty() => author,
            _ => return Err("author"),
        };

        Ok(NewBook {
            title,
            author,
            price: self.price,
            cover_blob: self.cover_blob,
        })
    }
}

/// Request body for `PUT /books/{id}`. Every field is optional; omitted
/// fields keep their stored values (see the store's merge policy).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub price: Option<f64>,
    pub cover_blob: Option<String>,
}

impl From<UpdateBookRequest> for BookPatch {
    fn from(request: UpdateBookRequest) -> Self {
        BookPatch {
            title: request.title,
            author: request.author,
            price: request.price,
            cover_blob: request.cover_blob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_title_and_author() {
        let request = CreateBookRequest {
            title: None,
            author: Some("B".to_string()),
            price: None,
            cover_blob: None,
        };
        assert_eq!(request.into_new_book().unwrap_err(), "title");

        let request = CreateBookRequest {
            title: Some("A".to_string()),
            author: Some("   ".to_string()),
            price: None,
            cover_blob: None,
        };
        assert_eq!(request.into_new_book().unwrap_err(), "author");
    }

    #[test]
    fn create_passes_optional_fields_through() {
        let request = CreateBookRequest {
            title: Some("A".to_string()),
            author: Some("B".to_string()),
            price: Some(9.99),
            cover_blob: Some("covers/1-a.png".to_string()),
        };

        let new_book = request.into_new_book().unwrap();
        assert_eq!(new_book.price, Some(9.99));
        assert_eq!(new_book.cover_blob.as_deref(), Some("covers/1-a.png"));
    }
}
