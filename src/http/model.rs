use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    core::model::{
        self as domain,
        query::{self, Availability, BookFilter, Ordering, PageRequest, SortKey, SortOrder},
    },
    error::Result,
};

/// Query string of `GET /books`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub publish_year: Option<i32>,
    pub availability: Option<Availability>,
    pub min_rating: Option<f64>,
    pub sort_by: Option<SortKey>,
    pub sort_order: Option<SortOrder>,
}

impl TryFrom<BookListParams> for query::GetBooks {
    type Error = crate::error::Error;

    fn try_from(params: BookListParams) -> Result<Self> {
        let filter = BookFilter {
            search: params.search,
            category: params.category,
            published_since: params.publish_year,
            availability: params.availability,
            min_rating: params.min_rating,
        }
        .validate()?;

        Ok(Self {
            filter,
            ordering: Ordering {
                key: params.sort_by.unwrap_or_default(),
                order: params.sort_order.unwrap_or_default(),
            },
            page: PageRequest::new(params.page, params.limit)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    id: Uuid,
    #[serde(flatten)]
    info: domain::BookInfo,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl From<domain::Book> for Book {
    fn from(
        domain::Book {
            id,
            info,
            created_at,
            updated_at,
        }: domain::Book,
    ) -> Self {
        Self {
            id: id.into(),
            info,
            created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    page: u32,
    limit: u32,
    total: u64,
    total_pages: u64,
}

impl From<query::Pagination> for Pagination {
    fn from(
        query::Pagination {
            page,
            limit,
            total,
            total_pages,
        }: query::Pagination,
    ) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookList {
    books: Vec<Book>,
    pagination: Pagination,
}

impl From<query::BookPage> for BookList {
    fn from(query::BookPage { books, pagination }: query::BookPage) -> Self {
        Self {
            books: books.into_iter().map(Book::from).collect(),
            pagination: pagination.into(),
        }
    }
}

/// Outcome of a command that changed one book.
#[derive(Debug, Serialize)]
pub struct BookOutcome {
    pub success: bool,
    pub message: String,
    pub book: Book,
}

#[derive(Debug, Serialize)]
pub struct SeedOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    id: Uuid,
    name: String,
    email: String,
}

impl From<domain::User> for UserSummary {
    fn from(user: domain::User) -> Self {
        Self {
            id: user.id.into(),
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationOutcome {
    pub success: bool,
    pub message: String,
    pub user: UserSummary,
}

#[derive(Debug, Deserialize)]
pub struct EmailParam {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct EmailAvailability {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginOutcome {
    pub user: domain::User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn list_params_default_to_the_first_page() {
        let request = query::GetBooks::try_from(BookListParams::default()).expect("valid");
        assert_eq!(request.page, PageRequest::default());
        assert_eq!(request.ordering.key, SortKey::CreatedAt);
        assert_eq!(request.ordering.order, SortOrder::Desc);
        assert!(request.filter.is_unconstrained());
    }

    #[test]
    fn list_params_reject_out_of_range_values() {
        let bad = [
            BookListParams {
                page: Some(0),
                ..Default::default()
            },
            BookListParams {
                limit: Some(101),
                ..Default::default()
            },
            BookListParams {
                min_rating: Some(5.5),
                ..Default::default()
            },
        ];

        for params in bad {
            assert!(matches!(
                query::GetBooks::try_from(params),
                Err(Error::Validation(..))
            ));
        }
    }

    #[test]
    fn book_is_flat_camel_case() {
        let info = domain::sample::sample_books().remove(0);
        let book = Book {
            id: Uuid::nil(),
            info,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&book).expect("serializable");
        assert_eq!(json["publishYear"], 2020);
        assert_eq!(json["availableCopies"], 3);
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert_eq!(
            json["tags"],
            serde_json::json!(["编程", "JavaScript", "前端开发"])
        );
    }
}
