use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::task;

use crate::{
    core::model::{Book, BookId, Email, User, MAX_RATING},
    error::{Error, Result},
    infrastructure::CatalogStore,
};

pub trait CatalogQuery: Send + Sync {
    type Output: Send;

    fn execute<S>(&self, store: &S) -> impl Future<Output = Result<Self::Output>> + Send
    where
        S: CatalogStore;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
}

/// The conjunction of every active catalog predicate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookFilter {
    /// Substring of title, author or the encoded tags.
    pub search: Option<String>,
    pub category: Option<String>,
    /// Inclusive lower bound on the publish year.
    pub published_since: Option<i32>,
    pub availability: Option<Availability>,
    pub min_rating: Option<f64>,
}

impl BookFilter {
    /// Blank text filters count as absent.
    pub fn validate(self) -> Result<Self> {
        if let Some(rating) = self.min_rating {
            if !(0.0..=MAX_RATING).contains(&rating) {
                return Err(Error::validation(format!(
                    "minRating must be between 0 and {MAX_RATING}"
                )));
            }
        }

        Ok(Self {
            search: self.search.filter(|s| !s.is_empty()),
            category: self.category.filter(|c| !c.is_empty()),
            ..self
        })
    }

    pub fn is_unconstrained(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Title,
    Author,
    PublishYear,
    Rating,
    #[default]
    CreatedAt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ordering {
    pub key: SortKey,
    pub order: SortOrder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 12;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);

        if page < 1 {
            Err(Error::validation("page must be at least 1"))
        } else if !(1..=Self::MAX_LIMIT).contains(&limit) {
            Err(Error::validation(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )))
        } else {
            Ok(Self { page, limit })
        }
    }

    pub fn window(&self) -> PageWindow {
        PageWindow {
            limit: self.limit,
            offset: u64::from(self.page - 1) * u64::from(self.limit),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    fn new(request: PageRequest, total: u64) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages: total.div_ceil(u64::from(request.limit)),
        }
    }
}

#[derive(Debug)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Default)]
pub struct GetBooks {
    pub filter: BookFilter,
    pub ordering: Ordering,
    pub page: PageRequest,
}

impl CatalogQuery for GetBooks {
    type Output = BookPage;

    async fn execute<S>(&self, store: &S) -> Result<BookPage>
    where
        S: CatalogStore,
    {
        // The two reads are not a consistent snapshot, total may lag the page.
        let (records, total) = tokio::try_join!(
            store.find_books(&self.filter, self.ordering, self.page.window()),
            store.count_books(&self.filter),
        )?;

        let books = records
            .into_iter()
            .map(Book::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(BookPage {
            books,
            pagination: Pagination::new(self.page, total),
        })
    }
}

pub struct BookById(pub BookId);

impl CatalogQuery for BookById {
    type Output = Option<Book>;

    async fn execute<S>(&self, store: &S) -> Result<Option<Book>>
    where
        S: CatalogStore,
    {
        let Self(BookId(id)) = self;
        store.find_book(*id).await?.map(Book::try_from).transpose()
    }
}

pub struct AllCategories;

impl CatalogQuery for AllCategories {
    type Output = Vec<String>;

    async fn execute<S>(&self, store: &S) -> Result<Vec<String>>
    where
        S: CatalogStore,
    {
        store.categories().await
    }
}

pub struct EmailAvailability(pub String);

impl CatalogQuery for EmailAvailability {
    type Output = bool;

    async fn execute<S>(&self, store: &S) -> Result<bool>
    where
        S: CatalogStore,
    {
        let Self(email) = self;
        let email = email.parse::<Email>()?;
        Ok(store.find_user_by_email(email.as_str()).await?.is_none())
    }
}

/// Resolves to the user when the password matches the stored hash.
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl CatalogQuery for Credentials {
    type Output = Option<User>;

    async fn execute<S>(&self, store: &S) -> Result<Option<User>>
    where
        S: CatalogStore,
    {
        let Ok(email) = self.email.parse::<Email>() else {
            return Ok(None);
        };

        let Some(record) = store.find_user_by_email(email.as_str()).await? else {
            return Ok(None);
        };

        let password = self.password.clone();
        let hash = record.fields.password_hash.clone();
        let verified = task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;

        Ok(verified.then(|| record.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::model::{sample::sample_books, BookInfo},
        infrastructure::{persistence::SqliteCatalog, BookFields, UniqueId},
    };

    async fn seeded_catalog() -> SqliteCatalog {
        let catalog = SqliteCatalog::in_memory().await.expect("in-memory catalog");
        let mut books = sample_books();
        books.push(BookInfo {
            category: "文学".to_owned(),
            ..other_book("Dream of the Red Chamber", "9787020002207", 1791)
        });
        books.push(other_book("Snow Crash", "9780553380958", 1992));

        let batch = books
            .iter()
            .map(|info| (UniqueId::fresh(), info.to_fields().expect("encodable")))
            .collect();
        catalog.seed_books(batch).await.expect("seeded");
        catalog
    }

    fn other_book(title: &str, isbn: &str, publish_year: i32) -> BookInfo {
        let mut info = sample_books().remove(0);
        info.title = title.to_owned();
        info.author = "Anonymous".to_owned();
        info.tags = vec!["fiction".to_owned()].into();
        info.isbn = isbn.parse().expect("valid isbn");
        info.publish_year = publish_year;
        info.category = "Fiction".to_owned();
        info.rating = 3.0;
        info.available_copies = 0;
        info
    }

    fn with_filter(filter: BookFilter) -> GetBooks {
        GetBooks {
            filter,
            page: PageRequest::new(Some(1), Some(100)).expect("valid page"),
            ..GetBooks::default()
        }
    }

    #[test]
    fn page_request_bounds() {
        assert!(PageRequest::new(Some(0), None).is_err());
        assert!(PageRequest::new(None, Some(0)).is_err());
        assert!(PageRequest::new(None, Some(101)).is_err());
        assert_eq!(
            PageRequest::new(None, None).expect("defaults"),
            PageRequest::default()
        );
        assert_eq!(
            PageRequest::new(Some(3), Some(12))
                .expect("valid page")
                .window(),
            PageWindow {
                limit: 12,
                offset: 24
            }
        );
    }

    #[test]
    fn total_pages_round_up() {
        let request = PageRequest::new(Some(1), Some(12)).expect("valid page");
        assert_eq!(Pagination::new(request, 0).total_pages, 0);
        assert_eq!(Pagination::new(request, 12).total_pages, 1);
        assert_eq!(Pagination::new(request, 13).total_pages, 2);
    }

    #[test]
    fn blank_text_filters_are_dropped() {
        let filter = BookFilter {
            search: Some(String::new()),
            category: Some(String::new()),
            ..BookFilter::default()
        }
        .validate()
        .expect("valid filter");
        assert!(filter.is_unconstrained());

        let out_of_range = BookFilter {
            min_rating: Some(6.0),
            ..BookFilter::default()
        };
        assert!(matches!(out_of_range.validate(), Err(Error::Validation(..))));
    }

    #[tokio::test]
    async fn pages_never_exceed_the_limit() {
        let catalog = seeded_catalog().await;

        for limit in [1, 3, 5, 8, 12] {
            let query = GetBooks {
                page: PageRequest::new(Some(2), Some(limit)).expect("valid page"),
                ..GetBooks::default()
            };
            let BookPage { books, pagination } = query.execute(&catalog).await.expect("page");
            assert!(books.len() <= limit as usize);
            assert_eq!(pagination.total, 8);
            assert_eq!(pagination.total_pages, 8u64.div_ceil(u64::from(limit)));
        }
    }

    #[tokio::test]
    async fn distant_pages_are_empty() {
        let catalog = seeded_catalog().await;

        let query = GetBooks {
            page: PageRequest::new(Some(u32::MAX), Some(100)).expect("valid page"),
            ..GetBooks::default()
        };
        let BookPage { books, pagination } = query.execute(&catalog).await.expect("page");
        assert!(books.is_empty());
        assert_eq!(pagination.total, 8);
        assert_eq!(pagination.page, u32::MAX);
    }

    #[tokio::test]
    async fn undecodable_tags_fail_the_read() {
        let catalog = seeded_catalog().await;
        for (n, tags) in ["{}", "[1,2]"].into_iter().enumerate() {
            let id = UniqueId::fresh();
            let fields = BookFields {
                isbn: format!("broken-{n}"),
                tags: tags.to_owned(),
                ..sample_books()[0].to_fields().expect("encodable")
            };
            catalog.insert_book(id, fields).await.expect("valid JSON is stored");

            let by_id = BookById(BookId(id)).execute(&catalog).await;
            assert!(matches!(by_id, Err(Error::Json(..))), "{tags}");
        }

        let page = GetBooks::default().execute(&catalog).await;
        assert!(matches!(page, Err(Error::Json(..))));
    }

    #[tokio::test]
    async fn availability_filter() {
        let catalog = seeded_catalog().await;

        let available = with_filter(BookFilter {
            availability: Some(Availability::Available),
            ..BookFilter::default()
        })
        .execute(&catalog)
        .await
        .expect("page");
        assert_eq!(available.books.len(), 5);
        assert!(available.books.iter().all(|b| b.info.available_copies > 0));

        let unavailable = with_filter(BookFilter {
            availability: Some(Availability::Unavailable),
            ..BookFilter::default()
        })
        .execute(&catalog)
        .await
        .expect("page");
        assert_eq!(unavailable.books.len(), 3);
        assert!(unavailable
            .books
            .iter()
            .all(|b| b.info.available_copies == 0));
    }

    #[tokio::test]
    async fn rating_category_and_year_filters() {
        let catalog = seeded_catalog().await;

        let rated = with_filter(BookFilter {
            min_rating: Some(4.7),
            ..BookFilter::default()
        })
        .execute(&catalog)
        .await
        .expect("page");
        assert_eq!(rated.books.len(), 3);
        assert!(rated.books.iter().all(|b| b.info.rating >= 4.7));

        let computing = with_filter(BookFilter {
            category: Some("计算机科学".to_owned()),
            ..BookFilter::default()
        })
        .execute(&catalog)
        .await
        .expect("page");
        assert_eq!(computing.books.len(), 6);
        assert!(computing
            .books
            .iter()
            .all(|b| b.info.category == "计算机科学"));

        let recent = with_filter(BookFilter {
            published_since: Some(2020),
            ..BookFilter::default()
        })
        .execute(&catalog)
        .await
        .expect("page");
        let mut years = recent
            .books
            .iter()
            .map(|b| b.info.publish_year)
            .collect::<Vec<_>>();
        years.sort();
        assert_eq!(years, vec![2020, 2021, 2022]);
    }

    #[tokio::test]
    async fn search_spans_title_author_and_tags() {
        let catalog = seeded_catalog().await;
        let search = |text: &str| {
            with_filter(BookFilter {
                search: Some(text.to_owned()),
                ..BookFilter::default()
            })
        };

        let by_title = search("react").execute(&catalog).await.expect("page");
        assert_eq!(by_title.books.len(), 1);
        assert_eq!(by_title.books[0].info.title, "React技术揭秘");

        let by_author = search("cormen").execute(&catalog).await.expect("page");
        assert_eq!(by_author.books.len(), 1);

        // One hit through the title, one only through its tags.
        let by_tag = search("JavaScript").execute(&catalog).await.expect("page");
        assert_eq!(by_tag.books.len(), 2);

        let wildcard = search("%").execute(&catalog).await.expect("page");
        assert!(wildcard.books.is_empty());
    }

    #[tokio::test]
    async fn filters_are_conjunctive() {
        let catalog = seeded_catalog().await;
        let page = with_filter(BookFilter {
            category: Some("计算机科学".to_owned()),
            availability: Some(Availability::Available),
            published_since: Some(2020),
            ..BookFilter::default()
        })
        .execute(&catalog)
        .await
        .expect("page");

        let mut titles = page
            .books
            .iter()
            .map(|b| b.info.title.as_str())
            .collect::<Vec<_>>();
        titles.sort();
        assert_eq!(titles, vec!["JavaScript高级程序设计", "Node.js实战", "React技术揭秘"]);
    }

    #[tokio::test]
    async fn sorting_follows_key_and_order() {
        let catalog = seeded_catalog().await;
        let query = GetBooks {
            ordering: Ordering {
                key: SortKey::PublishYear,
                order: SortOrder::Asc,
            },
            page: PageRequest::new(Some(1), Some(3)).expect("valid page"),
            ..GetBooks::default()
        };
        let page = query.execute(&catalog).await.expect("page");
        let years = page
            .books
            .iter()
            .map(|b| b.info.publish_year)
            .collect::<Vec<_>>();
        assert_eq!(years, vec![1791, 1992, 2017]);

        let query = GetBooks {
            ordering: Ordering {
                key: SortKey::Rating,
                order: SortOrder::Desc,
            },
            page: PageRequest::new(Some(1), Some(1)).expect("valid page"),
            ..GetBooks::default()
        };
        let page = query.execute(&catalog).await.expect("page");
        assert_eq!(page.books[0].info.title, "算法导论");
    }

    #[tokio::test]
    async fn categories_are_distinct_and_sorted() {
        let catalog = seeded_catalog().await;
        let categories = AllCategories.execute(&catalog).await.expect("categories");
        assert_eq!(categories, vec!["Fiction", "文学", "计算机科学"]);
    }

    #[tokio::test]
    async fn unknown_book_is_none() {
        let catalog = seeded_catalog().await;
        let missing = BookById(BookId(UniqueId::fresh()))
            .execute(&catalog)
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let catalog = SqliteCatalog::in_memory().await.expect("in-memory catalog");
        let outcome = EmailAvailability("not-an-email".to_owned())
            .execute(&catalog)
            .await;
        assert!(matches!(outcome, Err(Error::Validation(..))));
        assert!(EmailAvailability("free@example.org".to_owned())
            .execute(&catalog)
            .await
            .expect("lookup"));
    }
}
