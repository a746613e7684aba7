use std::str::FromStr;

use sqlx::{
    query::QueryAs,
    sqlite::{
        SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
    },
    FromRow, QueryBuilder, Row, Sqlite,
};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    core::model::query::{Availability, BookFilter, Ordering, PageWindow, SortKey, SortOrder},
    error::{self, Error},
    infrastructure::{BookFields, BookRecord, CatalogStore, UniqueId, UserFields, UserRecord},
};

const SCHEMA: [&str; 4] = [
    r#"
CREATE TABLE IF NOT EXISTS books (
    id TEXT NOT NULL PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    isbn TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    publish_year INTEGER NOT NULL,
    publisher TEXT NOT NULL,
    description TEXT,
    cover_url TEXT,
    rating REAL NOT NULL DEFAULT 0 CHECK (rating >= 0 AND rating <= 5),
    total_copies INTEGER NOT NULL DEFAULT 1 CHECK (total_copies >= 1),
    available_copies INTEGER NOT NULL
        CHECK (available_copies >= 0 AND available_copies <= total_copies),
    tags TEXT NOT NULL DEFAULT '[]' CHECK (json_valid(tags)),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS books_category ON books (category)",
    "CREATE INDEX IF NOT EXISTS books_created_at ON books (created_at)",
    r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT NOT NULL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    image TEXT,
    created_at INTEGER NOT NULL
)"#,
];

const INSERT_BOOK: &str = r#"
INSERT INTO books (
    id, title, author, isbn, category, publish_year, publisher, description,
    cover_url, rating, total_copies, available_copies, tags, created_at, updated_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
RETURNING *"#;

const TAKE_COPY: &str = r#"
UPDATE books
SET available_copies = available_copies - 1, updated_at = ?
WHERE id = ? AND available_copies > 0
RETURNING *"#;

const RESTORE_COPY: &str = r#"
UPDATE books
SET available_copies = available_copies + 1, updated_at = ?
WHERE id = ? AND available_copies < total_copies
RETURNING *"#;

#[derive(FromRow)]
struct BookRow {
    id: String,
    title: String,
    author: String,
    isbn: String,
    category: String,
    publish_year: i32,
    publisher: String,
    description: Option<String>,
    cover_url: Option<String>,
    rating: f64,
    total_copies: i64,
    available_copies: i64,
    tags: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<BookRow> for BookRecord {
    type Error = Error;

    fn try_from(row: BookRow) -> error::Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            created_at: from_nanos(row.created_at)?,
            updated_at: from_nanos(row.updated_at)?,
            fields: BookFields {
                title: row.title,
                author: row.author,
                isbn: row.isbn,
                category: row.category,
                publish_year: row.publish_year,
                publisher: row.publisher,
                description: row.description,
                cover_url: row.cover_url,
                rating: row.rating,
                total_copies: row.total_copies,
                available_copies: row.available_copies,
                tags: row.tags,
            },
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password: String,
    image: Option<String>,
    created_at: i64,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = Error;

    fn try_from(row: UserRow) -> error::Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            created_at: from_nanos(row.created_at)?,
            fields: UserFields {
                name: row.name,
                email: row.email,
                password_hash: row.password,
                image: row.image,
            },
        })
    }
}

// Integer nanoseconds keep created_at ordering exact.
fn from_nanos(nanos: i64) -> error::Result<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(nanos.into())?)
}

fn now_nanos() -> error::Result<i64> {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos).map_err(|_| Error::Generic(format!("timestamp {nanos} out of range")))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|error| error.is_unique_violation())
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn sort_column(key: SortKey) -> &'static str {
    match key {
        SortKey::Title => "title",
        SortKey::Author => "author",
        SortKey::PublishYear => "publish_year",
        SortKey::Rating => "rating",
        SortKey::CreatedAt => "created_at",
    }
}

fn push_predicates(builder: &mut QueryBuilder<'_, Sqlite>, filter: &BookFilter) {
    if filter.is_unconstrained() {
        return;
    }

    builder.push(" WHERE ");
    let mut predicates = builder.separated(" AND ");

    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        predicates.push("(title LIKE ");
        predicates.push_bind_unseparated(pattern.clone());
        predicates.push_unseparated(" ESCAPE '\\' OR author LIKE ");
        predicates.push_bind_unseparated(pattern.clone());
        predicates.push_unseparated(" ESCAPE '\\' OR tags LIKE ");
        predicates.push_bind_unseparated(pattern);
        predicates.push_unseparated(" ESCAPE '\\')");
    }

    if let Some(category) = &filter.category {
        predicates.push("category = ");
        predicates.push_bind_unseparated(category.clone());
    }

    if let Some(year) = filter.published_since {
        predicates.push("publish_year >= ");
        predicates.push_bind_unseparated(year);
    }

    match filter.availability {
        Some(Availability::Available) => {
            predicates.push("available_copies > 0");
        }
        Some(Availability::Unavailable) => {
            predicates.push("available_copies = 0");
        }
        None => (),
    }

    if let Some(rating) = filter.min_rating {
        predicates.push("rating >= ");
        predicates.push_bind_unseparated(rating);
    }
}

fn insert_book_query<'q>(
    id: UniqueId,
    book: BookFields,
    now: i64,
) -> QueryAs<'q, Sqlite, BookRow, SqliteArguments<'q>> {
    sqlx::query_as(INSERT_BOOK)
        .bind(id.to_string())
        .bind(book.title)
        .bind(book.author)
        .bind(book.isbn)
        .bind(book.category)
        .bind(book.publish_year)
        .bind(book.publisher)
        .bind(book.description)
        .bind(book.cover_url)
        .bind(book.rating)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.tags)
        .bind(now)
        .bind(now)
}

async fn fill_empty_catalog(
    connection: &mut SqliteConnection,
    books: Vec<(UniqueId, BookFields)>,
) -> error::Result<Option<usize>> {
    let populated: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books)")
        .fetch_one(&mut *connection)
        .await?;

    if populated {
        return Ok(None);
    }

    let count = books.len();
    let now = now_nanos()?;
    for (id, book) in books {
        match insert_book_query(id, book, now)
            .fetch_one(&mut *connection)
            .await
        {
            // A seed book already stored under its ISBN.
            Err(error) if is_unique_violation(&error) => return Ok(None),
            outcome => {
                outcome?;
            }
        }
    }

    Ok(Some(count))
}

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub async fn connect(database_url: &str, max_connections: u32) -> error::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(database_url, max_connections, "Connected to catalog database");
        Self::try_open(pool).await
    }

    /// A private database that lives as long as the pool's single connection.
    pub async fn in_memory() -> error::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::try_open(pool).await
    }

    async fn try_open(pool: SqlitePool) -> error::Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    async fn adjust_copies(&self, statement: &str, id: UniqueId) -> error::Result<Option<BookRecord>> {
        sqlx::query_as::<_, BookRow>(statement)
            .bind(now_nanos()?)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(BookRecord::try_from)
            .transpose()
    }
}

impl CatalogStore for SqliteCatalog {
    async fn find_books(
        &self,
        filter: &BookFilter,
        Ordering { key, order }: Ordering,
        PageWindow { limit, offset }: PageWindow,
    ) -> error::Result<Vec<BookRecord>> {
        let offset = i64::try_from(offset)
            .map_err(|_| Error::Generic(format!("page offset {offset} out of range")))?;

        let mut builder = QueryBuilder::new("SELECT * FROM books");
        push_predicates(&mut builder, filter);

        builder
            .push(" ORDER BY ")
            .push(sort_column(key))
            .push(match order {
                SortOrder::Asc => " ASC",
                SortOrder::Desc => " DESC",
            })
            .push(", id ASC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(offset);

        debug!(sql = builder.sql(), "Fetching a page of books");

        builder
            .build_query_as::<BookRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(BookRecord::try_from)
            .collect()
    }

    async fn count_books(&self, filter: &BookFilter) -> error::Result<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM books");
        push_predicates(&mut builder, filter);

        let count: i64 = builder.build().fetch_one(&self.pool).await?.try_get(0)?;
        Ok(count.unsigned_abs())
    }

    async fn find_book(&self, id: UniqueId) -> error::Result<Option<BookRecord>> {
        sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(BookRecord::try_from)
            .transpose()
    }

    async fn categories(&self) -> error::Result<Vec<String>> {
        Ok(
            sqlx::query_scalar("SELECT category FROM books GROUP BY category ORDER BY category")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn insert_book(&self, id: UniqueId, book: BookFields) -> error::Result<BookRecord> {
        let isbn = book.isbn.clone();
        let row = insert_book_query(id, book, now_nanos()?)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    Error::Conflict(format!("A book with ISBN {isbn} already exists"))
                } else {
                    error.into()
                }
            })?;

        row.try_into()
    }

    async fn seed_books(&self, books: Vec<(UniqueId, BookFields)>) -> error::Result<Option<usize>> {
        let mut connection = self.pool.acquire().await?;

        // IMMEDIATE takes the write lock before the emptiness check, so a
        // concurrent seeder waits here instead of failing to upgrade.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *connection)
            .await?;

        let outcome = fill_empty_catalog(&mut connection, books).await;
        let finish = match outcome {
            Ok(Some(_)) => "COMMIT",
            _ => "ROLLBACK",
        };

        if let Err(error) = sqlx::query(finish).execute(&mut *connection).await {
            // Never hand a connection with an open transaction back to the pool.
            drop(connection.detach());
            return Err(error.into());
        }

        outcome
    }

    async fn take_copy(&self, id: UniqueId) -> error::Result<Option<BookRecord>> {
        self.adjust_copies(TAKE_COPY, id).await
    }

    async fn restore_copy(&self, id: UniqueId) -> error::Result<Option<BookRecord>> {
        self.adjust_copies(RESTORE_COPY, id).await
    }

    async fn insert_user(&self, id: UniqueId, user: UserFields) -> error::Result<UserRecord> {
        let email = user.email.clone();
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (id, name, email, password, image, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(id.to_string())
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.image)
        .bind(now_nanos()?)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                Error::Conflict(format!("{email} is already registered"))
            } else {
                error.into()
            }
        })?;

        row.try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> error::Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(isbn: &str) -> BookFields {
        BookFields {
            title: "Structure and Interpretation of Computer Programs".to_owned(),
            author: "Harold Abelson".to_owned(),
            isbn: isbn.to_owned(),
            category: "Computer Science".to_owned(),
            publish_year: 1996,
            publisher: "MIT Press".to_owned(),
            description: None,
            cover_url: None,
            rating: 4.7,
            total_copies: 2,
            available_copies: 1,
            tags: r#"["lisp","classic"]"#.to_owned(),
        }
    }

    async fn count_all(catalog: &SqliteCatalog) -> u64 {
        catalog
            .count_books(&BookFilter::default())
            .await
            .expect("count")
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn inserted_book_reads_back() -> error::Result<()> {
        let catalog = SqliteCatalog::in_memory().await?;
        let id = UniqueId::fresh();

        let inserted = catalog.insert_book(id, fields("0-262-51087-1")).await?;
        assert_eq!(inserted.id, *id.uuid());
        assert_eq!(inserted.created_at, inserted.updated_at);

        let found = catalog.find_book(id).await?.expect("stored book");
        assert_eq!(found, inserted);
        assert_eq!(found.fields.tags, r#"["lisp","classic"]"#);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_isbn_is_a_conflict() -> error::Result<()> {
        let catalog = SqliteCatalog::in_memory().await?;
        catalog
            .insert_book(UniqueId::fresh(), fields("0-262-51087-1"))
            .await?;

        let duplicate = catalog
            .insert_book(UniqueId::fresh(), fields("0-262-51087-1"))
            .await;
        assert!(matches!(duplicate, Err(Error::Conflict(..))));
        assert_eq!(count_all(&catalog).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn storage_rejects_broken_rows() -> error::Result<()> {
        let catalog = SqliteCatalog::in_memory().await?;

        let malformed_tags = BookFields {
            tags: "not json".to_owned(),
            ..fields("1")
        };
        let overfull = BookFields {
            available_copies: 3,
            ..fields("2")
        };

        for book in [malformed_tags, overfull] {
            let outcome = catalog.insert_book(UniqueId::fresh(), book).await;
            assert!(matches!(outcome, Err(Error::Database(..))));
        }
        assert_eq!(count_all(&catalog).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn seeding_only_fills_an_empty_catalog() -> error::Result<()> {
        let catalog = SqliteCatalog::in_memory().await?;
        let batch = |prefix: &str| {
            (0..3)
                .map(|n| (UniqueId::fresh(), fields(&format!("{prefix}-{n}"))))
                .collect::<Vec<_>>()
        };

        assert_eq!(catalog.seed_books(batch("a")).await?, Some(3));
        assert_eq!(catalog.seed_books(batch("b")).await?, None);
        assert_eq!(count_all(&catalog).await, 3);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_seeders_fill_the_catalog_once() -> error::Result<()> {
        for round in 0..10 {
            let path = std::env::temp_dir().join(format!("bookshelf-seed-{}.db", Uuid::new_v4()));
            let catalog = SqliteCatalog::connect(&format!("sqlite://{}", path.display()), 5).await?;
            let batch = |prefix: &str| {
                (0..3)
                    .map(|n| (UniqueId::fresh(), fields(&format!("{prefix}-{round}-{n}"))))
                    .collect::<Vec<_>>()
            };

            let (a, b) = tokio::join!(
                catalog.seed_books(batch("a")),
                catalog.seed_books(batch("b"))
            );
            let mut outcomes = [a?, b?];
            outcomes.sort();
            assert_eq!(outcomes, [None, Some(3)]);
            assert_eq!(count_all(&catalog).await, 3);

            catalog.pool.close().await;
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn copies_stay_within_bounds() -> error::Result<()> {
        let catalog = SqliteCatalog::in_memory().await?;
        let id = UniqueId::fresh();
        catalog.insert_book(id, fields("0-262-51087-1")).await?;

        let taken = catalog.take_copy(id).await?.expect("one copy available");
        assert_eq!(taken.fields.available_copies, 0);
        assert!(catalog.take_copy(id).await?.is_none());

        catalog.restore_copy(id).await?.expect("one copy out");
        let restored = catalog.restore_copy(id).await?.expect("one copy out");
        assert_eq!(restored.fields.available_copies, 2);
        assert!(catalog.restore_copy(id).await?.is_none());

        assert!(catalog.take_copy(UniqueId::fresh()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() -> error::Result<()> {
        let catalog = SqliteCatalog::in_memory().await?;
        let user = UserFields {
            name: "Grace".to_owned(),
            email: "grace@example.org".to_owned(),
            password_hash: "$2b$04$abcdefghijklmnopqrstuv".to_owned(),
            image: None,
        };

        catalog.insert_user(UniqueId::fresh(), user.clone()).await?;
        let duplicate = catalog.insert_user(UniqueId::fresh(), user).await;
        assert!(matches!(duplicate, Err(Error::Conflict(..))));

        let found = catalog
            .find_user_by_email("grace@example.org")
            .await?
            .expect("stored user");
        assert_eq!(found.fields.name, "Grace");
        assert!(catalog
            .find_user_by_email("nobody@example.org")
            .await?
            .is_none());
        Ok(())
    }
}
