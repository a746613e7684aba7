use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::OnceLock};
use time::OffsetDateTime;
use url::Url;

use crate::{
    error::{Error, Result},
    infrastructure::{BookFields, BookRecord, UniqueId, UserRecord},
};

pub mod query;
pub mod sample;

const TITLE_LENGTH: (usize, usize) = (1, 500);
const AUTHOR_LENGTH: (usize, usize) = (1, 255);
const ISBN_LENGTH: (usize, usize) = (1, 20);
const CATEGORY_LENGTH: (usize, usize) = (1, 100);
const PUBLISHER_LENGTH: (usize, usize) = (1, 255);
const EARLIEST_PUBLISH_YEAR: i64 = 1000;
pub const MAX_RATING: f64 = 5.0;

const USER_NAME_LENGTH: (usize, usize) = (2, 50);
const PASSWORD_LENGTH: (usize, usize) = (6, 100);

#[derive(Clone)]
pub enum Command {
    AddBook(BookSubmission),
    SeedBooks,
    BorrowBook(BookId),
    ReturnBook(BookId),
    RegisterUser(Registration),
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookId(pub UniqueId);

impl From<BookId> for uuid::Uuid {
    fn from(BookId(UniqueId(id)): BookId) -> Self {
        id
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(id) = self;
        write!(f, "{id}")
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserId(pub UniqueId);

impl From<UserId> for uuid::Uuid {
    fn from(UserId(UniqueId(id)): UserId) -> Self {
        id
    }
}

/// Ordered tag list. Kept as JSON text by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new(tags: Vec<String>) -> Self {
        Self(tags)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        if encoded.is_empty() {
            Ok(Self::default())
        } else {
            Ok(serde_json::from_str(encoded)?)
        }
    }
}

impl From<Vec<String>> for Tags {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    pub fn as_str(&self) -> &str {
        let Self(isbn) = self;
        isbn
    }
}

impl FromStr for Isbn {
    type Err = Error;

    fn from_str(isbn: &str) -> Result<Self> {
        Ok(Self(bounded("isbn", isbn, ISBN_LENGTH)?))
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn as_str(&self) -> &str {
        let Self(email) = self;
        email
    }
}

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("EMAIL_REGEX is valid"))
}

impl FromStr for Email {
    type Err = Error;

    fn from_str(email: &str) -> Result<Self> {
        if email_regex().is_match(email) {
            Ok(Self(email.to_owned()))
        } else {
            Err(Error::validation(format!(
                "{email} is not a valid email address"
            )))
        }
    }
}

fn is_web_url(text: &str) -> bool {
    Url::parse(text).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

fn bounded(field: &str, value: &str, (min, max): (usize, usize)) -> Result<String> {
    let length = value.chars().count();
    if length < min {
        if min == 1 {
            Err(Error::validation(format!("{field} must not be empty")))
        } else {
            Err(Error::validation(format!(
                "{field} must be at least {min} characters"
            )))
        }
    } else if length > max {
        Err(Error::validation(format!(
            "{field} must be at most {max} characters"
        )))
    } else {
        Ok(value.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInfo {
    pub title: String,
    pub author: String,
    pub isbn: Isbn,
    pub category: String,
    pub publish_year: i32,
    pub publisher: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub rating: f64,
    pub total_copies: u32,
    pub available_copies: u32,
    pub tags: Tags,
}

impl BookInfo {
    pub fn to_fields(&self) -> Result<BookFields> {
        Ok(BookFields {
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.as_str().to_owned(),
            category: self.category.clone(),
            publish_year: self.publish_year,
            publisher: self.publisher.clone(),
            description: self.description.clone(),
            cover_url: self.cover_url.clone(),
            rating: self.rating,
            total_copies: self.total_copies.into(),
            available_copies: self.available_copies.into(),
            tags: self.tags.encode()?,
        })
    }

    fn try_from_fields(fields: BookFields) -> Result<Self> {
        let copies = |count: i64| {
            u32::try_from(count)
                .map_err(|_| Error::Generic(format!("stored copy count {count} is out of range")))
        };

        Ok(Self {
            tags: Tags::decode(&fields.tags)?,
            total_copies: copies(fields.total_copies)?,
            available_copies: copies(fields.available_copies)?,
            title: fields.title,
            author: fields.author,
            isbn: Isbn(fields.isbn),
            category: fields.category,
            publish_year: fields.publish_year,
            publisher: fields.publisher,
            description: fields.description,
            cover_url: fields.cover_url,
            rating: fields.rating,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub info: BookInfo,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<BookRecord> for Book {
    type Error = Error;

    fn try_from(
        BookRecord {
            id,
            fields,
            created_at,
            updated_at,
        }: BookRecord,
    ) -> Result<Self> {
        Ok(Self {
            id: BookId(UniqueId(id)),
            info: BookInfo::try_from_fields(fields)?,
            created_at,
            updated_at,
        })
    }
}

fn default_total_copies() -> i64 {
    1
}

/// An unvalidated request to add a book.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSubmission {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub publish_year: i64,
    pub publisher: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default = "default_total_copies")]
    pub total_copies: i64,
    #[serde(default)]
    pub available_copies: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BookSubmission {
    pub fn validate(self, current_year: i32) -> Result<BookInfo> {
        let title = bounded("title", &self.title, TITLE_LENGTH)?;
        let author = bounded("author", &self.author, AUTHOR_LENGTH)?;
        let isbn = self.isbn.parse::<Isbn>()?;
        let category = bounded("category", &self.category, CATEGORY_LENGTH)?;
        let publisher = bounded("publisher", &self.publisher, PUBLISHER_LENGTH)?;

        if !(EARLIEST_PUBLISH_YEAR..=i64::from(current_year)).contains(&self.publish_year) {
            return Err(Error::validation(format!(
                "publishYear must be between {EARLIEST_PUBLISH_YEAR} and {current_year}"
            )));
        }

        if !(0.0..=MAX_RATING).contains(&self.rating) {
            return Err(Error::validation(format!(
                "rating must be between 0 and {MAX_RATING}"
            )));
        }

        if let Some(url) = &self.cover_url {
            if !is_web_url(url) {
                return Err(Error::validation(format!("{url} is not a valid cover URL")));
            }
        }

        let total_copies = u32::try_from(self.total_copies)
            .ok()
            .filter(|&copies| copies >= 1)
            .ok_or_else(|| Error::validation("totalCopies must be at least 1"))?;

        let available_copies = match self.available_copies {
            None => total_copies,
            Some(copies) => u32::try_from(copies)
                .map_err(|_| Error::validation("availableCopies must not be negative"))?,
        };

        if available_copies > total_copies {
            return Err(Error::validation(
                "availableCopies must not exceed totalCopies",
            ));
        }

        Ok(BookInfo {
            title,
            author,
            isbn,
            category,
            publish_year: self.publish_year as i32,
            publisher,
            description: self.description,
            cover_url: self.cover_url,
            rating: self.rating,
            total_copies,
            available_copies,
            tags: Tags(self.tags),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug)]
pub struct ValidRegistration {
    pub name: String,
    pub email: Email,
    pub password: String,
}

impl Registration {
    pub fn validate(self) -> Result<ValidRegistration> {
        let name = bounded("name", &self.name, USER_NAME_LENGTH)?;
        let email = self.email.parse::<Email>()?;
        let password = bounded("password", &self.password, PASSWORD_LENGTH)?;

        if password != self.confirm_password {
            return Err(Error::validation("The passwords do not match"));
        }

        Ok(ValidRegistration {
            name,
            email,
            password,
        })
    }
}

// Never carries the password hash.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<UserRecord> for User {
    fn from(
        UserRecord {
            id,
            fields,
            created_at,
        }: UserRecord,
    ) -> Self {
        Self {
            id: UserId(UniqueId(id)),
            name: fields.name,
            email: fields.email,
            image: fields.image,
            created_at,
        }
    }
}
