use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};
use uuid::Uuid;

use super::{domain, import::ImportSource};

#[derive(Subcommand)]
pub enum Command {
    /// List books, filtered, sorted and paged
    ListBooks(BookListArgs),
    ShowBook {
        id: Uuid,
    },
    Categories,
    AddBook(BookInfo),
    /// Install the sample books into an empty catalog
    Seed,
    Borrow {
        id: Uuid,
    },
    Return {
        id: Uuid,
    },
    Register(RegistrationInfo),
    CheckEmail {
        email: String,
    },
    Login(LoginInfo),
    /// Add every book of a CSV file, or of stdin when given `-`
    Import {
        source: ImportSource,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Availability {
    Available,
    Unavailable,
}

impl From<Availability> for domain::Availability {
    fn from(value: Availability) -> Self {
        match value {
            Availability::Available => Self::Available,
            Availability::Unavailable => Self::Unavailable,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortKey {
    Title,
    Author,
    PublishYear,
    Rating,
    CreatedAt,
}

impl From<SortKey> for domain::SortKey {
    fn from(value: SortKey) -> Self {
        match value {
            SortKey::Title => Self::Title,
            SortKey::Author => Self::Author,
            SortKey::PublishYear => Self::PublishYear,
            SortKey::Rating => Self::Rating,
            SortKey::CreatedAt => Self::CreatedAt,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl From<SortOrder> for domain::SortOrder {
    fn from(value: SortOrder) -> Self {
        match value {
            SortOrder::Asc => Self::Asc,
            SortOrder::Desc => Self::Desc,
        }
    }
}

#[derive(Args)]
pub struct BookListArgs {
    #[arg(long)]
    pub page: Option<u32>,

    #[arg(long)]
    pub limit: Option<u32>,

    #[arg(long, help = "Text to look for in titles, authors and tags")]
    pub search: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, help = "Only books published in or after this year")]
    pub publish_year: Option<i32>,

    #[arg(long, value_enum)]
    pub availability: Option<Availability>,

    #[arg(long)]
    pub min_rating: Option<f64>,

    #[arg(long, value_enum)]
    pub sort_by: Option<SortKey>,

    #[arg(long, value_enum)]
    pub sort_order: Option<SortOrder>,
}

impl From<BookListArgs> for domain::BookListQuery {
    fn from(args: BookListArgs) -> Self {
        Self {
            page: args.page,
            limit: args.limit,
            search: args.search,
            category: args.category,
            publish_year: args.publish_year,
            availability: args.availability.map(Into::into),
            min_rating: args.min_rating,
            sort_by: args.sort_by.map(Into::into),
            sort_order: args.sort_order.map(Into::into),
        }
    }
}

#[derive(Parser)]
pub struct BookInfo {
    #[arg(long, help = "Title of the book")]
    pub title: String,

    #[arg(long)]
    pub author: String,

    #[arg(long, help = "ISBN of the book")]
    pub isbn: String,

    #[arg(long)]
    pub category: String,

    #[arg(long)]
    pub publish_year: i32,

    #[arg(long)]
    pub publisher: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub cover_url: Option<String>,

    #[arg(long)]
    pub rating: Option<f64>,

    #[arg(long)]
    pub total_copies: Option<u32>,

    #[arg(long, help = "Defaults to the total number of copies")]
    pub available_copies: Option<u32>,

    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

impl From<BookInfo> for domain::NewBook {
    fn from(info: BookInfo) -> Self {
        Self {
            title: info.title,
            author: info.author,
            isbn: info.isbn,
            category: info.category,
            publish_year: info.publish_year,
            publisher: info.publisher,
            description: info.description,
            cover_url: info.cover_url,
            rating: info.rating,
            total_copies: info.total_copies,
            available_copies: info.available_copies,
            tags: info.tags,
        }
    }
}

#[derive(Parser)]
pub struct RegistrationInfo {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,

    #[arg(long)]
    pub confirm_password: String,
}

impl From<RegistrationInfo> for domain::Registration {
    fn from(info: RegistrationInfo) -> Self {
        Self {
            name: info.name,
            email: info.email,
            password: info.password,
            confirm_password: info.confirm_password,
        }
    }
}

#[derive(Parser)]
pub struct LoginInfo {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,
}

impl From<LoginInfo> for domain::Credentials {
    fn from(LoginInfo { email, password }: LoginInfo) -> Self {
        Self { email, password }
    }
}

#[derive(Tabled)]
struct BookRow {
    #[tabled(rename = "ID")]
    id: domain::BookId,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Author")]
    author: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Year")]
    year: i32,
    #[tabled(rename = "Rating")]
    rating: String,
    #[tabled(rename = "On shelf")]
    on_shelf: String,
}

impl From<&domain::Book> for BookRow {
    fn from(book: &domain::Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            category: book.category.clone(),
            year: book.publish_year,
            rating: format!("{:.1}", book.rating),
            on_shelf: format!("{}/{}", book.available_copies, book.total_copies),
        }
    }
}

pub struct BookList(pub domain::BookList);

impl fmt::Display for BookList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(domain::BookList { books, pagination }) = self;
        let mut table = Table::new(books.iter().map(BookRow::from));
        table
            .with(Style::rounded())
            .modify(Columns::new(4..), Alignment::right());

        writeln!(f, "{table}")?;
        write!(
            f,
            "Page {} of {} ({} books)",
            pagination.page, pagination.total_pages, pagination.total
        )
    }
}

pub struct Book(pub domain::Book);

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(book) = self;
        writeln!(f, "{} [{}]", book.title, book.isbn)?;
        writeln!(f, "{}, {} {}", book.author, book.publisher, book.publish_year)?;
        writeln!(f, "Category: {}", book.category)?;
        writeln!(f, "Rating: {:.1}", book.rating)?;
        writeln!(
            f,
            "On shelf: {} of {}",
            book.available_copies, book.total_copies
        )?;
        if !book.tags.is_empty() {
            writeln!(f, "Tags: {}", book.tags.join(", "))?;
        }
        if let Some(description) = &book.description {
            writeln!(f, "{description}")?;
        }
        write!(f, "[Book ID {}]", book.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn sample() -> domain::Book {
        domain::Book {
            id: domain::BookId(Uuid::nil()),
            title: "设计模式".to_owned(),
            author: "Erich Gamma".to_owned(),
            isbn: "978-7-111-21116-6".to_owned(),
            category: "计算机科学".to_owned(),
            publish_year: 2017,
            publisher: "机械工业出版社".to_owned(),
            description: None,
            cover_url: None,
            rating: 4.5,
            total_copies: 6,
            available_copies: 4,
            tags: vec!["设计模式".to_owned(), "软件工程".to_owned()],
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn book_list_shows_copies_and_page() {
        let list = BookList(domain::BookList {
            books: vec![sample()],
            pagination: domain::Pagination {
                page: 1,
                limit: 12,
                total: 1,
                total_pages: 1,
            },
        });

        let rendered = list.to_string();
        assert!(rendered.contains("4/6"));
        assert!(rendered.contains("Erich Gamma"));
        assert!(rendered.ends_with("Page 1 of 1 (1 books)"));
    }

    #[test]
    fn book_details_list_tags() {
        let rendered = Book(sample()).to_string();
        assert!(rendered.contains("Tags: 设计模式, 软件工程"));
        assert!(rendered.contains("On shelf: 4 of 6"));
    }

    #[test]
    fn list_arguments_become_a_query() {
        let query = domain::BookListQuery::from(BookListArgs {
            page: Some(2),
            limit: None,
            search: Some("rust".to_owned()),
            category: None,
            publish_year: None,
            availability: Some(Availability::Available),
            min_rating: None,
            sort_by: Some(SortKey::PublishYear),
            sort_order: None,
        });

        assert_eq!(query.page, Some(2));
        assert_eq!(query.availability, Some(domain::Availability::Available));
        assert_eq!(query.sort_by, Some(domain::SortKey::PublishYear));
    }
}
