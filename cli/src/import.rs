use anyhow::Result;
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    str::FromStr,
};

use api_client::{error::Error as ApiError, model as domain, ApiClient};

pub async fn from_source(api: &ApiClient, source: ImportSource) -> Result<ImportReport> {
    let rows = read_csv_data(source.make_reader()?)?;
    Importer { api }.import(rows).await
}

#[derive(Clone)]
pub enum ImportSource {
    StdIn,
    FilePath(PathBuf),
}

impl ImportSource {
    fn make_reader(&self) -> Result<Box<dyn BufRead>> {
        Ok(match self {
            ImportSource::StdIn => Box::new(BufReader::new(io::stdin())),
            ImportSource::FilePath(path) => Box::new(BufReader::new(File::open(path)?)),
        })
    }
}

impl FromStr for ImportSource {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(if s == "-" {
            ImportSource::StdIn
        } else {
            ImportSource::FilePath(PathBuf::from_str(s)?)
        })
    }
}

struct Importer<'a> {
    api: &'a ApiClient,
}

impl Importer<'_> {
    /// Rows the server refuses are reported; transport failures abort.
    async fn import(self, rows: Vec<DataRow>) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        for row in rows {
            let isbn = row.isbn.clone();
            match self.api.add_book(&row.into()).await {
                Ok(domain::BookOutcome { book, .. }) => report.added.push(book.title),
                Err(error) if error.is_conflict() => report.duplicates.push(isbn),
                Err(ApiError::Rejected { message, .. }) => report.rejected.push((isbn, message)),
                Err(error) => return Err(error.into()),
            }
        }

        Ok(report)
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    added: Vec<String>,
    duplicates: Vec<String>,
    rejected: Vec<(String, String)>,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for title in &self.added {
            writeln!(f, "added\t{title}")?;
        }
        for isbn in &self.duplicates {
            writeln!(f, "exists\t{isbn}")?;
        }
        for (isbn, reason) in &self.rejected {
            writeln!(f, "refused\t{isbn}: {reason}")?;
        }
        write!(
            f,
            "{} added, {} already present, {} refused",
            self.added.len(),
            self.duplicates.len(),
            self.rejected.len()
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct DataRow {
    title: String,
    author: String,
    isbn: String,
    category: String,
    publish_year: i32,
    publisher: String,
    total_copies: Option<u32>,
    #[serde(default)]
    tags: String,
}

impl From<DataRow> for domain::NewBook {
    fn from(row: DataRow) -> Self {
        Self {
            title: row.title,
            author: row.author,
            isbn: row.isbn,
            category: row.category,
            publish_year: row.publish_year,
            publisher: row.publisher,
            description: None,
            cover_url: None,
            rating: None,
            total_copies: row.total_copies,
            available_copies: None,
            tags: row
                .tags
                .split(';')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

fn read_csv_data<R>(reader: R) -> Result<Vec<DataRow>>
where
    R: BufRead,
{
    let mut data = vec![];
    let mut csv = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    for row in csv.deserialize() {
        data.push(row?);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
title,author,isbn,category,publish_year,publisher,total_copies,tags
The Rust Programming Language,Steve Klabnik,978-1-7185-0310-6,Programming,2023,No Starch Press,3,rust; systems
Dune, Frank Herbert ,978-0-441-17271-9,Fiction,1965,Chilton Books,,
";

    #[test]
    fn rows_are_read_and_trimmed() {
        let rows = read_csv_data(CSV.as_bytes()).expect("valid csv");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].author, "Frank Herbert");
        assert_eq!(rows[1].total_copies, None);
        assert_eq!(rows[0].total_copies, Some(3));
    }

    #[test]
    fn tags_split_on_semicolons() {
        let mut rows = read_csv_data(CSV.as_bytes()).expect("valid csv").into_iter();

        let rust = domain::NewBook::from(rows.next().expect("first row"));
        assert_eq!(rust.tags, ["rust", "systems"]);

        let dune = domain::NewBook::from(rows.next().expect("second row"));
        assert!(dune.tags.is_empty());
        assert_eq!(dune.publish_year, 1965);
    }

    #[test]
    fn bad_years_fail_the_file() {
        let csv = "title,author,isbn,category,publish_year,publisher,total_copies,tags\n\
                   A,B,1,C,nineteen,D,1,\n";
        assert!(read_csv_data(csv.as_bytes()).is_err());
    }

    #[test]
    fn dash_means_stdin() {
        assert!(matches!("-".parse::<ImportSource>(), Ok(ImportSource::StdIn)));
        assert!(matches!(
            "books.csv".parse::<ImportSource>(),
            Ok(ImportSource::FilePath(..))
        ));
    }

    #[test]
    fn report_summarises_every_row() {
        let report = ImportReport {
            added: vec!["Dune".to_owned()],
            duplicates: vec!["978-1-7185-0310-6".to_owned()],
            rejected: vec![("1".to_owned(), "publishYear must be between".to_owned())],
        };

        let rendered = report.to_string();
        assert!(rendered.contains("exists\t978-1-7185-0310-6"));
        assert!(rendered.ends_with("1 added, 1 already present, 1 refused"));
    }
}
