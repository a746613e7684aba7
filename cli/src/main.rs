use anyhow::Result;
use clap::Parser;

use api_client::{model as domain, ApiClient};

pub mod import;
pub mod model;

#[derive(Parser)]
#[command(name = "bookshelf-cli")]
#[command(about = "Browse and manage a bookshelf catalog")]
struct CliArgs {
    #[arg(
        long,
        env = "BOOKSHELF_URL",
        default_value = "http://localhost:3000",
        help = "Base URL of the bookshelf API"
    )]
    base_url: String,

    #[command(subcommand)]
    command: model::Command,
}

struct BookshelfApi(ApiClient);

impl BookshelfApi {
    fn new(client: ApiClient) -> Self {
        Self(client)
    }

    async fn dispatch(&self, command: model::Command) -> Result<()> {
        let Self(client) = self;
        match command {
            model::Command::ListBooks(args) => {
                let list = client.get_books(&args.into()).await?;
                println!("{}", model::BookList(list));
            }
            model::Command::ShowBook { id } => {
                let book = client.get_book(domain::BookId(id)).await?;
                println!("{}", model::Book(book));
            }
            model::Command::Categories => {
                for category in client.get_categories().await? {
                    println!("{category}");
                }
            }
            model::Command::AddBook(info) => {
                let outcome = client.add_book(&info.into()).await?;
                println!("{} [Book ID {}]", outcome.message, outcome.book.id);
            }
            model::Command::Seed => {
                let outcome = client.seed_books().await?;
                println!("{}", outcome.message);
            }
            model::Command::Borrow { id } => {
                let outcome = client.borrow_book(domain::BookId(id)).await?;
                println!("{}", outcome.message);
            }
            model::Command::Return { id } => {
                let outcome = client.return_book(domain::BookId(id)).await?;
                println!("{}", outcome.message);
            }
            model::Command::Register(info) => {
                let outcome = client.register(&info.into()).await?;
                println!("{} [User ID {}]", outcome.message, outcome.user.id);
            }
            model::Command::CheckEmail { email } => {
                if client.check_email_availability(&email).await? {
                    println!("{email} is available");
                } else {
                    println!("{email} is already registered");
                }
            }
            model::Command::Login(info) => {
                let user = client.login(&info.into()).await?;
                println!("Signed in as {} <{}>", user.name, user.email);
            }
            model::Command::Import { source } => {
                println!("{}", import::from_source(client, source).await?);
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let client = ApiClient::new(&args.base_url);
    let api = BookshelfApi::new(client);
    api.dispatch(args.command).await
}
