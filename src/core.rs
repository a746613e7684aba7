use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    infrastructure::{BookRecord, CatalogStore, UniqueId, UserFields},
};
use model::{query, sample, Book, BookId, Command, Registration, User};

pub mod model;

pub const DEFAULT_PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

#[derive(Debug)]
pub enum CommandReceipt {
    BookAdded(Book),
    Seeded(usize),
    AlreadySeeded,
    CopiesChanged(Book),
    UserRegistered(User),
}

struct CommandDispatcher<S> {
    store: Arc<S>,
    password_cost: u32,
}

impl<S> CommandDispatcher<S>
where
    S: CatalogStore,
{
    fn new(store: Arc<S>, password_cost: u32) -> Self {
        Self {
            store,
            password_cost,
        }
    }

    async fn accept(&self, command: Command) -> Result<CommandReceipt> {
        match command {
            Command::AddBook(submission) => {
                let info = submission.validate(OffsetDateTime::now_utc().year())?;
                let id = BookId(UniqueId::fresh());
                let record = self.store.insert_book(id.0, info.to_fields()?).await?;
                info!(%id, isbn = %info.isbn, "Added book");
                Ok(CommandReceipt::BookAdded(record.try_into()?))
            }
            Command::SeedBooks => {
                let batch = sample::sample_books()
                    .iter()
                    .map(|info| Ok((UniqueId::fresh(), info.to_fields()?)))
                    .collect::<Result<Vec<_>>>()?;

                Ok(match self.store.seed_books(batch).await? {
                    Some(count) => {
                        info!(count, "Seeded the catalog");
                        CommandReceipt::Seeded(count)
                    }
                    None => CommandReceipt::AlreadySeeded,
                })
            }
            Command::BorrowBook(id) => {
                let updated = self.store.take_copy(id.0).await?;
                self.copies_changed(id, updated, "No copy is available to borrow")
                    .await
            }
            Command::ReturnBook(id) => {
                let updated = self.store.restore_copy(id.0).await?;
                self.copies_changed(id, updated, "Every copy is already on the shelf")
                    .await
            }
            Command::RegisterUser(registration) => self.register(registration).await,
        }
    }

    // A refused adjustment is a conflict only if the book is there at all.
    async fn copies_changed(
        &self,
        id: BookId,
        updated: Option<BookRecord>,
        refusal: &str,
    ) -> Result<CommandReceipt> {
        match updated {
            Some(record) => Ok(CommandReceipt::CopiesChanged(record.try_into()?)),
            None if self.store.find_book(id.0).await?.is_some() => {
                Err(Error::Conflict(refusal.to_owned()))
            }
            None => Err(Error::NotFound(format!("Book {id} does not exist"))),
        }
    }

    async fn register(&self, registration: Registration) -> Result<CommandReceipt> {
        let registration = registration.validate()?;

        let cost = self.password_cost;
        let password = registration.password;
        let password_hash = task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;

        let record = self
            .store
            .insert_user(
                UniqueId::fresh(),
                UserFields {
                    name: registration.name,
                    email: registration.email.as_str().to_owned(),
                    password_hash,
                    image: None,
                },
            )
            .await?;

        debug!(id = %record.id, "Registered user");
        Ok(CommandReceipt::UserRegistered(record.into()))
    }
}

struct QueryHandler<S> {
    store: Arc<S>,
}

impl<S> QueryHandler<S>
where
    S: CatalogStore,
{
    fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn issue<Q>(&self, query: Q) -> Result<Q::Output>
    where
        Q: query::CatalogQuery,
    {
        query.execute(self.store.as_ref()).await
    }
}

pub struct Application<S> {
    command_dispatcher: CommandDispatcher<S>,
    query_handler: QueryHandler<S>,
}

impl<S> Application<S>
where
    S: CatalogStore,
{
    pub fn new(store: S) -> Self {
        Self::with_password_cost(store, DEFAULT_PASSWORD_COST)
    }

    pub fn with_password_cost(store: S, password_cost: u32) -> Self {
        let store = Arc::new(store);
        Self {
            command_dispatcher: CommandDispatcher::new(Arc::clone(&store), password_cost),
            query_handler: QueryHandler::new(store),
        }
    }

    pub async fn issue_query<Q>(&self, query: Q) -> Result<Q::Output>
    where
        Q: query::CatalogQuery,
    {
        self.query_handler.issue(query).await
    }

    pub async fn submit_command(&self, command: Command) -> Result<CommandReceipt> {
        self.command_dispatcher.accept(command).await
    }
}
