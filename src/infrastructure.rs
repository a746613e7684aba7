use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    future::Future,
    sync::Arc,
};
use time::OffsetDateTime;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::{
    core::model::query::{BookFilter, Ordering, PageWindow},
    error::Result,
};

pub mod persistence;

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueId(pub Uuid);

impl UniqueId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> &Uuid {
        let Self(id) = self;
        id
    }
}

impl Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let UniqueId(id) = self;
        write!(f, "{id}")
    }
}

#[derive(Clone)]
pub struct Termination {
    signal: broadcast::Sender<()>,
}

impl Termination {
    pub fn new() -> Self {
        let (signal, _rx) = broadcast::channel(1);
        Self { signal }
    }

    pub fn waiter(&self) -> TerminationWaiter {
        TerminationWaiter::new(self.signal.subscribe())
    }

    // Nobody waiting is not an error.
    pub fn signal(&self) {
        let _ = self.signal.send(());
    }
}

impl Default for Termination {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct TerminationWaiter(Arc<Mutex<broadcast::Receiver<()>>>);

impl TerminationWaiter {
    fn new(receiver: broadcast::Receiver<()>) -> Self {
        Self(Arc::new(Mutex::new(receiver)))
    }

    /// Resolves on the signal, or when the `Termination` is dropped.
    pub async fn wait(&self) {
        let _ = self.0.lock().await.recv().await;
    }
}

/// A book the way the store keeps it: tags still in their encoded form.
#[derive(Clone, Debug, PartialEq)]
pub struct BookFields {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub publish_year: i32,
    pub publisher: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub rating: f64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub tags: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BookRecord {
    pub id: Uuid,
    pub fields: BookFields,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct UserFields {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub image: Option<String>,
}

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub fields: UserFields,
    pub created_at: OffsetDateTime,
}

// Futures are Send so that handlers can be generic over the store.
pub trait CatalogStore: Send + Sync + 'static {
    fn find_books(
        &self,
        filter: &BookFilter,
        ordering: Ordering,
        window: PageWindow,
    ) -> impl Future<Output = Result<Vec<BookRecord>>> + Send;

    fn count_books(&self, filter: &BookFilter) -> impl Future<Output = Result<u64>> + Send;

    fn find_book(&self, id: UniqueId) -> impl Future<Output = Result<Option<BookRecord>>> + Send;

    fn categories(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Fails with `Error::Conflict` when the ISBN is taken.
    fn insert_book(
        &self,
        id: UniqueId,
        book: BookFields,
    ) -> impl Future<Output = Result<BookRecord>> + Send;

    /// Inserts the whole batch if, and only if, the catalog is empty.
    /// Yields the number of inserted books, `None` when nothing was done.
    fn seed_books(
        &self,
        books: Vec<(UniqueId, BookFields)>,
    ) -> impl Future<Output = Result<Option<usize>>> + Send;

    /// Takes one copy off the shelf. `None` when the book is missing or
    /// no copy is available.
    fn take_copy(&self, id: UniqueId) -> impl Future<Output = Result<Option<BookRecord>>> + Send;

    /// Puts one copy back. `None` when the book is missing or every copy
    /// is already on the shelf.
    fn restore_copy(
        &self,
        id: UniqueId,
    ) -> impl Future<Output = Result<Option<BookRecord>>> + Send;

    /// Fails with `Error::Conflict` when the email is taken.
    fn insert_user(
        &self,
        id: UniqueId,
        user: UserFields,
    ) -> impl Future<Output = Result<UserRecord>> + Send;

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>>> + Send;
}
