use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::{error, model};

#[derive(Clone)]
pub struct ApiClient {
    http_client: Client,
    base_url: String,
}

impl ApiClient {
    const API_RESOURCE_PREFIX: &'static str = "/api/v1";

    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub async fn get_books(&self, query: &model::BookListQuery) -> error::Result<model::BookList> {
        self.send(self.http_client.get(self.resolve_resource_uri("/books")).query(query))
            .await
    }

    pub async fn get_book(&self, id: model::BookId) -> error::Result<model::Book> {
        self.request_resource(&format!("/books/{id}")).await
    }

    pub async fn get_categories(&self) -> error::Result<Vec<String>> {
        self.request_resource("/categories").await
    }

    pub async fn add_book(&self, book: &model::NewBook) -> error::Result<model::BookOutcome> {
        self.post_resource("/books", book).await
    }

    pub async fn seed_books(&self) -> error::Result<model::SeedOutcome> {
        self.post_empty("/books/seed").await
    }

    pub async fn borrow_book(&self, id: model::BookId) -> error::Result<model::BookOutcome> {
        self.post_empty(&format!("/books/{id}/borrow")).await
    }

    pub async fn return_book(&self, id: model::BookId) -> error::Result<model::BookOutcome> {
        self.post_empty(&format!("/books/{id}/return")).await
    }

    pub async fn register(
        &self,
        registration: &model::Registration,
    ) -> error::Result<model::RegistrationOutcome> {
        self.post_resource("/auth/register", registration).await
    }

    pub async fn check_email_availability(&self, email: &str) -> error::Result<bool> {
        let request = self
            .http_client
            .get(self.resolve_resource_uri("/auth/email-availability"))
            .query(&[("email", email)]);
        let model::EmailAvailability { available } = self.send(request).await?;
        Ok(available)
    }

    pub async fn login(&self, credentials: &model::Credentials) -> error::Result<model::User> {
        let model::LoginOutcome { user } = self.post_resource("/auth/login", credentials).await?;
        Ok(user)
    }

    async fn post_resource<R, S>(&self, uri: &str, resource: &R) -> error::Result<S>
    where
        R: Serialize,
        S: DeserializeOwned,
    {
        self.send(self.http_client.post(self.resolve_resource_uri(uri)).json(resource))
            .await
    }

    async fn post_empty<S>(&self, uri: &str) -> error::Result<S>
    where
        S: DeserializeOwned,
    {
        self.send(self.http_client.post(self.resolve_resource_uri(uri)))
            .await
    }

    async fn request_resource<R>(&self, resource_uri: &str) -> error::Result<R>
    where
        R: DeserializeOwned,
    {
        self.send(self.http_client.get(self.resolve_resource_uri(resource_uri)))
            .await
    }

    async fn send<R>(&self, request: RequestBuilder) -> error::Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self.http_client.execute(request.build()?).await?;
        let status = response.status();
        interpret(status, &response.bytes().await?)
    }

    fn resolve_resource_uri(&self, resource_uri: &str) -> String {
        format!(
            "{}{}{resource_uri}",
            self.base_url,
            Self::API_RESOURCE_PREFIX
        )
    }
}

fn interpret<R>(status: StatusCode, body: &[u8]) -> error::Result<R>
where
    R: DeserializeOwned,
{
    if status.is_success() {
        return Ok(serde_json::from_slice(body)?);
    }

    // Something in front of the API may answer without the error envelope.
    let model::ErrorBody { code, message } =
        serde_json::from_slice(body).unwrap_or_else(|_| model::ErrorBody {
            code: status
                .canonical_reason()
                .unwrap_or("UNKNOWN")
                .to_uppercase()
                .replace(' ', "_"),
            message: String::from_utf8_lossy(body).into_owned(),
        });

    Err(error::Error::Rejected {
        status,
        code,
        message,
    })
}
