use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::{result::Result as StdResult, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    core::{
        model::{self as domain},
        Application, CommandReceipt,
    },
    error::{Error, Result},
    infrastructure::{CatalogStore, TerminationWaiter, UniqueId},
};

pub mod model;

const API_RESOURCE_PREFIX: &str = "/api/v1";

type ApiResult<A> = StdResult<A, ApiError>;

type ApplicationInner<S> = Arc<Application<S>>;
pub struct Api<S>(ApplicationInner<S>);

impl<S> Api<S>
where
    S: CatalogStore,
{
    pub fn new(application: Application<S>) -> Self {
        Self(Arc::new(application))
    }

    pub fn into_router(self) -> Router {
        let Self(application) = self;
        routing_configuration().with_state(application)
    }

    pub async fn start(self, listener: TcpListener, termination: TerminationWaiter) -> Result<()> {
        info!(address = ?listener.local_addr()?, "Serving the catalog API");

        Ok(axum::serve(listener, self.into_router())
            .with_graceful_shutdown(async move { termination.wait().await })
            .await?)
    }
}

fn routing_configuration<S>() -> Router<ApplicationInner<S>>
where
    S: CatalogStore,
{
    let books = Router::new()
        .route("/", get(books::list).post(books::create))
        .route("/seed", post(books::seed))
        .route("/:id", get(books::get))
        .route("/:id/borrow", post(books::borrow))
        .route("/:id/return", post(books::give_back));

    let auth = Router::new()
        .route("/register", post(auth::register))
        .route("/email-availability", get(auth::email_availability))
        .route("/login", post(auth::login));

    let api = Router::new()
        .nest("/books", books)
        .route("/categories", get(books::categories))
        .nest("/auth", auth);

    Router::new()
        .route("/", get(system_root))
        .nest(API_RESOURCE_PREFIX, api)
}

#[derive(Debug)]
enum ApiError {
    Internal { failure: &'static str, cause: Error },
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    fn rejected(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    fn bad_request(rejection: impl std::fmt::Display) -> Self {
        Self::rejected(StatusCode::BAD_REQUEST, rejection.to_string())
    }

    /// Sorts an error into the caller's fault or ours. `failure` is all the
    /// caller learns about the latter.
    fn classify(error: Error, failure: &'static str) -> Self {
        match error {
            Error::Validation(message) => Self::rejected(StatusCode::BAD_REQUEST, message),
            Error::Conflict(message) => Self::rejected(StatusCode::CONFLICT, message),
            Error::NotFound(message) => Self::rejected(StatusCode::NOT_FOUND, message),
            cause => Self::Internal { failure, cause },
        }
    }
}

fn error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::CONFLICT => "CONFLICT",
        _ => "INTERNAL_SERVER_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal { failure, cause } => {
                error!(%cause, failure, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, failure.to_owned())
            }
            ApiError::Rejected { status, message } => (status, message),
        };

        let body = model::ErrorBody {
            code: error_code(status).to_owned(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

trait Failure<A> {
    fn or_fail(self, failure: &'static str) -> ApiResult<A>;
}

impl<A> Failure<A> for Result<A> {
    fn or_fail(self, failure: &'static str) -> ApiResult<A> {
        self.map_err(|error| ApiError::classify(error, failure))
    }
}

fn created_response<A>(location: &str, body: A) -> ApiResult<Response>
where
    A: Serialize,
{
    let mut headers = HeaderMap::default();
    let location = HeaderValue::from_str(location)
        .map_err(|error| ApiError::classify(Error::Generic(error.to_string()), ADD_BOOK_FAILURE))?;
    headers.insert("Location", location);
    Ok((StatusCode::CREATED, headers, Json(body)).into_response())
}

fn resource_location(resource_type: &str, id: &str) -> String {
    format!("{}/{resource_type}/{id}", API_RESOURCE_PREFIX)
}

const ADD_BOOK_FAILURE: &str = "Adding the book failed, please try again later";

impl From<CommandReceipt> for ApiResult<Response> {
    fn from(value: CommandReceipt) -> Self {
        match value {
            CommandReceipt::BookAdded(book) => {
                let location = resource_location("books", &book.id.to_string());
                created_response(
                    &location,
                    model::BookOutcome {
                        success: true,
                        message: "The book was added".to_owned(),
                        book: book.into(),
                    },
                )
            }
            CommandReceipt::Seeded(count) => Ok(Json(model::SeedOutcome {
                success: true,
                message: format!("Added {count} sample books"),
                count: Some(count),
            })
            .into_response()),
            CommandReceipt::AlreadySeeded => Ok(Json(model::SeedOutcome {
                success: false,
                message: "The catalog already has books".to_owned(),
                count: None,
            })
            .into_response()),
            CommandReceipt::CopiesChanged(book) => Ok(Json(model::BookOutcome {
                success: true,
                message: format!(
                    "{} of {} copies available",
                    book.info.available_copies, book.info.total_copies
                ),
                book: book.into(),
            })
            .into_response()),
            CommandReceipt::UserRegistered(user) => Ok((
                StatusCode::CREATED,
                Json(model::RegistrationOutcome {
                    success: true,
                    message: "Registration succeeded".to_owned(),
                    user: user.into(),
                }),
            )
                .into_response()),
        }
    }
}

fn book_id(id: StdResult<Path<Uuid>, PathRejection>) -> ApiResult<domain::BookId> {
    let Path(id) = id.map_err(ApiError::bad_request)?;
    Ok(domain::BookId(UniqueId(id)))
}

mod books {
    use super::*;

    use domain::{query, Command};

    pub async fn list<S>(
        State(application): State<ApplicationInner<S>>,
        params: StdResult<Query<model::BookListParams>, QueryRejection>,
    ) -> ApiResult<Json<model::BookList>>
    where
        S: CatalogStore,
    {
        let Query(params) = params.map_err(ApiError::bad_request)?;
        let request = query::GetBooks::try_from(params).or_fail(FETCH_FAILURE)?;

        Ok(Json(
            application
                .issue_query(request)
                .await
                .or_fail(FETCH_FAILURE)?
                .into(),
        ))
    }

    pub async fn get<S>(
        State(application): State<ApplicationInner<S>>,
        id: StdResult<Path<Uuid>, PathRejection>,
    ) -> ApiResult<Json<model::Book>>
    where
        S: CatalogStore,
    {
        let id = book_id(id)?;
        if let Some(book) = application
            .issue_query(query::BookById(id))
            .await
            .or_fail(FETCH_FAILURE)?
        {
            Ok(Json(book.into()))
        } else {
            Err(ApiError::rejected(
                StatusCode::NOT_FOUND,
                format!("Book {id} does not exist"),
            ))
        }
    }

    pub async fn categories<S>(
        State(application): State<ApplicationInner<S>>,
    ) -> ApiResult<Json<Vec<String>>>
    where
        S: CatalogStore,
    {
        Ok(Json(
            application
                .issue_query(query::AllCategories)
                .await
                .or_fail("Fetching categories failed, please try again later")?,
        ))
    }

    pub async fn create<S>(
        State(application): State<ApplicationInner<S>>,
        submission: StdResult<Json<domain::BookSubmission>, JsonRejection>,
    ) -> ApiResult<Response>
    where
        S: CatalogStore,
    {
        let Json(submission) = submission.map_err(ApiError::bad_request)?;
        application
            .submit_command(Command::AddBook(submission))
            .await
            .or_fail(ADD_BOOK_FAILURE)?
            .into()
    }

    pub async fn seed<S>(State(application): State<ApplicationInner<S>>) -> ApiResult<Response>
    where
        S: CatalogStore,
    {
        application
            .submit_command(Command::SeedBooks)
            .await
            .or_fail("Seeding the catalog failed, please try again later")?
            .into()
    }

    pub async fn borrow<S>(
        State(application): State<ApplicationInner<S>>,
        id: StdResult<Path<Uuid>, PathRejection>,
    ) -> ApiResult<Response>
    where
        S: CatalogStore,
    {
        application
            .submit_command(Command::BorrowBook(book_id(id)?))
            .await
            .or_fail("Borrowing failed, please try again later")?
            .into()
    }

    pub async fn give_back<S>(
        State(application): State<ApplicationInner<S>>,
        id: StdResult<Path<Uuid>, PathRejection>,
    ) -> ApiResult<Response>
    where
        S: CatalogStore,
    {
        application
            .submit_command(Command::ReturnBook(book_id(id)?))
            .await
            .or_fail("Returning failed, please try again later")?
            .into()
    }

    const FETCH_FAILURE: &str = "Fetching books failed, please try again later";
}

mod auth {
    use super::*;

    use domain::{query, Command};

    pub async fn register<S>(
        State(application): State<ApplicationInner<S>>,
        registration: StdResult<Json<domain::Registration>, JsonRejection>,
    ) -> ApiResult<Response>
    where
        S: CatalogStore,
    {
        let Json(registration) = registration.map_err(ApiError::bad_request)?;
        application
            .submit_command(Command::RegisterUser(registration))
            .await
            .or_fail("Registration failed, please try again later")?
            .into()
    }

    pub async fn email_availability<S>(
        State(application): State<ApplicationInner<S>>,
        param: StdResult<Query<model::EmailParam>, QueryRejection>,
    ) -> ApiResult<Json<model::EmailAvailability>>
    where
        S: CatalogStore,
    {
        let Query(model::EmailParam { email }) = param.map_err(ApiError::bad_request)?;
        let available = application
            .issue_query(query::EmailAvailability(email))
            .await
            .or_fail("Checking the email failed, please try again later")?;

        Ok(Json(model::EmailAvailability { available }))
    }

    pub async fn login<S>(
        State(application): State<ApplicationInner<S>>,
        login: StdResult<Json<model::Login>, JsonRejection>,
    ) -> ApiResult<Json<model::LoginOutcome>>
    where
        S: CatalogStore,
    {
        let Json(model::Login { email, password }) = login.map_err(ApiError::bad_request)?;

        application
            .issue_query(query::Credentials { email, password })
            .await
            .or_fail("Signing in failed, please try again later")?
            .map(|user| Json(model::LoginOutcome { user }))
            .ok_or_else(|| {
                ApiError::rejected(StatusCode::UNAUTHORIZED, "Invalid email or password")
            })
    }
}

async fn system_root() -> &'static str {
    concat!("Bookshelf ", env!("CARGO_PKG_VERSION"), " running.")
}
