use actix_cors::Cors;
use actix_web::{error, http::header, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialStore;
use crate::error::AppError;
use crate::lists::ListSync;
use crate::omdb::{MovieProvider, SearchHit, SearchOutcome, SearchQuery, Title};
use crate::session::{AuthenticatedUser, SessionKeys};

type Credentials = web::Data<CredentialStore>;
type Sessions = web::Data<SessionKeys>;
type Lists = web::Data<ListSync>;
type Provider = web::Data<dyn MovieProvider>;

/// Registers every route along with extractor settings that turn malformed
/// bodies and queries into validation errors.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid request body: {}", err)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid query: {}", err)).into()
    }))
    .route("/signup", web::post().to(signup))
    .route("/signin", web::post().to(signin))
    .route("/lists", web::post().to(create_list))
    .route("/lists", web::get().to(get_lists))
    .route("/lists/{name}", web::delete().to(delete_list))
    .route("/lists/{name}/movies", web::post().to(add_movies))
    .route("/lists/{name}/movies", web::get().to(list_movies))
    .route("/lists/{name}/movies", web::delete().to(remove_movie))
    .route("/search", web::get().to(search));
}

/// Browser access for the single-page client. With no origins configured,
/// or with `*` among them, every origin is allowed.
pub fn cors(allowed_origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(3600);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_any_origin();
    }
    allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialParams {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
struct TokenResponse {
    token: String,
}

async fn signup(
    params: web::Json<CredentialParams>,
    credentials: Credentials,
) -> Result<HttpResponse, AppError> {
    let CredentialParams { username, password } = params.into_inner();
    let (_id, user) = web::block(move || credentials.create(&username, &password)).await??;
    log::info!("created user {}", user.username);
    Ok(HttpResponse::Created().body("User created"))
}

async fn signin(
    params: web::Json<CredentialParams>,
    credentials: Credentials,
    sessions: Sessions,
) -> Result<HttpResponse, AppError> {
    let CredentialParams { username, password } = params.into_inner();
    let (id, _user) = web::block(move || credentials.authenticate(&username, &password)).await??;
    let token = sessions.issue(id)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateListParams {
    name: String,
    #[serde(default)]
    movies: Vec<String>,
    #[serde(default)]
    public: bool,
}

async fn create_list(
    user: AuthenticatedUser,
    params: web::Json<CreateListParams>,
    lists: Lists,
) -> Result<HttpResponse, AppError> {
    let CreateListParams {
        name,
        movies,
        public,
    } = params.into_inner();
    let list = lists.create(user.0, &name, movies, public)?;
    Ok(HttpResponse::Created().json(list))
}

async fn get_lists(user: AuthenticatedUser, lists: Lists) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(lists.lists(user.0)?))
}

async fn delete_list(
    user: AuthenticatedUser,
    name: web::Path<String>,
    lists: Lists,
) -> Result<HttpResponse, AppError> {
    lists.delete(user.0, &name)?;
    Ok(HttpResponse::Ok().body("List deleted"))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AddMoviesParams {
    movies: Vec<String>,
}

async fn add_movies(
    user: AuthenticatedUser,
    name: web::Path<String>,
    params: web::Json<AddMoviesParams>,
    lists: Lists,
) -> Result<HttpResponse, AppError> {
    let outcome = lists
        .add_movies(user.0, &name, params.into_inner().movies)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn list_movies(
    user: AuthenticatedUser,
    name: web::Path<String>,
    lists: Lists,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(lists.movies(user.0, &name).await?))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoveMovieParams {
    #[serde(rename = "imdbID", alias = "externalId")]
    imdb_id: String,
}

async fn remove_movie(
    user: AuthenticatedUser,
    name: web::Path<String>,
    params: web::Query<RemoveMovieParams>,
    lists: Lists,
) -> Result<HttpResponse, AppError> {
    lists.remove_movie(user.0, &name, &params.imdb_id)?;
    Ok(HttpResponse::Ok().body("Movie removed from the list"))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchParams {
    s: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    y: Option<String>,
    plot: Option<String>,
    page: Option<u32>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    search_results: Vec<SearchHit>,
    direct_result: Option<Title>,
}

/// Provider title search combined with a direct lookup of the same title.
async fn search(
    params: web::Query<SearchParams>,
    provider: Provider,
) -> Result<HttpResponse, AppError> {
    let SearchParams {
        s,
        kind,
        y,
        plot,
        page,
    } = params.into_inner();
    let title = s
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Search query (s) is required".to_owned()))?;
    let query = SearchQuery {
        title,
        kind: kind.filter(|k| !k.is_empty()),
        year: y.filter(|y| !y.is_empty()),
        plot: plot.filter(|p| !p.is_empty()),
        page: page.unwrap_or(1),
    };
    let search_results = match provider.search(&query).await? {
        SearchOutcome::Found(hits) => hits,
        SearchOutcome::NotFound(message) => return Err(AppError::NotFound(message)),
    };
    let direct_result = provider.lookup_title(&query.title).await?;
    Ok(HttpResponse::Ok().json(SearchResponse {
        search_results,
        direct_result,
    }))
}

/// Unmatched routes answer with a plain 404.
pub async fn not_found() -> error::Result<HttpResponse> {
    Ok(HttpResponse::NotFound().body("Not found"))
}
