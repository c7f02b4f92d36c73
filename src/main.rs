mod config;
mod credentials;
mod database;
mod error;
mod lists;
mod model;
mod movie_cache;
mod omdb;
mod routes;
mod session;

use actix_web::{middleware::Logger, web, App, HttpServer};
use config::Settings;
use credentials::CredentialStore;
use lists::ListSync;
use log::info;
use movie_cache::MovieCache;
use omdb::{MovieProvider, OmdbClient};
use session::SessionKeys;
use std::{io, sync::Arc, time::Duration};

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("movielist=debug,actix_web=info"),
    )
    .init();

    let settings = Settings::load().map_err(io::Error::other)?;
    let db = sled::open(&settings.database_path).map_err(io::Error::other)?;
    let provider: Arc<dyn MovieProvider> = Arc::new(
        OmdbClient::new(
            settings.omdb.api_key.clone(),
            settings.omdb.base_url.clone(),
            Duration::from_secs(settings.omdb.timeout_secs),
        )
        .map_err(io::Error::other)?,
    );

    let credentials = web::Data::new(CredentialStore::new(db.clone(), settings.bcrypt_cost));
    let sessions = web::Data::new(SessionKeys::new(&settings.jwt_secret));
    let lists = web::Data::new(ListSync::new(
        db.clone(),
        MovieCache::new(db, provider.clone()),
    ));
    let provider = web::Data::from(provider);
    let allowed_origins = settings.allowed_origins.clone();

    info!("listening on {}", settings.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(routes::cors(&allowed_origins))
            .wrap(Logger::default())
            .app_data(credentials.clone())
            .app_data(sessions.clone())
            .app_data(lists.clone())
            .app_data(provider.clone())
            .configure(routes::configure)
            .default_service(web::route().to(routes::not_found))
    })
    .bind(&settings.bind)?
    .run()
    .await
}
