use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;

use fritter_social::api::{self, AppState};
use fritter_social::config::Config;
use fritter_social::store::Store;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let startup_begin = std::time::Instant::now();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let store = Arc::new(Store::new(&config.database_path).map_err(|e| {
        log::error!("Failed to open database {}: {}", config.database_path, e);
        io::Error::new(io::ErrorKind::Other, e)
    })?);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(AppState {
                store: store.clone(),
            }))
            .configure(api::configure_routes)
    })
    .workers(1); // Single SQLite connection

    log::info!(
        "Starting fritter-social on {}:{} (ready in {}ms)",
        config.bind_addr,
        config.port,
        startup_begin.elapsed().as_millis()
    );

    server.bind((config.bind_addr.as_str(), config.port))?.run().await
}
