// src/main.rs

use std::sync::Arc;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use taskpilot::app_state::AppState;
use taskpilot::auth::Authentication;
use taskpilot::config::{Config, MailProvider};
use taskpilot::notify::{ConsoleMailer, OutboxMailer, SharedMailer};
use taskpilot::overdue::scheduler::{OverdueScheduler, RunSweep, Shutdown};
use taskpilot::overdue::OverdueDetector;
use taskpilot::routes;
use taskpilot::store::mongo::MongoStore;
use taskpilot::store::Repositories;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let store = match MongoStore::connect(&config.mongo_uri, &config.database_name).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Could not connect to MongoDB: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = store.ensure_indexes().await {
        error!("Could not create indexes: {}", e);
    }

    let mailer: SharedMailer = match config.mail_provider {
        MailProvider::Console => Arc::new(ConsoleMailer::new(&config.mail_from)),
        MailProvider::Outbox => Arc::new(OutboxMailer::new(&store.db, &config.mail_from)),
    };
    let repos = Repositories::from_store(store.clone());

    let detector = OverdueDetector::new(
        repos.tasks.clone(),
        repos.users.clone(),
        mailer.clone(),
        config.reference_zone,
        config.delivery_mode,
    );
    let scheduler = OverdueScheduler::new(Arc::new(detector), config.overdue_interval).start();
    // Catch up on tasks that went overdue while the server was down.
    scheduler.do_send(RunSweep { now: None });

    let state = web::Data::new(AppState::new(repos, mailer, config.clone()));
    let frontend_origin = config.frontend_origin.clone();
    let jwt_secret = config.jwt_secret.clone();

    info!("Server running at http://{}", config.bind_addr);
    info!("Allowed CORS Origin: {}", frontend_origin);
    info!(
        "Reference timezone {}, overdue delivery {:?}",
        config.reference_zone, config.delivery_mode
    );

    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication::new(&jwt_secret))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await;

    scheduler.do_send(Shutdown);
    result
}
