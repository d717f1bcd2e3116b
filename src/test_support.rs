//! Shared fixtures for handler tests.

use std::sync::Arc;

use actix_web::web;

use crate::app_state::AppState;
use crate::auth::create_jwt;
use crate::config::Config;
use crate::models::User;
use crate::notify::testing::RecordingMailer;
use crate::store::memory::MemoryStore;
use crate::store::Repositories;

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub config: Config,
    pub state: web::Data<AppState>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::for_tests())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let state = web::Data::new(AppState::new(
            Repositories::from_store(store.clone()),
            mailer.clone(),
            config.clone(),
        ));
        TestContext {
            store,
            mailer,
            config,
            state,
        }
    }

    /// An `Authorization` header pair for `user`.
    pub fn bearer(&self, user: &User) -> (&'static str, String) {
        let token = create_jwt(&user.id, &self.config.jwt_secret).unwrap();
        ("Authorization", format!("Bearer {token}"))
    }
}

/// Builds the full route table behind the auth middleware.
macro_rules! test_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap($crate::auth::Authentication::new(&$ctx.config.jwt_secret))
                .app_data($ctx.state.clone())
                .configure($crate::routes::configure),
        )
        .await
    };
}

pub(crate) use test_app;
