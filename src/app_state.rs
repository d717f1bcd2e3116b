use std::sync::Arc;

use crate::config::Config;
use crate::membership::MembershipService;
use crate::notify::SharedMailer;
use crate::store::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub mailer: SharedMailer,
    pub membership: Arc<MembershipService>,
    pub config: Config,
}

impl AppState {
    pub fn new(repos: Repositories, mailer: SharedMailer, config: Config) -> Self {
        let membership = Arc::new(MembershipService::new(
            &repos,
            mailer.clone(),
            config.invite_duplicates,
        ));
        AppState {
            repos,
            mailer,
            membership,
            config,
        }
    }
}
