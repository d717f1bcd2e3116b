pub mod analytics;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod membership;
pub mod models;
pub mod notify;
pub mod overdue;
pub mod routes;
pub mod store;
pub mod task_management;
pub mod team_management;

#[cfg(test)]
pub(crate) mod test_support;
