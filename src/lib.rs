pub mod config;
pub mod error;
pub mod govern;
pub mod handlers;
pub mod plan;
pub mod registry;
pub mod routes;
pub mod store;
pub mod template;
pub mod unfurl;
