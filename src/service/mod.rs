//! Action resolution: field, auth, association and query resolvers plus the orchestrators.

mod actions;
mod associate;
pub mod associations;
pub mod auth;
pub mod fields;
pub mod json_api;
pub mod query;
mod scope;

pub use actions::Actions;
pub use json_api::Output;
pub use scope::ActionScope;
