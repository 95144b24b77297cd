//! Command-line surface over the shift service.

mod cli;
mod composition;
mod error;

pub use cli::{run, Cli, Command};
pub use composition::{
    build_service, graph_connection, instance_fields, pattern_fields, resolver_settings,
    service_settings,
};
pub use error::{AppError, AppResult};
