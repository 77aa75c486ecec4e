//! metacrud: metadata-driven CRUD and validation engine over relational tables.

pub mod audit;
pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metadata;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use auth::{JwtService, Principal};
pub use error::{AppError, MetadataError, SettingsError};
pub use metadata::{PgMetadataRepository, SchemaRegistry, StaticMetadata};
pub use response::{PageResult, ResultData};
pub use routes::{app, common_routes, crud_routes};
pub use service::CrudService;
pub use settings::Settings;
pub use state::AppState;
pub use store::{ensure_audit_table, ensure_catalog_tables, ensure_database_exists, MemoryStore, PgStore, RelationalStore};
