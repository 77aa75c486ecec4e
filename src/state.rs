//! Shared application state for all routes.

use crate::auth::JwtService;
use crate::metadata::{MetadataRepository, SchemaRegistry};
use crate::settings::Settings;
use crate::store::RelationalStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RelationalStore>,
    /// Lazily loaded table schemas; invalidate after catalog edits.
    pub registry: SchemaRegistry,
    pub tokens: JwtService,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        metadata: Arc<dyn MetadataRepository>,
        settings: Settings,
    ) -> Self {
        AppState {
            store,
            registry: SchemaRegistry::new(metadata),
            tokens: JwtService::new(&settings.jwt_secret, settings.jwt_expire_secs),
            settings: Arc::new(settings),
        }
    }
}
