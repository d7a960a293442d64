//! Shared application state for all routes.

use crate::auth::JwtKeys;
use crate::geo::Geocoder;
use crate::store::ResourceStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub geocoder: Arc<dyn Geocoder>,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(store: Arc<dyn ResourceStore>, geocoder: Arc<dyn Geocoder>, jwt: JwtKeys) -> Self {
        AppState {
            store,
            geocoder,
            jwt: Arc::new(jwt),
        }
    }
}
