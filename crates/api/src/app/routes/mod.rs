use axum::{routing::get, Router};

pub mod ncf;
pub mod registry_sync;
pub mod system;
pub mod taxpayers;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/ncf", ncf::router())
        .nest("/taxpayers", taxpayers::router())
        .nest("/registry", registry_sync::router())
}
