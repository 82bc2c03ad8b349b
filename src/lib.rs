use crate::cli::Args;
use crate::service::{GroupAssignmentService, ServiceConfig};
use crate::store::PgStore;
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use axum_keycloak_auth::PassthroughMode;
use axum_keycloak_auth::instance::{KeycloakAuthInstance, KeycloakConfig};
use axum_keycloak_auth::layer::KeycloakAuthLayer;
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use std::sync::Arc;
use tracing::info;

pub mod cli;
pub mod errors;
pub mod model;
pub mod notify;
pub mod payloads;
pub mod response;
pub mod schema;
pub mod service;
pub mod store;

mod api;

/// Router state shared by every handler.
pub type SharedService = Arc<GroupAssignmentService>;

pub fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Initializing group assignment service...");
    let service = GroupAssignmentService::with_store(
        Arc::new(PgStore::new(pool)),
        ServiceConfig::from(args),
    );

    info!("Initializing Keycloak authentication layer...");
    let keycloak_layer =
        init_protection_layer(args).context("Failed to initialize Keycloak layer")?;

    info!("Initializing router...");
    Ok(init_router_internal(Arc::new(service), keycloak_layer))
}

/// Router without the authentication layer, over any store backend.
pub fn init_test_router(service: SharedService) -> Router {
    Router::new()
        .nest("/admin", admin_routes())
        .nest("/consultant", consultant_routes())
        .nest("/learner", learner_routes())
        .nest("/groups", group_routes())
        .with_state(service)
}

fn init_router_internal(
    service: SharedService,
    keycloak_layer: KeycloakAuthLayer<String>,
) -> Router {
    let admin_api = admin_routes().layer(keycloak_layer.clone());
    let consultant_api = consultant_routes().layer(keycloak_layer.clone());
    let learner_api = learner_routes().layer(keycloak_layer.clone());
    let group_api = group_routes().layer(keycloak_layer);

    Router::new()
        .nest("/admin", admin_api)
        .nest("/consultant", consultant_api)
        .nest("/learner", learner_api)
        .nest("/groups", group_api)
        .with_state(service)
}

fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_protection_layer(args: &Args) -> anyhow::Result<KeycloakAuthLayer<String>> {
    let config = KeycloakConfig::builder()
        .server(args.keycloak_server_url.clone())
        .realm(args.keycloak_realm.clone())
        .build();

    let instance = KeycloakAuthInstance::new(config);

    let layer = KeycloakAuthLayer::builder()
        .instance(instance)
        .passthrough_mode(PassthroughMode::Block)
        .persist_raw_claims(false)
        .expected_audiences(vec![args.keycloak_audiences.clone()])
        .build();

    Ok(layer)
}

fn admin_routes() -> Router<SharedService> {
    Router::new().route("/list_assignments", get(api::admin::list_assignments))
}

fn consultant_routes() -> Router<SharedService> {
    Router::new().route("/create_group", post(api::admin::create_consultant_group))
}

fn learner_routes() -> Router<SharedService> {
    Router::new().route("/list_assignments", get(api::learner::list_assignments))
}

fn group_routes() -> Router<SharedService> {
    Router::new()
        .route("/get_or_create", post(api::groups::get_or_create))
        .route("/add_members", post(api::groups::add_members))
        .route("/remove_member", post(api::groups::remove_member))
        .route("/members", get(api::groups::members))
        .route("/submit", post(api::groups::submit))
        .route(
            "/eligible_classmates",
            get(api::groups::eligible_classmates),
        )
}
