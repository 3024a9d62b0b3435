use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use domain::services::{CommandDispatcher, EdgeService, EdgeSettings, Reconciler, TunnelRegistry};
use domain::store::{ContentStore, EdgeStore, InMemoryStore};
use persistence::{FsContentStore, PgEdgeStore};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{
    commands, edge_groups, endpoint_groups, endpoints, health, reconcile, resources, tags,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EdgeService>,
    pub tunnels: Arc<TunnelRegistry>,
    /// `None` when running on the in-memory store.
    pub pool: Option<PgPool>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the engine: PostgreSQL store when a pool is given, in-memory
    /// store otherwise, filesystem content and the process-wide tunnel registry.
    pub fn new(config: Config, pool: Option<PgPool>) -> Self {
        let store: Arc<dyn EdgeStore> = match &pool {
            Some(pool) => Arc::new(PgEdgeStore::new(pool.clone())),
            None => Arc::new(InMemoryStore::new()),
        };
        let content: Arc<dyn ContentStore> =
            Arc::new(FsContentStore::new(config.edge.content_root.clone()));
        Self::with_store(config, store, content, pool)
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn EdgeStore>,
        content: Arc<dyn ContentStore>,
        pool: Option<PgPool>,
    ) -> Self {
        let tunnels = Arc::new(TunnelRegistry::new(config.edge.tunnel_channel_capacity));
        let dispatcher = CommandDispatcher::new(tunnels.clone(), content);
        let settings = EdgeSettings {
            default_checkin_interval_secs: config.edge.default_checkin_interval_secs,
            collapse_on_drain: config.edge.collapse_on_drain,
        };
        let service = EdgeService::new(store, Reconciler::new(dispatcher), settings);

        Self {
            service: Arc::new(service),
            tunnels,
            pool,
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/tags/:id", delete(tags::delete_tag))
        // Static endpoint groups
        .route(
            "/endpoint-groups",
            get(endpoint_groups::list_endpoint_groups).post(endpoint_groups::create_endpoint_group),
        )
        .route(
            "/endpoint-groups/:id",
            get(endpoint_groups::get_endpoint_group).delete(endpoint_groups::delete_endpoint_group),
        )
        .route(
            "/endpoint-groups/:id/tags",
            put(endpoint_groups::update_endpoint_group_tags),
        )
        // Endpoints
        .route(
            "/endpoints",
            get(endpoints::list_endpoints).post(endpoints::register_endpoint),
        )
        .route(
            "/endpoints/:id",
            get(endpoints::get_endpoint)
                .patch(endpoints::update_endpoint)
                .delete(endpoints::delete_endpoint),
        )
        .route("/endpoints/:id/checkin", post(endpoints::checkin))
        .route("/endpoints/:id/status", get(endpoints::endpoint_status))
        .route("/endpoints/:id/deassociate", post(endpoints::deassociate_endpoint))
        .route("/endpoints/:id/edge-groups", get(endpoints::endpoint_edge_groups))
        .route(
            "/endpoints/:id/related-resources",
            get(endpoints::related_resources),
        )
        // Command log
        .route(
            "/endpoints/:id/commands",
            get(commands::pending_commands).post(commands::enqueue_command),
        )
        .route("/endpoints/:id/commands/ack", post(commands::acknowledge_commands))
        // Edge groups
        .route(
            "/edge-groups",
            get(edge_groups::list_edge_groups).post(edge_groups::create_edge_group),
        )
        .route(
            "/edge-groups/:id",
            get(edge_groups::get_edge_group)
                .put(edge_groups::update_edge_group)
                .delete(edge_groups::delete_edge_group),
        )
        .route("/edge-groups/:id/endpoints", get(edge_groups::group_endpoints))
        // Stacks, jobs and configs
        .route(
            "/edge-resources",
            get(resources::list_resources).post(resources::create_resource),
        )
        .route(
            "/edge-resources/:kind/:id",
            get(resources::get_resource)
                .patch(resources::update_resource)
                .delete(resources::delete_resource),
        )
        // On-demand reconciliation
        .route("/reconcile", post(reconcile::reconcile));

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        // Global middleware (bottom layers run first)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
