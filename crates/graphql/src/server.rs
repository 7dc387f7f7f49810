//! HTTP surface: the GraphQL endpoint, GraphiQL and `/health`.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql::{EmptyMutation, EmptySubscription, ObjectType, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use tracing::info;

type ReadOnlySchema<Q> = Schema<Q, EmptyMutation, EmptySubscription>;

/// Backend the queries read from, checked by `GET /health`.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn is_healthy(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Serve GraphiQL on `GET /` and `GET /graphql`.
    pub playground: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4350,
            playground: true,
        }
    }
}

struct AppState<Q: ObjectType + 'static> {
    schema: ReadOnlySchema<Q>,
    health: Arc<dyn HealthCheck>,
}

impl<Q: ObjectType + 'static> Clone for AppState<Q> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            health: self.health.clone(),
        }
    }
}

/// Serve `schema` on all interfaces until `shutdown_signal` resolves.
pub async fn serve_with_shutdown<Q, F>(
    schema: ReadOnlySchema<Q>,
    health: Arc<dyn HealthCheck>,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    Q: ObjectType + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, playground = config.playground, "⚡ GraphQL server listening");

    axum::serve(listener, router(AppState { schema, health }, config.playground))
        .with_graceful_shutdown(shutdown_signal)
        .await
}

fn router<Q: ObjectType + 'static>(state: AppState<Q>, playground: bool) -> Router {
    let graphql = if playground {
        get(graphiql).post(execute::<Q>)
    } else {
        post(execute::<Q>)
    };

    let mut app = Router::new()
        .route("/graphql", graphql)
        .route("/health", get(health::<Q>));
    if playground {
        app = app.route("/", get(graphiql));
    }
    app.with_state(state)
}

async fn execute<Q: ObjectType + 'static>(State(state): State<AppState<Q>>, req: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

async fn health<Q: ObjectType + 'static>(State(state): State<AppState<Q>>) -> impl IntoResponse {
    if state.health.is_healthy().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_graphql::Object;

    #[derive(Default)]
    struct Ping;

    #[Object]
    impl Ping {
        async fn ping(&self) -> bool {
            true
        }
    }

    struct Fixed(bool);

    #[async_trait]
    impl HealthCheck for Fixed {
        async fn is_healthy(&self) -> bool {
            self.0
        }
    }

    fn state(healthy: bool) -> AppState<Ping> {
        AppState {
            schema: Schema::new(Ping, EmptyMutation, EmptySubscription),
            health: Arc::new(Fixed(healthy)),
        }
    }

    #[tokio::test]
    async fn test_health_follows_database() {
        let up = health(State(state(true))).await.into_response();
        assert_eq!(up.status(), StatusCode::OK);

        let down = health(State(state(false))).await.into_response();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
