//! Hello server
//!
//! Run with `cargo run --example hello`, then:
//!
//! ```text
//! curl localhost:8080/hello/world
//! curl localhost:8080/health
//! open http://localhost:8080/docs
//! ```
//!
//! Configuration comes from `GIRDER_*` environment variables or `.env`.

use girder::prelude::*;
use girder::websocket::Connection;
use girder::{GraphQlRequest, LogConfig, LogFormat};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct Greeting {
    message: String,
    request_id: Option<String>,
}

fn hello(ctx: &mut RequestContext<'_>) -> Result<Json<Greeting>> {
    let name = ctx.param("name").unwrap_or("stranger").to_string();
    Ok(Json(Greeting {
        message: format!("Hello, {}!", name),
        request_id: ctx
            .state_uuid(RequestIdMiddleware::STATE_KEY)
            .map(|id| id.to_string()),
    }))
}

fn graphql(_ctx: &RequestContext<'_>, request: GraphQlRequest) -> Result<serde_json::Value> {
    Ok(serde_json::json!({ "data": { "query": request.query } }))
}

/// Relays every chat message to the other members of the `lobby` room.
struct Chat;

impl WebSocketHandler for Chat {
    fn on_open(&self, hub: &Hub, conn: &Arc<Connection>) {
        let _ = hub.join_room(conn.id, "lobby");
    }

    fn on_message(&self, hub: &Hub, conn: &Arc<Connection>, message: Message) {
        for id in hub.connection_ids() {
            if id != conn.id && hub.in_room(id, "lobby") {
                let _ = hub.send(id, message.clone());
            }
        }
    }
}

fn main() -> Result<()> {
    let _guard = LogConfig::new().format(LogFormat::Pretty).init()?;
    let config = ServerConfig::from_env()?;

    let mut router = Router::new();
    router.route(
        Route::new(HttpMethod::GET, "/hello/{name}", hello)?
            .summary("Greet someone")
            .tag("demo"),
    )?;
    router.get("/", |_ctx| "girder is running")?;

    let mut app = Application::new(router);
    app.use_middleware(RecoveryMiddleware)
        .use_middleware(RequestIdMiddleware)
        .use_middleware(TimingMiddleware)
        .graphql(graphql);

    let hub = Arc::new(Hub::new(config.websocket.clone(), Chat));
    app.websocket("/chat", hub)?;

    Server::bind(app, config)?.start()
}
