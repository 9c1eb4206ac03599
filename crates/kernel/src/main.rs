//! Blogging module server.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use blogging_kernel::cli::{self, Cli, Command, TemplateCommand};
use blogging_kernel::routes::app_router;
use blogging_kernel::session::{memory_session_layer, parse_same_site, redis_session_layer};
use blogging_kernel::{AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match args.command() {
        Command::Serve => serve(config).await,
        Command::Migrate => cli::migrate(&config).await,
        Command::CreateUser {
            name,
            mail,
            password,
            admin,
        } => cli::create_user(&config, name, mail, password, *admin).await,
        Command::Template {
            command: TemplateCommand::Generate { name, schema, out },
        } => {
            let out = out.as_deref().unwrap_or(&config.generated_dir);
            let path = cli::generate_template(name, schema, out)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(&config)
        .await
        .context("failed to initialize application state")?;
    info!(
        templates = state.templates().len(),
        use_policy = state.settings().use_policy,
        site_url = %state.settings().site_url,
        "blog ready"
    );

    let same_site = parse_same_site(&config.cookie_same_site);
    let routes = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let sessions = redis_session_layer(redis_url, same_site)
                .await
                .context("failed to connect the Redis session store")?;
            info!("sessions stored in Redis");
            app_router().layer(sessions)
        }
        None => {
            warn!("REDIS_URL not set; sessions are kept in memory");
            app_router().layer(memory_session_layer(same_site))
        }
    };

    // Outermost last: trace, then CORS, then sessions.
    let app: Router = routes
        .layer(cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("server error")
}

/// `*` allows any origin without cookies. An explicit list allows those
/// origins with the session cookie.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ]);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any).allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| warn!(%origin, "skipping invalid CORS origin"))
                .ok()
        })
        .collect();
    layer
        .allow_origin(allowed)
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
