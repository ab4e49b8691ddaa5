use anyhow::Context;
use gradebox_common::redis::RedisQueue;
use gradebox_common::QueueClient;
use gradebox_server::audit::{AuditSink, DirectoryAudit};
use gradebox_server::auth::{
    AuthGateway, BearerAuth, CookieSigner, OidcClient, OidcProvider, SessionAuth, TokenIssuer,
};
use gradebox_server::config::{load_allowed_users, ServerConfig};
use gradebox_server::consumer;
use gradebox_server::grader::CommandGrader;
use gradebox_server::ingest::{Dispatch, IngestService};
use gradebox_server::poll::{PollPolicy, PollTracker, Sweeper};
use gradebox_server::store::ResultStore;
use gradebox_server::{build_router, AppState, HttpOptions};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// How often stale poll state is swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Gradebox server booting...");

    let config = ServerConfig::from_env().context("Invalid configuration")?;

    let store = ResultStore::new(&config.upload_dir);
    store
        .ensure_dir()
        .await
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;
    info!(dir = %config.upload_dir.display(), "Upload directory ready");

    let auth = build_auth(&config).await?;
    if !auth.is_enabled() {
        warn!("Authentication is disabled; every upload is attributed to an anonymous user");
    }

    let audit = config.audit_dir.as_ref().map(|dir| {
        info!(dir = %dir.display(), "Mirroring submissions");
        Arc::new(DirectoryAudit::new(dir)) as Arc<dyn AuditSink>
    });

    // Dispatch: local grading, or the work queue plus a result consumer
    let (dispatch, consumer) = if config.grade_locally {
        let command = config.grader_command.as_deref().unwrap_or_default();
        let grader = CommandGrader::from_command_line(command, config.grader_timeout)
            .context("GRADER_COMMAND is empty")?;
        info!(command = %command, "Grading locally");
        (Dispatch::Local(Arc::new(grader)), None)
    } else {
        let queue = Arc::new(
            RedisQueue::connect(&config.queue.url, config.queue.backoff)
                .await
                .context("Failed to connect to the queue")?,
        );
        let inbound = queue
            .receive(&config.queue.report_channel)
            .await
            .context("Failed to subscribe to the report queue")?;
        info!(
            work = %config.queue.work_channel,
            report = %config.queue.report_channel,
            "Queues ready"
        );
        let consumer = consumer::spawn(store.clone(), inbound);
        let dispatch = Dispatch::Queue {
            client: queue,
            channel: config.queue.work_channel.clone(),
        };
        (dispatch, Some(consumer))
    };

    let polls = Arc::new(PollTracker::new(PollPolicy {
        entry_ttl: config.poll_state_ttl,
        ..PollPolicy::default()
    }));
    let sweeper = Sweeper::spawn(polls.clone(), SWEEP_INTERVAL);

    let state = Arc::new(AppState {
        auth,
        ingest: IngestService::new(store.clone(), dispatch, audit),
        store,
        polls,
        options: HttpOptions {
            allow_cors: config.allow_cors,
            static_dir: config.static_dir.clone(),
        },
    });

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(consumer) = consumer {
        consumer.stop().await;
    }
    sweeper.stop().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn build_auth(config: &ServerConfig) -> anyhow::Result<AuthGateway> {
    let allowed_users = match &config.allowed_users_file {
        Some(path) => {
            let users = load_allowed_users(path)?;
            info!(count = users.len(), "Loaded allowed users");
            users
        }
        None => HashSet::new(),
    };

    let session = match &config.openid {
        Some(openid) => {
            let provider = OidcProvider::discover(
                &openid.issuer,
                OidcClient {
                    client_id: openid.client_id.clone(),
                    client_secret: openid.client_secret.clone(),
                    redirect_url: config.redirect_url(),
                },
            )
            .await
            .context("OpenID discovery failed")?;
            Some(SessionAuth {
                cookies: CookieSigner::new(&openid.cookie_key, openid.secure_cookie)?,
                provider: Arc::new(provider),
            })
        }
        None => None,
    };

    let bearer = match &config.jwt {
        Some(jwt) => {
            let private_pem = tokio::fs::read(&jwt.private_key_path)
                .await
                .with_context(|| format!("Failed to read {}", jwt.private_key_path.display()))?;
            let public_pem = tokio::fs::read(&jwt.public_key_path)
                .await
                .with_context(|| format!("Failed to read {}", jwt.public_key_path.display()))?;
            Some(BearerAuth {
                tokens: TokenIssuer::from_rsa_pem(&private_pem, &public_pem, jwt.ttl)?,
            })
        }
        None => None,
    };

    Ok(AuthGateway::new(config.hash_salt.clone(), allowed_users, session, bearer))
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, draining connections...");
}
