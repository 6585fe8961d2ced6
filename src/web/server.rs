//! Web server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::auth::TokenService;
use crate::config::Config;
use crate::message::MaintenanceTask;
use crate::notify::{
    BroadcastPublisher, DispatcherConfig, NotificationDispatcher, NotificationPublisher,
    WebhookPublisher,
};
use crate::{Database, MailboxError, Result};

use super::handlers::AppState;
use super::middleware::RateLimitState;
use super::router::create_app;

/// HTTP server plus its background tasks.
pub struct WebServer {
    addr: SocketAddr,
    config: Config,
    db: Database,
    publisher: Arc<dyn NotificationPublisher>,
}

impl WebServer {
    /// Create a server from validated configuration.
    ///
    /// Notifications go to the configured webhook, or to an in-process
    /// broadcast bus when none is set.
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| MailboxError::Config(format!("invalid server address: {e}")))?;

        let publisher: Arc<dyn NotificationPublisher> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookPublisher::new(
                url.clone(),
                config.notifications.publish_timeout(),
            )?),
            None => Arc::new(BroadcastPublisher::with_capacity(
                config.notifications.channel_capacity,
            )),
        };

        Ok(Self {
            addr,
            config,
            db,
            publisher,
        })
    }

    /// Replace the notification publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn NotificationPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start background tasks and build the application router.
    fn start(self) -> axum::Router {
        let notifications = &self.config.notifications;
        let dispatcher = NotificationDispatcher::new(
            self.db.clone(),
            self.publisher.clone(),
            DispatcherConfig::from(notifications),
        );
        let wake = dispatcher.waker();
        dispatcher.spawn(Duration::from_secs(notifications.dispatch_interval_secs.max(1)));
        tracing::info!(
            publisher = self.publisher.name(),
            "Notification dispatcher started (every {}s)",
            notifications.dispatch_interval_secs
        );

        let sweep_secs = self.config.messages.sweep_interval_secs;
        if sweep_secs > 0 {
            MaintenanceTask::new(self.db.clone(), Duration::from_secs(sweep_secs)).spawn();
            tracing::info!("Expiry sweep task started (every {}s)", sweep_secs);
        } else {
            tracing::warn!("Expiry sweep disabled; expired messages stay until a manual cleanup");
        }

        let rate_limits = Arc::new(RateLimitState::new(
            self.config.server.login_rate_limit,
            self.config.server.api_rate_limit,
        ));
        rate_limits.clone().start_cleanup_task();

        let tokens = Arc::new(TokenService::new(
            &self.config.auth.jwt_secret,
            self.config.auth.token_expiry_secs,
        ));
        let app_state = Arc::new(
            AppState::new(self.db, tokens, self.config.messages.ttl()).with_dispatch_wake(wake),
        );

        create_app(app_state, rate_limits, &self.config.server.cors_origins)
    }

    /// Run the server until it fails.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.start();

        tracing::info!("Web server listening on http://{}", local_addr);
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    /// Run the server in the background and return the bound address.
    ///
    /// Useful with port 0 in tests.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.start();

        tracing::info!("Web server listening on http://{}", local_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.auth.jwt_secret = "test-secret-key".to_string();
        config
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let db = Database::open_in_memory().await.unwrap();
        let server = WebServer::new(create_test_config(), db).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_web_server_rejects_bad_address() {
        let db = Database::open_in_memory().await.unwrap();
        let mut config = create_test_config();
        config.server.host = "not an address".to_string();
        assert!(matches!(
            WebServer::new(config, db),
            Err(MailboxError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let db = Database::open_in_memory().await.unwrap();
        let server = WebServer::new(create_test_config(), db).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let client = reqwest::Client::new();
        let resp = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "OK");
    }
}
