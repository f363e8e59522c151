//! Server mode CLI logic
//!
//! Assembles the monitor from settings and runs it, either as a long-lived
//! HTTP server with a background refresh loop or as a single batch.

use crate::{
    config::{ConfigLoader, OtpMode, RelayMode, Settings, SiteRegistry},
    monitor::RefreshOrchestrator,
    navigation::{CommandHost, NavigationRouter},
    relay::{DirectRelay, ProxyRelay, Relay},
    server::{AppState, create_app},
    session::{
        AuthSession, ChannelPrompter, CountFetcher, DisabledPrompter, DurableStore, FileStore,
        MemoryStore, OtpPrompter, TerminalPrompter, TokenStore,
    },
    types::SnapshotResponse,
    utils::{default_token_file, version},
};
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Arguments for server mode
#[derive(Debug, Default)]
pub struct ServerArgs {
    pub config: Option<PathBuf>,
    pub sites: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub interval: Option<u64>,
    pub otp: Option<OtpMode>,
    pub proxy_url: Option<String>,
    pub no_persist: bool,
    pub once: bool,
    pub verbose: bool,
}

impl ServerArgs {
    /// Command line values win over file and environment
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(sites) = &self.sites {
            settings.sites_file = Some(sites.clone());
        }
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(interval) = self.interval {
            settings.refresh.interval_secs = interval;
        }
        if let Some(mode) = self.otp {
            settings.otp.mode = mode;
        }
        if let Some(proxy_url) = &self.proxy_url {
            settings.relay.mode = RelayMode::Proxy;
            settings.relay.proxy_url = Some(proxy_url.clone());
        }
        if self.no_persist {
            settings.storage.persist = false;
        }
        if self.verbose {
            settings.logging.verbose = true;
        }
        settings
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
pub fn init_logging(settings: &Settings) {
    let default_level = if settings.logging.verbose {
        "debug"
    } else {
        settings.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything the monitor runs on
#[derive(Debug)]
pub struct Components {
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub prompter: Option<ChannelPrompter>,
    pub navigator: Arc<NavigationRouter>,
}

pub fn build_relay(settings: &Settings) -> crate::Result<Arc<dyn Relay>> {
    match settings.relay.mode {
        RelayMode::Direct => Ok(Arc::new(DirectRelay::new(&settings.relay)?)),
        RelayMode::Proxy => {
            let endpoint = settings
                .relay
                .proxy_url
                .as_deref()
                .ok_or_else(|| crate::Error::config("relay.proxy_url is required in proxy mode"))?;
            Ok(Arc::new(ProxyRelay::new(endpoint, &settings.relay)?))
        }
    }
}

pub fn build_store(settings: &Settings) -> Arc<dyn DurableStore> {
    if !settings.storage.persist {
        tracing::info!("Token persistence disabled");
        return Arc::new(MemoryStore::new());
    }
    let path = settings
        .storage
        .token_file
        .clone()
        .unwrap_or_else(default_token_file);
    tracing::info!("Persisting tokens to {:?}", path);
    Arc::new(FileStore::new(path))
}

/// OTP prompter for the configured mode, plus the HTTP handle when there is one
pub fn build_prompter(mode: OtpMode) -> (Arc<dyn OtpPrompter>, Option<ChannelPrompter>) {
    match mode {
        OtpMode::Http => {
            let prompter = ChannelPrompter::new();
            (Arc::new(prompter.clone()), Some(prompter))
        }
        OtpMode::Terminal => (Arc::new(TerminalPrompter::new()), None),
        OtpMode::Disabled => (Arc::new(DisabledPrompter), None),
    }
}

pub fn build_components(settings: &Settings, registry: SiteRegistry) -> crate::Result<Components> {
    let registry = Arc::new(registry);
    let relay = build_relay(settings)?;
    let store = Arc::new(TokenStore::new(build_store(settings)));
    let (otp, prompter) = build_prompter(settings.otp.mode);

    let auth = Arc::new(AuthSession::new(relay.clone(), store, otp, &settings.otp));
    let fetcher = CountFetcher::new(registry.clone(), auth, relay);
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        fetcher,
        settings.refresh.page(),
        settings.refresh.interval(),
    ));
    let navigator = Arc::new(NavigationRouter::new(
        registry,
        Arc::new(CommandHost::new(settings.navigation.open_command.clone())),
    ));

    Ok(Components {
        orchestrator,
        prompter,
        navigator,
    })
}

/// Run server mode with the given arguments
pub async fn run_server_mode(args: ServerArgs) -> Result<()> {
    let loader = ConfigLoader::new();
    let settings = args.apply(loader.load(args.config.as_deref())?);
    settings.validate()?;
    init_logging(&settings);

    tracing::info!("Starting withdrawal monitor v{}", version::get_version());
    let registry = loader
        .registry(&settings)
        .context("failed to load tenant registry")?;
    let components = build_components(&settings, registry)?;

    if args.once {
        return run_once(components).await;
    }

    let addr = parse_and_bind_address(&settings.server.host, settings.server.port).await?;
    let cancel = CancellationToken::new();
    let refresher = components.orchestrator.clone().spawn(cancel.clone());

    let app = create_app(AppState::new(
        components.orchestrator,
        components.prompter,
        components.navigator,
    ));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Withdrawal monitor v{} listening on {}",
        version::get_version(),
        addr
    );

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down");
            }
            cancel.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await?;
    cancel.cancel();
    refresher.await?;
    Ok(())
}

/// One batch, snapshot printed to stdout
async fn run_once(components: Components) -> Result<()> {
    let report = components.orchestrator.refresh_all().await;
    let snapshot = SnapshotResponse::from(components.orchestrator.snapshot().await);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if report.succeeded.is_empty() && !report.failed.is_empty() {
        anyhow::bail!("every tenant failed to refresh");
    }
    Ok(())
}

/// Parse host string into a socket address
///
/// Accepts IP literals and `localhost`. For `::` the IPv6 wildcard is tried
/// first, falling back to `0.0.0.0` when IPv6 is unavailable.
pub async fn parse_and_bind_address(host: &str, port: u16) -> Result<SocketAddr> {
    if host == "localhost" {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }

    let ip: IpAddr = host
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid host address: {}", host))?;
    let addr = SocketAddr::new(ip, port);
    if ip != IpAddr::V6(Ipv6Addr::UNSPECIFIED) {
        tracing::debug!("Parsed address: {}", addr);
        return Ok(addr);
    }

    match tokio::net::TcpListener::bind(addr).await {
        Ok(_) => Ok(addr),
        Err(e) => {
            tracing::warn!(
                "Could not listen on [::]:{} (Caused by {}), falling back to 0.0.0.0",
                port,
                e
            );
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::registry::tests::tenant;

    #[tokio::test]
    async fn test_parse_and_bind_ipv4_address() {
        let addr = parse_and_bind_address("127.0.0.1", 0).await.unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn test_parse_and_bind_localhost() {
        let addr = parse_and_bind_address("localhost", 4417).await.unwrap();
        assert_eq!(addr, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4417));
    }

    #[tokio::test]
    async fn test_parse_and_bind_ipv6_any_fallback() {
        let addr = parse_and_bind_address("::", 0).await.unwrap();
        assert!(
            addr.ip() == IpAddr::V6(Ipv6Addr::UNSPECIFIED)
                || addr.ip() == IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
    }

    #[tokio::test]
    async fn test_parse_and_bind_invalid_address() {
        let err = parse_and_bind_address("invalid-host", 8080)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid host address: invalid-host"));
    }

    #[test]
    fn test_args_override_settings() {
        let args = ServerArgs {
            host: Some("0.0.0.0".to_string()),
            port: Some(9000),
            interval: Some(15),
            otp: Some(OtpMode::Disabled),
            proxy_url: Some("http://localhost:3000/api/proxy".to_string()),
            no_persist: true,
            ..ServerArgs::default()
        };
        let settings = args.apply(Settings::default());

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.refresh.interval_secs, 15);
        assert_eq!(settings.otp.mode, OtpMode::Disabled);
        assert_eq!(settings.relay.mode, RelayMode::Proxy);
        assert!(!settings.storage.persist);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_build_prompter_modes() {
        assert!(build_prompter(OtpMode::Http).1.is_some());
        assert!(build_prompter(OtpMode::Terminal).1.is_none());
        assert!(build_prompter(OtpMode::Disabled).1.is_none());
    }

    #[test]
    fn test_build_relay_requires_proxy_url() {
        let mut settings = Settings::default();
        settings.relay.mode = RelayMode::Proxy;
        assert!(build_relay(&settings).is_err());

        settings.relay.proxy_url = Some("http://localhost:3000/api/proxy".to_string());
        assert!(build_relay(&settings).is_ok());
    }

    #[tokio::test]
    async fn test_build_components_without_persistence() {
        let mut settings = Settings::default();
        settings.storage.persist = false;
        settings.otp.mode = OtpMode::Http;
        let registry = SiteRegistry::new(vec![tenant(1, "PG688")]).unwrap();

        let components = build_components(&settings, registry).unwrap();
        assert!(components.prompter.is_some());
        assert_eq!(components.navigator.tracked(), 0);
        assert_eq!(components.orchestrator.snapshot().await.generation, 0);
    }
}
