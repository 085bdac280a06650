//! HTTP front end
//!
//! Routes:
//!
//! | Route | Intent |
//! |-------|--------|
//! | `GET /health` | server status as JSON |
//! | `GET /` | listing of the served root |
//! | `GET /__thumbs__/{*path}` | thumbnail |
//! | `GET /{*path}?intent=thumbnail\|full\|tags\|raw` | as requested, `full` by default |

mod handlers;
mod range;

pub use handlers::{ApiError, HealthResponse, DERIVATION_HEADER};
pub use range::ByteRange;

use crate::cache::ArtifactCache;
use crate::error::{WebMediaError, WebMediaResult};
use crate::orchestrator::Orchestrator;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Build the router with all endpoints
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/__thumbs__/{*path}", get(handlers::thumbnail))
        .route("/", get(handlers::root))
        .route("/{*path}", get(handlers::file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A bound, not yet running server
pub struct Server {
    listener: TcpListener,
    state: AppState,
    sweep_interval: Option<Duration>,
}

impl Server {
    /// Bind `addr` for the given orchestrator
    pub async fn bind(addr: &str, orchestrator: Arc<Orchestrator>) -> WebMediaResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WebMediaError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            state: AppState::new(orchestrator),
            sweep_interval: None,
        })
    }

    /// Sweep the artifact cache every `secs` seconds; 0 disables sweeping
    pub fn with_sweep_interval(mut self, secs: u64) -> Self {
        self.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn local_addr(&self) -> WebMediaResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| WebMediaError::io("reading listener address", e))
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> WebMediaResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!("Serving {} on http://{}", self.state.orchestrator.root().display(), addr);

        let sweeper = self
            .sweep_interval
            .map(|every| spawn_sweeper(self.state.orchestrator.cache().clone(), every));

        let result = axum::serve(self.listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| WebMediaError::io("serving HTTP", e));

        if let Some(handle) = sweeper {
            handle.abort();
        }
        info!("Server stopped");
        result
    }
}

/// Periodically drop failed and orphaned cache entries
fn spawn_sweeper(cache: ArtifactCache, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = cache.sweep().await {
                warn!("Cache sweep failed: {}", e);
            }
        }
    })
}

/// Resolves on Ctrl+C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Layout;
    use crate::config::schema::DeriveConfig;
    use crate::config::StartupMode;
    use crate::error::{GatewayError, ProbeError};
    use crate::gateway::{Job, Transcoder};
    use crate::media::SourceFile;
    use crate::policy::Policy;
    use crate::probe::{MediaInfo, Prober};
    use crate::derivation::DerivationKind;
    use async_trait::async_trait;
    use std::io::Read;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    struct NoProbe;

    #[async_trait]
    impl Prober for NoProbe {
        async fn probe(&self, _source: &SourceFile) -> Result<MediaInfo, ProbeError> {
            Err(ProbeError::ToolUnavailable)
        }
    }

    /// Writes the kind tag as the artifact
    struct TagWriter {
        fail: bool,
    }

    #[async_trait]
    impl Transcoder for TagWriter {
        async fn run(&self, kind: DerivationKind, job: &Job) -> Result<(), GatewayError> {
            if self.fail {
                return Err(GatewayError::ToolFailed {
                    code: Some(1),
                    tail: "secret diagnostic".into(),
                });
            }
            tokio::fs::write(&job.output, kind.tag()).await.unwrap();
            Ok(())
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    struct Running {
        _dir: TempDir,
        base: String,
        stop: Option<oneshot::Sender<()>>,
        handle: JoinHandle<WebMediaResult<()>>,
    }

    impl Running {
        async fn stop(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn start(fail: bool) -> Running {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("served");
        std::fs::create_dir_all(root.join("album")).unwrap();
        std::fs::write(root.join("notes.txt"), b"0123456789abcdef").unwrap();
        std::fs::write(root.join("clip.mkv"), b"matroska bytes").unwrap();

        let mode = StartupMode::from_number(5).unwrap();
        let orchestrator = Orchestrator::new(
            &root,
            Policy::new(mode, &DeriveConfig::default()),
            ArtifactCache::new(Layout::new(mode.destination, dir.path().join("derived"))),
            Arc::new(NoProbe),
            Arc::new(TagWriter { fail }),
        )
        .unwrap();

        let server = Server::bind("127.0.0.1:0", Arc::new(orchestrator)).await.unwrap();
        let base = format!("http://{}", server.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = rx.await;
        }));

        Running {
            _dir: dir,
            base,
            stop: Some(tx),
            handle,
        }
    }

    fn agent() -> ureq::Agent {
        ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into()
    }

    /// Blocking GET returning status, headers of interest and body
    async fn get(url: String, range: Option<&'static str>) -> (u16, Vec<(String, String)>, Vec<u8>) {
        tokio::task::spawn_blocking(move || {
            let mut request = agent().get(&url);
            if let Some(range) = range {
                request = request.header("Range", range);
            }
            let mut response = request.call().unwrap();
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();
            let mut body = Vec::new();
            response.body_mut().as_reader().read_to_end(&mut body).unwrap();
            (status, headers, body)
        })
        .await
        .unwrap()
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serves_files_with_ranges() {
        let server = start(false).await;

        let (status, headers, body) = get(format!("{}/notes.txt", server.base), None).await;
        assert_eq!(status, 200);
        assert_eq!(body, b"0123456789abcdef");
        assert_eq!(header(&headers, "accept-ranges"), Some("bytes"));
        assert_eq!(header(&headers, "content-type"), Some("text/plain; charset=utf-8"));

        let (status, headers, body) =
            get(format!("{}/notes.txt", server.base), Some("bytes=2-5")).await;
        assert_eq!(status, 206);
        assert_eq!(body, b"2345");
        assert_eq!(header(&headers, "content-range"), Some("bytes 2-5/16"));

        let (status, headers, _) =
            get(format!("{}/notes.txt", server.base), Some("bytes=100-")).await;
        assert_eq!(status, 416);
        assert_eq!(header(&headers, "content-range"), Some("bytes */16"));

        server.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn thumbnails_and_fallbacks() {
        let server = start(false).await;
        let (status, headers, body) = get(format!("{}/__thumbs__/clip.mkv", server.base), None).await;
        assert_eq!(status, 200);
        assert_eq!(body, b"thumb256");
        assert_eq!(header(&headers, "content-type"), Some("image/jpeg"));
        assert_eq!(header(&headers, DERIVATION_HEADER), Some("thumb256"));
        server.stop().await;

        let server = start(true).await;
        let (status, headers, body) =
            get(format!("{}/clip.mkv?intent=thumbnail", server.base), None).await;
        assert_eq!(status, 200);
        assert_eq!(body, b"matroska bytes");
        assert_eq!(header(&headers, DERIVATION_HEADER), Some("fallback"));
        assert!(!String::from_utf8_lossy(&body).contains("secret"));
        server.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn listings_errors_and_health() {
        let server = start(false).await;

        let (status, _, body) = get(format!("{}/", server.base), None).await;
        assert_eq!(status, 200);
        let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(listing["entries"][0]["name"], "album");
        assert_eq!(listing["entries"][0]["dir"], true);

        let (status, _, body) = get(format!("{}/missing.jpg", server.base), None).await;
        assert_eq!(status, 404);
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"], "not_found");

        let (status, _, body) = get(format!("{}/notes.txt?intent=sideways", server.base), None).await;
        assert_eq!(status, 400);
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"], "bad_intent");

        let (status, _, body) = get(format!("{}/health", server.base), None).await;
        assert_eq!(status, 200);
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["mode"], "temporary-1");

        server.stop().await;
    }
}
