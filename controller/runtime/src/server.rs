use crate::{
    aggregate::Aggregator, cache::LocalSnapshot, fetch::FetchConfiguration,
    metrics::RequestMetrics,
};
use anyhow::Result;
use futures::future;
use hyper::{body::Incoming, http, Request, Response};
use hyper_util::rt::TokioIo;
use prometheus_client::registry::Registry;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace, warn};

type Body = http_body_util::Full<bytes::Bytes>;

/// Serves the aggregated configuration, health and metrics endpoints.
pub struct Handler<L, F> {
    aggregator: Arc<Aggregator<L, F>>,
    registry: Option<Arc<Registry>>,
    requests: RequestMetrics,
    health_path: Arc<str>,
    metrics_path: Arc<str>,
}

// === impl Handler ===

impl<L, F> Handler<L, F>
where
    L: LocalSnapshot,
    F: FetchConfiguration,
{
    pub fn new(
        aggregator: Arc<Aggregator<L, F>>,
        registry: Option<Arc<Registry>>,
        requests: RequestMetrics,
        health_path: &str,
        metrics_path: &str,
    ) -> Self {
        Self {
            aggregator,
            registry,
            requests,
            health_path: health_path.into(),
            metrics_path: metrics_path.into(),
        }
    }

    async fn handle(&self, method: &http::Method, path: &str) -> Response<Body> {
        self.requests.observe(self.endpoint(path), method);

        if path == &*self.health_path {
            return json(http::StatusCode::OK, br#"{"status":"UP"}"#.to_vec());
        }

        if path == &*self.metrics_path {
            if let Some(registry) = &self.registry {
                let mut text = String::new();
                if let Err(error) = prometheus_client::encoding::text::encode(&mut text, registry)
                {
                    error!(%error, "Failed to encode metrics");
                    return internal_error();
                }
                return Response::builder()
                    .status(http::StatusCode::OK)
                    .header(
                        http::header::CONTENT_TYPE,
                        "application/openmetrics-text; version=1.0.0; charset=utf-8",
                    )
                    .body(Body::from(text))
                    .expect("metrics response must be valid");
            }
        }

        let config = match self.aggregator.configuration().await {
            Ok(config) => config,
            Err(error) => {
                error!(%error, "Failed to build configuration");
                return internal_error();
            }
        };
        match serde_json::to_vec(&*config) {
            Ok(body) => json(http::StatusCode::OK, body),
            Err(error) => {
                error!(%error, "Failed to encode configuration");
                internal_error()
            }
        }
    }
}

impl<L, F> Handler<L, F> {
    /// Maps a request path onto the bounded set of endpoint labels.
    fn endpoint(&self, path: &str) -> &str {
        if path == &*self.health_path {
            &self.health_path
        } else if self.registry.is_some() && path == &*self.metrics_path {
            &self.metrics_path
        } else {
            "/"
        }
    }
}

impl<L, F> Clone for Handler<L, F> {
    fn clone(&self) -> Self {
        Self {
            aggregator: self.aggregator.clone(),
            registry: self.registry.clone(),
            requests: self.requests.clone(),
            health_path: self.health_path.clone(),
            metrics_path: self.metrics_path.clone(),
        }
    }
}

impl<L, F> hyper::service::Service<Request<Incoming>> for Handler<L, F>
where
    L: LocalSnapshot,
    F: FetchConfiguration,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        trace!(?req);
        let handler = self.clone();
        Box::pin(async move {
            let rsp = handler.handle(req.method(), req.uri().path()).await;
            Ok(rsp)
        })
    }
}

fn json(status: http::StatusCode, body: Vec<u8>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("json response must be valid")
}

fn internal_error() -> Response<Body> {
    Response::builder()
        .status(http::StatusCode::INTERNAL_SERVER_ERROR)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("500 Internal Server Error"))
        .expect("error response must be valid")
}

/// Accepts HTTP/1 connections until `drain` is signaled. In-flight
/// connections are shut down gracefully before the drain is released.
pub async fn serve<L, F>(addr: SocketAddr, handler: Handler<L, F>, drain: drain::Watch) -> Result<()>
where
    L: LocalSnapshot,
    F: FetchConfiguration,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    let shutdown = drain.clone().signaled();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = listener.accept() => {
                let (io, client) = match res {
                    Ok(conn) => conn,
                    Err(error) => {
                        warn!(%error, "Failed to accept connection");
                        continue;
                    }
                };
                tokio::spawn(serve_conn(io, client, handler.clone(), drain.clone()));
            }
            _ = &mut shutdown => {
                debug!("HTTP server shutting down");
                return Ok(());
            }
        }
    }
}

async fn serve_conn<L, F>(
    io: tokio::net::TcpStream,
    client: SocketAddr,
    handler: Handler<L, F>,
    drain: drain::Watch,
) where
    L: LocalSnapshot,
    F: FetchConfiguration,
{
    let conn = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(io), handler);
    tokio::pin!(conn);
    tokio::select! {
        res = conn.as_mut() => {
            if let Err(error) = res {
                debug!(%client, %error, "Connection failed");
            }
        }
        release = drain.signaled() => {
            conn.as_mut().graceful_shutdown();
            if let Err(error) = release.release_after(conn).await {
                debug!(%client, %error, "Connection failed during shutdown");
            }
        }
    }
}
