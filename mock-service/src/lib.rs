//! In-process stand-in for a gRPC backend, plugged into swarmer through its
//! `Connector` seam.
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{stream, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarmer::core::StatusCode;
use swarmer::{ConfigError, Connector, ResponseStream, RpcError, Transport};
#[allow(unused)]
use tracing::{debug, trace};

pub type UnaryHandler = Arc<dyn Fn(Bytes) -> Result<Bytes, RpcError> + Send + Sync>;
pub type StreamHandler = Arc<dyn Fn(Bytes) -> Result<Vec<Bytes>, RpcError> + Send + Sync>;

/// How the mock answers one method.
#[derive(Clone)]
pub enum Route {
    Echo,
    Delay(Duration),
    Hang,
    Status(StatusCode),
    /// Rejects calls over the limit with `RESOURCE_EXHAUSTED`.
    Max {
        limiter: Arc<DefaultDirectRateLimiter>,
        delay: Duration,
    },
    Unary(UnaryHandler),
    Stream(StreamHandler),
}

impl Route {
    pub fn max(tps: u32, delay: Duration) -> Self {
        Route::Max {
            limiter: Arc::new(rate_limiter(tps)),
            delay,
        }
    }

    pub fn unary<F>(handler: F) -> Self
    where
        F: Fn(Bytes) -> Result<Bytes, RpcError> + Send + Sync + 'static,
    {
        Route::Unary(Arc::new(handler))
    }

    pub fn stream<F>(handler: F) -> Self
    where
        F: Fn(Bytes) -> Result<Vec<Bytes>, RpcError> + Send + Sync + 'static,
    {
        Route::Stream(Arc::new(handler))
    }

    /// Streams `count` empty messages.
    pub fn items(count: usize) -> Self {
        Route::stream(move |_| Ok(vec![Bytes::new(); count]))
    }
}

#[derive(Debug, Default)]
pub struct MockStats {
    pub connects: AtomicU64,
    pub calls: AtomicU64,
    pub closes: AtomicU64,
}

impl MockStats {
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed.
    pub fn open(&self) -> u64 {
        self.connects().saturating_sub(self.closes())
    }
}

/// Route table for the mock. Fixed once turned into a connector.
#[derive(Default)]
pub struct MockService {
    routes: HashMap<&'static str, Route>,
    refuse_connections: bool,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: &'static str, route: Route) -> Self {
        self.routes.insert(method, route);
        self
    }

    /// Every connection attempt fails with a configuration error.
    pub fn refuse_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn into_connector(self) -> MockConnector {
        let routes = self
            .routes
            .into_iter()
            .map(|(method, route)| (method, (route, AtomicU64::new(0))))
            .collect();
        MockConnector {
            inner: Arc::new(Inner {
                routes,
                refuse_connections: self.refuse_connections,
                stats: MockStats::default(),
            }),
        }
    }
}

struct Inner {
    routes: HashMap<&'static str, (Route, AtomicU64)>,
    refuse_connections: bool,
    stats: MockStats,
}

impl Inner {
    fn route(&self, method: &'static str) -> Result<Route, RpcError> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        counter!("mock-service.calls").increment(1);
        match self.routes.get(method) {
            Some((route, calls)) => {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(route.clone())
            }
            None => Err(RpcError::status(StatusCode::UNIMPLEMENTED, method)),
        }
    }
}

#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<Inner>,
}

impl MockConnector {
    pub fn stats(&self) -> &MockStats {
        &self.inner.stats
    }

    /// Calls routed to `method` so far, across every connection.
    pub fn calls_to(&self, method: &str) -> u64 {
        self.inner
            .routes
            .get(method)
            .map_or(0, |(_, calls)| calls.load(Ordering::SeqCst))
    }
}

impl Connector for MockConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>, ConfigError> {
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.inner.refuse_connections {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "connections refused".to_string(),
            });
        }
        self.inner.stats.connects.fetch_add(1, Ordering::SeqCst);
        debug!("Mock connection to {endpoint}");
        Ok(Arc::new(MockTransport {
            inner: self.inner.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MockTransport {
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl MockTransport {
    fn check_open(&self) -> Result<(), RpcError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RpcError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Transport for MockTransport {
    fn unary(
        &self,
        method: &'static str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<Bytes, RpcError>> {
        let route = self.check_open().and_then(|_| self.inner.route(method));
        Box::pin(async move {
            match route? {
                Route::Echo => Ok(request),
                Route::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(request)
                }
                Route::Hang => std::future::pending().await,
                Route::Status(code) => Err(RpcError::status(code, code.name())),
                Route::Max { limiter, delay } => {
                    tokio::time::sleep(delay).await;
                    match limiter.check() {
                        Ok(_) => Ok(request),
                        Err(_) => {
                            trace!("{method} over its limit");
                            Err(RpcError::status(
                                StatusCode::RESOURCE_EXHAUSTED,
                                "rate limit exceeded",
                            ))
                        }
                    }
                }
                Route::Unary(handler) => handler(request),
                Route::Stream(_) => Err(RpcError::status(
                    StatusCode::UNIMPLEMENTED,
                    format!("{method} is server streaming"),
                )),
            }
        })
    }

    fn server_streaming(
        &self,
        method: &'static str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<ResponseStream, RpcError>> {
        let route = self.check_open().and_then(|_| self.inner.route(method));
        Box::pin(async move {
            match route? {
                Route::Stream(handler) => {
                    let items = handler(request)?;
                    Ok(stream::iter(items.into_iter().map(Ok)).boxed())
                }
                Route::Hang => std::future::pending().await,
                Route::Status(code) => Err(RpcError::status(code, code.name())),
                _ => Err(RpcError::status(
                    StatusCode::UNIMPLEMENTED,
                    format!("{method} is unary"),
                )),
            }
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/** Utils **/

pub fn rate_limiter(tps: u32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(tps).unwrap_or(NonZeroU32::MIN),
    ))
}
