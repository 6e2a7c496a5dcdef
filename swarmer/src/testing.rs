//! In-crate transport used by unit tests.
use crate::error::{ConfigError, RpcError};
use crate::transport::{Connector, ResponseStream, Transport};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarmer_core::StatusCode;

pub const ECHO: &str = "/test.Service/Echo";
pub const SLOW: &str = "/test.Service/Slow";
pub const HANG: &str = "/test.Service/Hang";
pub const FAIL: &str = "/test.Service/Fail";
pub const LIST: &str = "/test.Service/List";

#[derive(Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
}

#[derive(Default, Clone)]
pub struct TestConnector {
    pub counters: Arc<Counters>,
}

impl Connector for TestConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>, ConfigError> {
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TestTransport {
            counters: self.counters.clone(),
        }))
    }
}

pub struct TestTransport {
    counters: Arc<Counters>,
}

impl Transport for TestTransport {
    fn unary(
        &self,
        method: &'static str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<Bytes, RpcError>> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            match method {
                ECHO => Ok(request),
                SLOW => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(request)
                }
                HANG => std::future::pending().await,
                FAIL => Err(RpcError::status(StatusCode::UNAVAILABLE, "unavailable")),
                _ => Err(RpcError::status(StatusCode::UNIMPLEMENTED, method)),
            }
        })
    }

    fn server_streaming(
        &self,
        _method: &'static str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<ResponseStream, RpcError>> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let items: Vec<Result<Bytes, RpcError>> =
                (0..request.len()).map(|_| Ok(Bytes::new())).collect();
            Ok(stream::iter(items).boxed())
        })
    }

    fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
