use crate::error::{ConfigError, RpcError};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use std::sync::Arc;

pub type ResponseStream = BoxStream<'static, Result<Bytes, RpcError>>;

/// One connection's worth of RPC plumbing, operating on encoded messages.
///
/// `method` is the full RPC path, e.g. `/vacancy.VacancyService/GetVacancy`.
pub trait Transport: Send + Sync {
    fn unary(&self, method: &'static str, request: Bytes)
        -> BoxFuture<'static, Result<Bytes, RpcError>>;

    fn server_streaming(
        &self,
        method: &'static str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<ResponseStream, RpcError>>;

    /// Releases the underlying connection. Calls dispatched afterwards fail.
    fn close(&self);
}

/// Opens transports. Every virtual user gets its own.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>, ConfigError>;
}
