//! gRPC transport on top of `tonic`, passing already-encoded messages through.
use crate::error::{ConfigError, RpcError};
use crate::transport::{Connector, ResponseStream, Transport};
use arc_swap::ArcSwapOption;
use bytes::{Buf, BufMut, Bytes};
use futures_util::future::BoxFuture;
use futures_util::{StreamExt, TryStreamExt};
use http::uri::PathAndQuery;
use std::sync::Arc;
use std::time::Duration;
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{Channel, Endpoint};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Turns `host:port` into a URI tonic accepts. Full URIs are left alone.
pub fn normalize_endpoint(host: &str) -> String {
    let host = host.trim();
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct GrpcConnector {
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
}

impl GrpcConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    /// Per-request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Connector for GrpcConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>, ConfigError> {
        let uri = normalize_endpoint(endpoint);
        let mut builder =
            Endpoint::from_shared(uri.clone()).map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        debug!("Opening lazy channel to {uri}");
        Ok(Arc::new(GrpcTransport {
            channel: ArcSwapOption::from_pointee(builder.connect_lazy()),
        }))
    }
}

pub struct GrpcTransport {
    channel: ArcSwapOption<Channel>,
}

impl GrpcTransport {
    fn client(&self) -> Result<Grpc<Channel>, RpcError> {
        let channel = self.channel.load_full().ok_or(RpcError::Closed)?;
        Ok(Grpc::new(Channel::clone(&channel)))
    }
}

impl Transport for GrpcTransport {
    fn unary(
        &self,
        method: &'static str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<Bytes, RpcError>> {
        let client = self.client();
        Box::pin(async move {
            let mut client = client?;
            client
                .ready()
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
            let response = client
                .unary(
                    tonic::Request::new(request),
                    PathAndQuery::from_static(method),
                    RawCodec,
                )
                .await?;
            Ok(response.into_inner())
        })
    }

    fn server_streaming(
        &self,
        method: &'static str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<ResponseStream, RpcError>> {
        let client = self.client();
        Box::pin(async move {
            let mut client = client?;
            client
                .ready()
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
            let response = client
                .server_streaming(
                    tonic::Request::new(request),
                    PathAndQuery::from_static(method),
                    RawCodec,
                )
                .await?;
            Ok(response.into_inner().map_err(RpcError::from).boxed())
        })
    }

    fn close(&self) {
        self.channel.store(None);
    }
}

/// Codec that hands message bodies through untouched; encoding happens above
/// the transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Bytes>, Self::Error> {
        let len = src.remaining();
        Ok(Some(src.copy_to_bytes(len)))
    }
}
