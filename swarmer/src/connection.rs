//! Per-user connection ownership and the capability clients bound to it.
use crate::error::{ConfigError, RpcError};
use crate::interceptor::{Interceptor, Measurable};
use crate::transport::{Connector, Transport};
use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::TryStreamExt;
use prost::Message;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// A typed client that issues RPCs through a [`Connection`].
pub trait Capability: Send + Sync + 'static {
    /// Name user classes refer to this capability by, e.g. `"auth"`.
    const NAME: &'static str;

    fn bind(connection: Arc<Connection>) -> Self;
}

type BindFn = fn(Arc<Connection>) -> Box<dyn Any + Send + Sync>;

fn bind_boxed<C: Capability>(connection: Arc<Connection>) -> Box<dyn Any + Send + Sync> {
    Box::new(C::bind(connection))
}

/// The capabilities a user class binds and the ones it cannot run without.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    bindings: Vec<(&'static str, BindFn)>,
    required: Vec<&'static str>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `C` and marks it required.
    pub fn with<C: Capability>(mut self) -> Self {
        self.bindings.retain(|(name, _)| *name != C::NAME);
        self.bindings.push((C::NAME, bind_boxed::<C>));
        self.require(C::NAME)
    }

    /// Marks a capability as required without binding it.
    pub fn require(mut self, name: &'static str) -> Self {
        if !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.iter().any(|(bound, _)| *bound == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bindings.iter().map(|(name, _)| *name)
    }

    pub fn validate(&self, class: &str) -> Result<(), ConfigError> {
        match self.required.iter().find(|name| !self.contains(name)) {
            Some(missing) => Err(ConfigError::MissingCapability {
                class: class.to_string(),
                capability: *missing,
            }),
            None => Ok(()),
        }
    }

    fn bind_all(&self, connection: &Arc<Connection>) -> Clients {
        Clients {
            by_name: self
                .bindings
                .iter()
                .map(|(name, bind)| (*name, bind(connection.clone())))
                .collect(),
        }
    }
}

/// Capability name to typed client, built once per connection.
#[derive(Default)]
pub struct Clients {
    by_name: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Clients {
    pub fn get<C: Capability>(&self) -> Result<&C, ConfigError> {
        self.by_name
            .get(C::NAME)
            .and_then(|client| client.downcast_ref::<C>())
            .ok_or(ConfigError::UnknownCapability(C::NAME))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// One virtual user's connection to the target.
///
/// Every call goes through the [`Interceptor`]. Once [`close`](Self::close)
/// has been called no new call is dispatched; calls already in flight are
/// tracked so [`shutdown`](Self::shutdown) can wait for them.
pub struct Connection {
    transport: Arc<dyn Transport>,
    interceptor: Interceptor,
    closed: AtomicBool,
    released: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>, interceptor: Interceptor) -> Self {
        Self {
            transport,
            interceptor,
            closed: AtomicBool::new(false),
            released: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Validates the host and the class's capabilities, opens the transport and
    /// binds every capability client to it.
    pub fn open(
        connector: &dyn Connector,
        host: &str,
        interceptor: Interceptor,
        class: &str,
        capabilities: &CapabilitySet,
    ) -> Result<(Arc<Connection>, Clients), ConfigError> {
        if host.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        capabilities.validate(class)?;

        let transport = connector.connect(host)?;
        let connection = Arc::new(Connection::new(transport, interceptor));
        let clients = capabilities.bind_all(&connection);
        Ok((connection, clients))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the connection closed. In-flight calls are unaffected.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            trace!("Connection marked closed");
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Closes the underlying transport. Only the first call has an effect;
    /// returns whether this call was it.
    pub fn release(&self) -> bool {
        self.close();
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.transport.close();
        debug!("Connection released");
        true
    }

    /// Waits until no call is in flight, up to `grace`. Returns whether the
    /// connection drained in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.in_flight() == 0;
            }
        }
    }

    /// Close, drain for up to `grace`, release. Returns whether in-flight
    /// calls finished within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.close();
        let drained = self.drain(grace).await;
        if !drained {
            warn!(
                "{} call(s) still in flight after {grace:?}, closing anyway",
                self.in_flight()
            );
        }
        self.release();
        drained
    }

    pub async fn unary<Req, Resp>(&self, method: &'static str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Message,
        Resp: Message + Default + Measurable,
    {
        let _in_flight = self.dispatch()?;
        let call = self
            .transport
            .unary(method, Bytes::from(request.encode_to_vec()));
        self.interceptor.intercept(method, decode_unary(call)).await
    }

    /// Server-streaming call, consumed in full. Each item is decoded as `Resp`.
    pub async fn server_streaming<Req, Resp>(
        &self,
        method: &'static str,
        request: &Req,
    ) -> Result<Vec<Resp>, RpcError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let _in_flight = self.dispatch()?;
        let call = self
            .transport
            .server_streaming(method, Bytes::from(request.encode_to_vec()));
        self.interceptor
            .intercept_stream(method, async move {
                let stream = call.await?;
                Ok::<_, RpcError>(
                    stream.and_then(|item| future::ready(Resp::decode(item).map_err(RpcError::from))),
                )
            })
            .await
    }

    /// Unary call on already-encoded bytes.
    pub async fn unary_raw(&self, method: &'static str, request: Bytes) -> Result<Bytes, RpcError> {
        let _in_flight = self.dispatch()?;
        let call = self.transport.unary(method, request);
        self.interceptor.intercept(method, call).await
    }

    fn dispatch(&self) -> Result<InFlight<'_>, RpcError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(self);
        if self.is_closed() {
            return Err(RpcError::Closed);
        }
        Ok(guard)
    }
}

async fn decode_unary<Resp>(call: BoxFuture<'static, Result<Bytes, RpcError>>) -> Result<Resp, RpcError>
where
    Resp: Message + Default,
{
    let body = call.await?;
    Ok(Resp::decode(body)?)
}

struct InFlight<'a>(&'a Connection);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}
