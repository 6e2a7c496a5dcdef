//! Timing and outcome capture around every outbound RPC.
use crate::error::{MeasureError, RpcError};
use crate::sink::MetricSink;
use bytes::Bytes;
use futures_util::{ready, Stream, TryStreamExt};
use pin_project::{pin_project, pinned_drop};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use swarmer_core::{Outcome, RpcEvent, StatusCode};

/// A response whose size can be reported.
///
/// The interceptor asks for an item count first, then a byte size, and falls
/// back to 0. Either measurement may fail; failures are not errors and are
/// never reported.
pub trait Measurable {
    fn item_count(&self) -> Result<u64, MeasureError> {
        Err(MeasureError::Unsupported)
    }

    fn byte_size(&self) -> Result<u64, MeasureError> {
        Err(MeasureError::Unsupported)
    }
}

pub fn response_size<R: Measurable + ?Sized>(response: &R) -> u64 {
    response
        .item_count()
        .or_else(|_| response.byte_size())
        .unwrap_or(0)
}

impl<T> Measurable for Vec<T> {
    fn item_count(&self) -> Result<u64, MeasureError> {
        Ok(self.len() as u64)
    }
}

impl Measurable for Bytes {
    fn byte_size(&self) -> Result<u64, MeasureError> {
        Ok(self.len() as u64)
    }
}

impl Measurable for () {}

/// Implements [`Measurable`] for protobuf messages using their encoded length.
#[macro_export]
macro_rules! measurable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Measurable for $ty {
                fn byte_size(&self) -> ::std::result::Result<u64, $crate::MeasureError> {
                    Ok($crate::prost::Message::encoded_len(self) as u64)
                }
            }
        )+
    };
}

/// Wraps RPC invocations so each one emits exactly one [`RpcEvent`].
#[derive(Clone)]
pub struct Interceptor {
    sink: MetricSink,
}

impl Interceptor {
    pub fn new(sink: MetricSink) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &MetricSink {
        &self.sink
    }

    /// Instruments a single-response call. The returned future yields the
    /// call's own result untouched.
    pub fn intercept<F, R>(&self, method: &'static str, call: F) -> Instrumented<F>
    where
        F: Future<Output = Result<R, RpcError>>,
        R: Measurable,
    {
        Instrumented {
            call,
            method,
            sink: Some(self.sink.clone()),
            started: None,
        }
    }

    /// Instruments a streaming call. The stream is consumed completely inside the
    /// timed window and the size reported is the number of items received.
    pub fn intercept_stream<F, S, T>(
        &self,
        method: &'static str,
        call: F,
    ) -> Instrumented<impl Future<Output = Result<Vec<T>, RpcError>>>
    where
        F: Future<Output = Result<S, RpcError>>,
        S: Stream<Item = Result<T, RpcError>>,
    {
        self.intercept(method, async move {
            let stream = call.await?;
            stream.try_collect::<Vec<T>>().await
        })
    }
}

/// Future returned by [`Interceptor::intercept`].
///
/// The clock starts on first poll, which is when the call is dispatched. If the
/// future is dropped after dispatch but before completion, a `CANCELLED` event is
/// emitted instead.
#[pin_project(PinnedDrop)]
pub struct Instrumented<F> {
    #[pin]
    call: F,
    method: &'static str,
    sink: Option<MetricSink>,
    started: Option<Instant>,
}

impl<F, R> Future for Instrumented<F>
where
    F: Future<Output = Result<R, RpcError>>,
    R: Measurable,
{
    type Output = Result<R, RpcError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let started = *this.started.get_or_insert_with(Instant::now);

        let res = ready!(this.call.poll(cx));
        let elapsed = started.elapsed();

        let (size, outcome) = match &res {
            Ok(response) => (response_size(response), Outcome::Success),
            Err(err) => (0, err.outcome()),
        };
        if let Some(sink) = this.sink.take() {
            sink.record(RpcEvent::new(this.method, started, elapsed, size, outcome));
        }

        Poll::Ready(res)
    }
}

#[pinned_drop]
impl<F> PinnedDrop for Instrumented<F> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if let (Some(sink), Some(started)) = (this.sink.take(), *this.started) {
            sink.record(RpcEvent::new(
                this.method,
                started,
                started.elapsed(),
                0,
                Outcome::Status {
                    code: StatusCode::CANCELLED,
                    message: "call dropped before completion".to_string(),
                },
            ));
        }
    }
}
