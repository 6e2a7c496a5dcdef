#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod connection;
mod error;
mod grpc;
mod interceptor;
mod population;
mod sequence;
mod sink;
mod task;
mod think;
mod transport;
mod user;

#[cfg(test)]
mod testing;

pub use connection::{Capability, CapabilitySet, Clients, Connection};
pub use error::{ActionError, ConfigError, MeasureError, RpcError};
pub use grpc::{normalize_endpoint, GrpcConnector, GrpcTransport, RawCodec};
pub use interceptor::{response_size, Instrumented, Interceptor, Measurable};
pub use population::{target_counts, Census, Population, PopulationHandle};
pub use sequence::Sequence;
#[cfg(feature = "metrics")]
pub use sink::MetricsExporter;
pub use sink::{EventExporter, MetricSink};
pub use task::{Action, ActionFn, ActionResult, FailurePolicy, Flow, Order, Step, TaskSet};
pub use transport::{Connector, ResponseStream, Transport};
pub use user::{UserClass, UserContext, UserExit, UserId, UserState, VirtualUser};

pub use futures_util::future::BoxFuture;
#[doc(hidden)]
pub use prost;
pub use swarmer_core as core;
pub use swarmer_macros::action;

pub mod prelude {
    pub use crate::{
        action, measurable, ActionError, ActionResult, Capability, Connection, FailurePolicy,
        Flow, GrpcConnector, Population, RpcError, Sequence, TaskSet, UserClass, UserContext,
    };
    pub use swarmer_core::{PopulationSettings, RunStatistics, ThinkTime};
}
