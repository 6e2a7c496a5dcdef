#[macro_export]
macro_rules! generate_names {
    ($base_name:ident) => {
        $crate::MetricNames {
            success: concat!(stringify!($base_name), "_success"),
            error: concat!(stringify!($base_name), "_error"),
            latency: concat!(stringify!($base_name), "_latency_ms"),
            response_size: concat!(stringify!($base_name), "_response_bytes"),
        }
    };
}

/// Names under which RPC outcomes are published to the `metrics` facade.
#[derive(Copy, Clone, Debug)]
pub struct MetricNames {
    pub success: &'static str,
    pub error: &'static str,
    pub latency: &'static str,
    pub response_size: &'static str,
}

pub const RPC_METRICS: MetricNames = generate_names!(swarmer_rpc);

/// Label key carrying the RPC method path.
pub const METHOD_LABEL: &str = "method";
