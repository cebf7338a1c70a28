//! Port planning: turns an endpoint count into contiguous ports split
//! into fixed-capacity buckets, one bucket per worker group.

use crate::error::{EmulatorError, Result};
use swarm_common::MAX_BUCKET_CAPACITY;

/// Address every emulated endpoint listens on.
pub const ANY_HOST: &str = "0.0.0.0";

/// Ports owned by one worker group, in generation order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortBucket {
    first_index: usize,
    ports: Vec<u16>,
}

impl PortBucket {
    /// `first_index` is the endpoint ordinal of `ports[0]`.
    pub fn new(first_index: usize, ports: Vec<u16>) -> Self {
        Self { first_index, ports }
    }

    pub fn first_index(&self) -> usize {
        self.first_index
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = EndpointSpec> + '_ {
        self.ports
            .iter()
            .enumerate()
            .map(move |(i, &port)| EndpointSpec::new(self.first_index + i, port))
    }
}

/// One emulated middleware. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub index: usize,
    pub host: String,
    pub port: u16,
}

impl EndpointSpec {
    pub fn new(index: usize, port: u16) -> Self {
        Self {
            index,
            host: ANY_HOST.to_string(),
            port,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub buckets: Vec<PortBucket>,
    pub endpoints: Vec<EndpointSpec>,
}

impl Plan {
    pub fn total_ports(&self) -> usize {
        self.buckets.iter().map(PortBucket::len).sum()
    }
}

/// Plans `n` endpoints starting at `base_port` with the standard bucket capacity.
pub fn plan(n: i64, base_port: u16) -> Result<Plan> {
    plan_with_capacity(n, base_port, MAX_BUCKET_CAPACITY)
}

/// Port `i` is `base_port + i`; bucket `b` holds indices `[b * capacity, (b + 1) * capacity)`.
/// `n == 0` yields a single empty bucket.
pub fn plan_with_capacity(n: i64, base_port: u16, capacity: usize) -> Result<Plan> {
    if n < 0 {
        return Err(EmulatorError::InvalidConfiguration(format!(
            "number of middlewares must be non-negative, got {}",
            n
        )));
    }
    if capacity == 0 || capacity > MAX_BUCKET_CAPACITY {
        return Err(EmulatorError::InvalidConfiguration(format!(
            "bucket capacity must be within 1..={}, got {}",
            MAX_BUCKET_CAPACITY, capacity
        )));
    }

    let n = n as usize;
    if n > 0 && base_port as usize + n - 1 > u16::MAX as usize {
        return Err(EmulatorError::InvalidConfiguration(format!(
            "{} ports starting at {} exceed the port range",
            n, base_port
        )));
    }

    let port_at = |i: usize| (base_port as usize + i) as u16;

    let endpoints = (0..n).map(|i| EndpointSpec::new(i, port_at(i))).collect();

    let bucket_count = n.div_ceil(capacity).max(1);
    let buckets = (0..bucket_count)
        .map(|b| {
            let start = b * capacity;
            let end = (start + capacity).min(n);
            PortBucket::new(start, (start..end).map(port_at).collect())
        })
        .collect();

    Ok(Plan { buckets, endpoints })
}
