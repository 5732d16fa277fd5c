//! TCP connect probe: a target is alive when its port accepts a connection.

use std::time::Instant;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;

use super::{Probe, ProbeResult};
use crate::error::{HealthError, HealthResult};
use crate::target::ProbeTarget;

#[derive(Debug, Clone, Default)]
pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn execute(&self, target: &ProbeTarget) -> HealthResult<ProbeResult> {
        let started = Instant::now();
        let addr = target.socket_addr();

        match TcpStream::connect(&addr).await {
            Ok(_stream) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                trace!(target_addr = %addr, latency_ms, "TCP heartbeat answered");
                Ok(ProbeResult::success(target.id.clone(), latency_ms))
            }
            Err(e) => Err(HealthError::ProbeFailed {
                target: target.id.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
