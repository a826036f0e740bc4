//! Health of the counter store and the background workers.
//!
//! Components start unhealthy until something proves otherwise, so a process
//! that never reached its store does not report ready.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Overall or per-component status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Degraded still answers requests.
    pub fn is_serving(&self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

#[derive(Debug, Default)]
struct ComponentState {
    healthy: bool,
    message: Option<String>,
    consecutive_failures: u32,
    changed_at: Option<DateTime<Utc>>,
}

/// Last known state of one component.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    state: RwLock<ComponentState>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(ComponentState {
                healthy: false,
                message: None,
                consecutive_failures: 0,
                changed_at: None,
            }),
        }
    }

    pub fn set_healthy(&self) {
        let mut state = self.state.write();
        if !state.healthy || state.changed_at.is_none() {
            state.changed_at = Some(Utc::now());
        }
        state.healthy = true;
        state.message = None;
        state.consecutive_failures = 0;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        let mut state = self.state.write();
        if state.healthy || state.changed_at.is_none() {
            state.changed_at = Some(Utc::now());
        }
        state.healthy = false;
        state.message = Some(msg.into());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().healthy
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.state.read().message.clone()
    }

    /// Failures reported since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().consecutive_failures
    }

    fn report(&self) -> ComponentHealthReport {
        let state = self.state.read();
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: state.healthy,
            message: state.message.clone(),
            consecutive_failures: state.consecutive_failures,
            since: state.changed_at,
        }
    }
}

/// Health of every component plus the derived overall status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    /// When the component last changed between healthy and unhealthy
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

/// Global health registry.
pub struct HealthRegistry {
    /// Counter store reachability
    pub store: ComponentHealth,
    /// Background jobs (expiry sweeper, store probe)
    pub worker: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            store: ComponentHealth::new("store"),
            worker: ComponentHealth::new("worker"),
        }
    }

    /// Generate a health report.
    ///
    /// Without the store nothing is counted, so a store failure is
    /// unhealthy; a stalled worker only degrades the service.
    pub fn report(&self) -> HealthReport {
        let components = vec![self.store.report(), self.worker.report()];

        let status = if !self.store.is_healthy() {
            HealthStatus::Unhealthy
        } else if components.iter().all(|c| c.healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport { status, components }
    }

    /// Check if the service can accept traffic.
    pub fn is_ready(&self) -> bool {
        self.store.is_healthy()
    }

    /// Check if the service is alive.
    pub fn is_alive(&self) -> bool {
        true
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub static HEALTH: HealthRegistry = HealthRegistry::new();

/// Process-wide health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
