//! Telemetry and metrics collection

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

use crate::deploy::registry::DeploymentRegistry;
use crate::models::deployment::DeploymentStatus;

/// Host metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMetrics {
    /// CPU usage percentage (0-100)
    pub cpu_usage: f32,

    /// Number of CPU cores
    pub cpu_count: usize,

    /// Memory usage in bytes
    pub memory_used: u64,

    /// Total memory in bytes
    pub memory_total: u64,

    /// Memory usage percentage
    pub memory_percent: f32,

    /// Disk usage in bytes
    pub disk_used: u64,

    /// Total disk space in bytes
    pub disk_total: u64,

    /// Disk usage percentage
    pub disk_percent: f32,

    /// System uptime in seconds
    pub uptime_secs: u64,

    /// Hostname
    pub hostname: String,
}

/// Collect host metrics
pub fn collect_host_metrics() -> HostMetrics {
    let mut sys = System::new_all();
    sys.refresh_all();

    let disks = Disks::new_with_refreshed_list();

    // Total usage across all mounted disks
    let (disk_used, disk_total) = disks.iter().fold((0u64, 0u64), |(used, total), disk| {
        (
            used + (disk.total_space() - disk.available_space()),
            total + disk.total_space(),
        )
    });

    let memory_used = sys.used_memory();
    let memory_total = sys.total_memory();

    HostMetrics {
        cpu_usage: sys.global_cpu_usage(),
        cpu_count: sys.cpus().len(),
        memory_used,
        memory_total,
        memory_percent: if memory_total > 0 {
            (memory_used as f32 / memory_total as f32) * 100.0
        } else {
            0.0
        },
        disk_used,
        disk_total,
        disk_percent: if disk_total > 0 {
            (disk_used as f32 / disk_total as f32) * 100.0
        } else {
            0.0
        },
        uptime_secs: System::uptime(),
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
    }
}

/// Orchestrator metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    /// Host metrics
    pub host: HostMetrics,

    /// Orchestrator version
    pub version: String,

    /// Number of tracked deployments
    pub deployments_tracked: usize,

    /// Deployments still being driven toward a terminal state
    pub deployments_active: usize,

    /// Deployments that reached READY
    pub deployments_ready: usize,

    /// Deployments that ended in TIMEOUT or ERROR
    pub deployments_failed: usize,
}

/// Collect orchestrator metrics
pub fn collect_metrics(registry: &DeploymentRegistry, version: &str) -> OrchestratorMetrics {
    let deployments = registry.all();

    let deployments_active = deployments
        .iter()
        .filter(|d| !d.status.is_terminal())
        .count();
    let deployments_ready = deployments
        .iter()
        .filter(|d| d.status == DeploymentStatus::Ready)
        .count();
    let deployments_failed = deployments
        .iter()
        .filter(|d| matches!(d.status, DeploymentStatus::Timeout | DeploymentStatus::Error))
        .count();

    OrchestratorMetrics {
        host: collect_host_metrics(),
        version: version.to_string(),
        deployments_tracked: deployments.len(),
        deployments_active,
        deployments_ready,
        deployments_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::deployment::Deployment;

    #[test]
    fn test_deployment_gauges() {
        let registry = DeploymentRegistry::new();
        registry.insert(Deployment::new("1", Utc::now(), None));
        registry.insert(Deployment::new("2", Utc::now(), None));
        registry.update("2", |d| d.status = DeploymentStatus::Ready);

        let metrics = collect_metrics(&registry, "1.2.3");

        assert_eq!(metrics.version, "1.2.3");
        assert_eq!(metrics.deployments_tracked, 2);
        assert_eq!(metrics.deployments_active, 1);
        assert_eq!(metrics.deployments_ready, 1);
        assert_eq!(metrics.deployments_failed, 0);
    }
}
