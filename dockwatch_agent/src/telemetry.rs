//! Host telemetry using sysinfo.

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::path::Path;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use tokio::sync::Mutex;
use tracing::warn;

use crate::types::MetricSnapshot;

/// Marks a reading that could not be taken.
pub const UNAVAILABLE: i64 = -1;

#[async_trait]
pub trait TelemetrySampler: Send + Sync {
    async fn sample(&self) -> MetricSnapshot;
}

// Report only the root filesystem instead of every mounted disk.
// Enable with DOCKWATCH_AGENT_ROOT_DISK_ONLY=1.
fn root_disk_only() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("DOCKWATCH_AGENT_ROOT_DISK_ONLY")
            .map(|v| v != "0")
            .unwrap_or(false)
    })
}

fn to_metric(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn memory_usage(total: u64, available: u64) -> (i64, i64) {
    if total == 0 {
        return (UNAVAILABLE, UNAVAILABLE);
    }
    (to_metric(total.saturating_sub(available)), to_metric(total))
}

/// (mount point, total, available) triples to used/total lists, one entry per distinct mount.
fn disk_usage<'a, I>(disks: I, root_only: bool) -> (Vec<i64>, Vec<i64>)
where
    I: IntoIterator<Item = (&'a Path, u64, u64)>,
{
    let mut seen = HashSet::new();
    let mut used = Vec::new();
    let mut total = Vec::new();
    for (mount, t, avail) in disks {
        if t == 0 || !seen.insert(mount) {
            continue;
        }
        if root_only && mount != Path::new("/") {
            continue;
        }
        used.push(to_metric(t.saturating_sub(avail)));
        total.push(to_metric(t));
    }
    if used.is_empty() {
        return (vec![UNAVAILABLE], vec![UNAVAILABLE]);
    }
    (used, total)
}

/// Persistent sysinfo handles; keeping `System` alive gives CPU usage a baseline.
pub struct SysinfoSampler {
    sys: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
}

impl SysinfoSampler {
    pub async fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh_kind);
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();

        Self {
            sys: Mutex::new(sys),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }
}

#[async_trait]
impl TelemetrySampler for SysinfoSampler {
    async fn sample(&self) -> MetricSnapshot {
        let (cpus, (used_ram, total_ram)) = {
            let mut sys = self.sys.lock().await;
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                sys.refresh_cpu_usage();
                sys.refresh_memory();
            })) {
                warn!("sysinfo refresh panicked: {e:?}");
            }
            let cpus: Vec<f64> = sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect();
            if cpus.is_empty() {
                warn!("no cpu usage available");
            }
            (cpus, memory_usage(sys.total_memory(), sys.available_memory()))
        };

        let (used_disks, total_disks) = {
            let mut disks = self.disks.lock().await;
            disks.refresh(true);
            disk_usage(
                disks
                    .list()
                    .iter()
                    .map(|d| (d.mount_point(), d.total_space(), d.available_space())),
                root_disk_only(),
            )
        };
        if used_disks == [UNAVAILABLE] {
            warn!("no disk usage available");
        }

        let (sent, received) = {
            let mut nets = self.networks.lock().await;
            nets.refresh(true);
            if nets.iter().next().is_none() {
                warn!("no network interfaces visible");
                (UNAVAILABLE, UNAVAILABLE)
            } else {
                nets.iter().fold((0i64, 0i64), |(tx, rx), (_, data)| {
                    (
                        tx.saturating_add(to_metric(data.total_transmitted())),
                        rx.saturating_add(to_metric(data.total_received())),
                    )
                })
            }
        };

        MetricSnapshot {
            cpu_percent_per_core: cpus,
            used_ram_bytes: used_ram,
            total_ram_bytes: total_ram,
            used_disk_bytes: used_disks,
            total_disk_bytes: total_disks,
            network_bytes_sent: sent,
            network_bytes_received: received,
            captured_at: Utc::now(),
        }
    }
}
