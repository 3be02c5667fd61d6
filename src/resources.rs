use parking_lot::Mutex;
use serde_json::{json, Value};
use sysinfo::System;

/// Source of the machine fingerprint and the local resource snapshot.
pub trait ResourceProbe: Send + Sync + 'static {
    /// Identifier of the host, stable across restarts.
    fn machine_id(&self) -> String;

    /// Serializable view of local resources, forwarded verbatim in
    /// `nodeResources` messages.
    fn snapshot(&self) -> Value;
}

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Probe backed by `sysinfo`.
pub struct SystemProbe {
    system: Mutex<System>,
    machine_id: String,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    /// CPU usage is a delta between refreshes, so the baseline is taken
    /// here and each snapshot reports usage since the previous one.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
            machine_id: read_machine_id(),
        }
    }
}

fn read_machine_id() -> String {
    MACHINE_ID_PATHS
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
        .or_else(System::host_name)
        .unwrap_or_else(|| "unknown".to_string())
}

impl ResourceProbe for SystemProbe {
    fn machine_id(&self) -> String {
        self.machine_id.clone()
    }

    fn snapshot(&self) -> Value {
        let mut system = self.system.lock();
        system.refresh_cpu();
        system.refresh_memory();
        let load = System::load_average();

        json!({
            "machineId": self.machine_id,
            "hostName": System::host_name(),
            "os": System::long_os_version(),
            "cpu": {
                "cores": system.cpus().len(),
                "usage": system.global_cpu_info().cpu_usage(),
                "loadAverage": [load.one, load.five, load.fifteen],
            },
            "memory": {
                "total": system.total_memory(),
                "used": system.used_memory(),
                "available": system.available_memory(),
            },
            "swap": {
                "total": system.total_swap(),
                "used": system.used_swap(),
            },
        })
    }
}
