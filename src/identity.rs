//! Process identity collection for registration.
//!
//! The relay records where each client runs: pid lineage, user, host, and —
//! when running under an orchestrator — node name, pod IP, and namespace.
//! Everything here is best-effort: fields default to 0/None on platforms or
//! environments where they cannot be read.

use std::env;

use serde::{Deserialize, Serialize};

/// Well-known path of the serviceaccount namespace file inside a pod.
const K8S_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Process metadata carried inside the `register` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: i32,
    #[serde(default)]
    pub ppid: i32,
    #[serde(default)]
    pub uid: i32,
    #[serde(default)]
    pub gid: i32,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub executable: Option<String>,
}

/// Collects the identity of the current process.
pub fn collect() -> ProcessInfo {
    ProcessInfo {
        pid: std::process::id() as i32,
        ppid: parent_pid(),
        uid: user_id(),
        gid: group_id(),
        hostname: hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default(),
        node_name: env::var("NODE_NAME").ok(),
        pod_ip: env::var("POD_IP").ok(),
        namespace: orchestration_namespace(),
        start_time: Some(chrono::Utc::now().timestamp_millis()),
        executable: env::current_exe()
            .ok()
            .map(|p| p.to_string_lossy().into_owned()),
    }
}

/// Namespace from the serviceaccount file, falling back to `POD_NAMESPACE`.
fn orchestration_namespace() -> Option<String> {
    std::fs::read_to_string(K8S_NAMESPACE_FILE)
        .ok()
        .map(|s| s.trim().to_string())
        .or_else(|| env::var("POD_NAMESPACE").ok())
}

#[cfg(unix)]
fn parent_pid() -> i32 {
    nix::unistd::getppid().as_raw()
}

#[cfg(not(unix))]
fn parent_pid() -> i32 {
    0
}

#[cfg(unix)]
fn user_id() -> i32 {
    nix::unistd::getuid().as_raw() as i32
}

#[cfg(not(unix))]
fn user_id() -> i32 {
    0
}

#[cfg(unix)]
fn group_id() -> i32 {
    nix::unistd::getgid().as_raw() as i32
}

#[cfg(not(unix))]
fn group_id() -> i32 {
    0
}
