//! Shell-script plugin doubles shared by the integration tests.
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tfschema_plugin::ClientOptions;

pub const PLUGIN_NAME: &str = "fake";
pub const PLUGIN_FILE: &str = "terraform-provider-fake_v1.0.0";

// Writing an executable while another test forks can fail with ETXTBSY.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Hold while installing and starting a plugin.
pub fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install a plugin script that records its pid and environment in `dir`.
pub fn install_plugin(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join(PLUGIN_FILE);
    let script = format!(
        "#!/bin/sh\necho $$ > \"{dir}/plugin.pid\"\nenv > \"{dir}/plugin.env\"\n{body}\n",
        dir = dir.display()
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Print the handshake, then idle until killed.
pub fn serving(handshake: &str) -> String {
    format!("echo '{handshake}'\nexec sleep 60")
}

/// Print the handshake, then exit once `marker` appears.
pub fn serving_until(handshake: &str, marker: &Path) -> String {
    format!(
        "echo '{handshake}'\nwhile [ ! -f \"{}\" ]; do sleep 0.05; done",
        marker.display()
    )
}

pub fn options(root: &Path) -> ClientOptions {
    ClientOptions {
        root_dir: root.to_path_buf(),
        user_plugin_dir: None,
        search_path: false,
        start_timeout: Duration::from_secs(5),
        ..ClientOptions::default()
    }
}

pub fn plugin_pid(dir: &Path) -> u32 {
    std::fs::read_to_string(dir.join("plugin.pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

pub fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
