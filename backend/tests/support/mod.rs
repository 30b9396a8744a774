//! Shared helpers for tests that touch process-wide configuration.

use std::io::Write;
use std::sync::Mutex;

use lgs_rust::config::CONFIG_PATH_ENV;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Every variable `LgsConfig::load` consults.
pub const CONFIG_VARS: [&str; 6] = [
    CONFIG_PATH_ENV,
    "HOST",
    "PORT",
    "LGS_AUTO_SHUTTER",
    "LGS_GATEWAY_ADDRESS",
    "LGS_COLLISION_FEED_URL",
];

/// Run `f` with every configuration variable cleared except those in `set`.
///
/// Tests run in parallel within one process, so access is serialized and the
/// previous values are restored on drop, including on panic.
pub fn with_config_env<F, R>(set: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _restore = EnvRestore::capture();

    for key in CONFIG_VARS {
        std::env::remove_var(key);
    }
    for (key, value) in set {
        std::env::set_var(key, value);
    }
    f()
}

/// Write `content` to a temporary TOML file kept alive by the returned handle.
pub fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

struct EnvRestore(Vec<(&'static str, Option<String>)>);

impl EnvRestore {
    fn capture() -> Self {
        Self(
            CONFIG_VARS
                .iter()
                .map(|key| (*key, std::env::var(key).ok()))
                .collect(),
        )
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.0.drain(..) {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}
