// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

/// `RUST_LOG` filtering, `info` when unset.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Read a TOML config file. A missing file means defaults; an unreadable or
/// malformed one is logged and also falls back to defaults.
pub fn load_config<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> T {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<T>(&s) {
            Ok(cfg) => {
                info!("loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("{}: {e}; using defaults", path.display());
                T::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => T::default(),
        Err(e) => {
            warn!("{}: {e}; using defaults", path.display());
            T::default()
        }
    }
}
