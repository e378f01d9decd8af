use std::{net::IpAddr, path::PathBuf, sync::LazyLock};

use serde::{Deserialize, Serialize};

pub static CONFIG: LazyLock<DynAppConfig> = LazyLock::new(get_config);

/// Process-wide settings, loaded once at startup from the environment.
///
/// `ICEHOUSE__`-prefixed variables map onto fields with `__` as the nesting
/// separator; the two well-known bare variables `DATABASE_URL` and
/// `ICEBERG_WAREHOUSE_PATH` are merged on top.
#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct DynAppConfig {
    /// DSN of the catalog store.
    pub database_url: String,
    /// Absolute directory all relative metadata paths resolve against.
    pub iceberg_warehouse_path: PathBuf,
    pub bind_ip: IpAddr,
    pub listen_port: u16,
    pub max_request_body_size: usize,
    pub max_request_time_seconds: u64,
}

impl Default for DynAppConfig {
    fn default() -> Self {
        DynAppConfig {
            database_url: "sqlite://icehouse-catalog.db".to_string(),
            iceberg_warehouse_path: PathBuf::from("/var/lib/icehouse/warehouse"),
            bind_ip: IpAddr::from([0, 0, 0, 0]),
            listen_port: 8181,
            max_request_body_size: 1024 * 1024,
            max_request_time_seconds: 30,
        }
    }
}

fn get_config() -> DynAppConfig {
    let defaults = figment::providers::Serialized::defaults(DynAppConfig::default());

    #[cfg(not(test))]
    let prefixes = &["ICEHOUSE__"];
    #[cfg(test)]
    let prefixes = &["ICEHOUSE_TEST__"];

    let mut config = figment::Figment::from(defaults);
    for prefix in prefixes {
        let env = figment::providers::Env::prefixed(prefix).split("__");
        config = config.merge(env);
    }
    config = config.merge(
        figment::providers::Env::raw().only(&["DATABASE_URL", "ICEBERG_WAREHOUSE_PATH"]),
    );

    match config.extract::<DynAppConfig>() {
        Ok(c) => c,
        Err(e) => {
            panic!("Failed to extract Icehouse config: {e}");
        }
    }
}
