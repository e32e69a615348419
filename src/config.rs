//! Startup configuration: a small toml file plus environment overrides and
//! CLI flags, validated once at boot. Mirrors this codebase family's
//! load-then-override-then-validate shape, trimmed to the handful of knobs
//! a dispatch core actually needs.

use crate::error::RouterError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Address the public-facing proxy listener binds to.
    pub listen: SocketAddr,
    /// Address the admin listener (`/healthz`, `/metrics`) binds to.
    pub admin_listen: SocketAddr,
    /// Value recorded in the `X-Vcap-Router` trace header.
    pub router_ip: String,
    /// Upper bound on time spent waiting for the upstream to respond.
    pub upstream_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".parse().unwrap(),
            admin_listen: "0.0.0.0:8081".parse().unwrap(),
            router_ip: "0.0.0.0".to_string(),
            upstream_timeout_secs: 60,
        }
    }
}

impl RouterConfig {
    /// Load from an optional toml file, then apply `ROUTER_*` env overrides,
    /// then validate. A missing path is not an error — defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, RouterError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)
                    .map_err(|e| RouterError::Config(format!("{}: {}", path.display(), e)))?
            }
            None => RouterConfig::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ROUTER_LISTEN") {
            if let Ok(addr) = v.parse() {
                self.listen = addr;
            }
        }
        if let Ok(v) = std::env::var("ROUTER_ADMIN_LISTEN") {
            if let Ok(addr) = v.parse() {
                self.admin_listen = addr;
            }
        }
        if let Ok(v) = std::env::var("ROUTER_IP") {
            self.router_ip = v;
        }
        if let Ok(v) = std::env::var("ROUTER_UPSTREAM_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.upstream_timeout_secs = secs;
            }
        }
    }

    fn validate(&self) -> Result<(), RouterError> {
        if self.listen == self.admin_listen {
            return Err(RouterError::Config(
                "listen and admin_listen must differ".to_string(),
            ));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(RouterError::Config(
                "upstream_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RouterConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_identical_listeners() {
        let mut config = RouterConfig::default();
        config.admin_listen = config.listen;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = RouterConfig::default();
        config.upstream_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_toml() {
        let raw = r#"
            listen = "127.0.0.1:9000"
            admin_listen = "127.0.0.1:9001"
            router_ip = "10.1.1.1"
            upstream_timeout_secs = 30
        "#;
        let config: RouterConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.router_ip, "10.1.1.1");
        assert_eq!(config.upstream_timeout_secs, 30);
    }
}
