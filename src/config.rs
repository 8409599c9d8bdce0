use envconfig::Envconfig;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {s}")),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    /// Empty means degraded mode: every Redis-backed collaborator fails open.
    #[envconfig(from = "REDIS_URL", default = "")]
    pub redis_url: String,

    #[envconfig(from = "RATE_LIMIT_REQUESTS", default = "100")]
    pub rate_limit_requests: u64,

    #[envconfig(from = "RATE_LIMIT_WINDOW_SECONDS", default = "3600")]
    pub rate_limit_window_seconds: u64,

    #[envconfig(from = "CACHE_TTL_SECONDS", default = "300")]
    pub cache_ttl_seconds: u64,

    #[envconfig(from = "USAGE_LIMIT_PER_GW", default = "2")]
    pub usage_limit_per_gw: u64,

    #[envconfig(from = "UPSTREAM_TIMEOUT_SECONDS", default = "10")]
    pub upstream_timeout_seconds: u64,

    #[envconfig(from = "JOB_RETENTION_SECONDS", default = "86400")]
    pub job_retention_seconds: u64,

    /// Address of the decision engine this service delegates analysis to.
    #[envconfig(from = "ENGINE_URL", default = "http://127.0.0.1:9000")]
    pub engine_url: String,

    #[envconfig(from = "ENGINE_TIMEOUT_SECONDS", default = "25")]
    pub engine_timeout_seconds: u64,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,

    #[envconfig(from = "ENABLE_METRICS", default = "true")]
    pub enable_metrics: FlexBool,
}

impl Config {
    pub fn redis_enabled(&self) -> bool {
        !self.redis_url.is_empty()
    }

    pub fn default_test_config() -> Self {
        Self {
            address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
            redis_url: "".to_string(),
            rate_limit_requests: 100,
            rate_limit_window_seconds: 3600,
            cache_ttl_seconds: 300,
            usage_limit_per_gw: 2,
            upstream_timeout_seconds: 10,
            job_retention_seconds: 86400,
            engine_url: "http://127.0.0.1:9000".to_string(),
            engine_timeout_seconds: 25,
            debug: FlexBool(true),
            enable_metrics: FlexBool(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_test_config() {
        let config = Config::default_test_config();
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.usage_limit_per_gw, 2);
        assert!(!config.redis_enabled());
    }

    #[test]
    fn test_redis_enabled_when_url_present() {
        let mut config = Config::default_test_config();
        config.redis_url = "redis://localhost:6379/".to_string();
        assert!(config.redis_enabled());
    }

    #[test]
    fn test_flex_bool_parses_common_spellings() {
        assert_eq!("true".parse::<FlexBool>().unwrap(), FlexBool(true));
        assert_eq!("YES".parse::<FlexBool>().unwrap(), FlexBool(true));
        assert_eq!("0".parse::<FlexBool>().unwrap(), FlexBool(false));
        assert_eq!("".parse::<FlexBool>().unwrap(), FlexBool(false));
        assert!("bogus".parse::<FlexBool>().is_err());
    }
}
