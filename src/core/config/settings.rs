use std::path::PathBuf;

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_events_backend, parse_store_backend, parse_u16, parse_u32, parse_u64,
};
use super::secret::{default_secret_file_path, load_or_create_secret_key};
use super::types::{
    ApiSettings, CheckerSettings, ConfigError, CorsSettings, DatabaseSettings, EventSettings,
    EventsBackend, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, StoreBackend, StoreSettings, TelemetrySettings,
};

const MAX_CHECKER_INTERVAL_SECONDS: u64 = 3600;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("PROCTOR_HOST", "0.0.0.0");
        let port = env_or_default("PROCTOR_PORT", "8000");

        let environment =
            parse_environment(env_optional("PROCTOR_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("PROCTOR_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Proctor API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let (secret_key, secret_key_from_env) = match env_optional("SECRET_KEY") {
            Some(value) => (value, true),
            None => {
                let path = env_optional("SECRET_KEY_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_secret_file_path);
                (load_or_create_secret_key(&path), false)
            }
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let store_backend = parse_store_backend(env_optional("STORE_BACKEND"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "proctor");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "proctor_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "20"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");
        let channel_prefix = env_or_default("REDIS_CHANNEL_PREFIX", "proctor:test");

        let events_backend = parse_events_backend(env_optional("EVENTS_BACKEND"))?;
        let broadcast_capacity = parse_u64(
            "EVENTS_BROADCAST_CAPACITY",
            env_or_default("EVENTS_BROADCAST_CAPACITY", "1024"),
        )? as usize;

        let checker_interval_seconds = parse_u64(
            "CHECKER_INTERVAL_SECONDS",
            env_or_default("CHECKER_INTERVAL_SECONDS", "60"),
        )?;
        // The in-memory store is process-local, so the checker has to live next to it.
        let checker_in_process = env_optional("CHECKER_IN_PROCESS")
            .map(|value| parse_bool(&value))
            .unwrap_or(store_backend == StoreBackend::Memory);

        let log_level = env_or_default("PROCTOR_LOG_LEVEL", "info");
        let json = env_optional("PROCTOR_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings {
                secret_key,
                secret_key_from_env,
                algorithm,
            },
            cors: CorsSettings { origins: cors_origins },
            store: StoreSettings { backend: store_backend },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
                channel_prefix,
            },
            events: EventSettings { backend: events_backend, broadcast_capacity },
            checker: CheckerSettings {
                interval_seconds: checker_interval_seconds,
                in_process: checker_in_process,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn events(&self) -> &EventSettings {
        &self.events
    }

    pub(crate) fn checker(&self) -> &CheckerSettings {
        &self.checker
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.checker.interval_seconds == 0
            || self.checker.interval_seconds > MAX_CHECKER_INTERVAL_SECONDS
        {
            return Err(ConfigError::InvalidValue {
                field: "CHECKER_INTERVAL_SECONDS",
                value: self.checker.interval_seconds.to_string(),
            });
        }

        if self.events.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EVENTS_BROADCAST_CAPACITY",
                value: String::from("0"),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if !self.security.secret_key_from_env {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }

        if self.store.backend == StoreBackend::Memory {
            return Err(ConfigError::InvalidValue {
                field: "STORE_BACKEND",
                value: self.store.backend.as_str().to_string(),
            });
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.events.backend == EventsBackend::Redis && self.redis.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "REDIS_HOST",
                value: String::from("<empty>"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn memory_backend_runs_checker_in_process_by_default() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::remove_var("CHECKER_IN_PROCESS");

        let settings = Settings::load().expect("settings");

        assert_eq!(settings.store().backend, StoreBackend::Memory);
        assert!(settings.checker().in_process);
        assert_eq!(settings.checker().interval_seconds, 60);
    }

    #[tokio::test]
    async fn zero_checker_interval_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("CHECKER_INTERVAL_SECONDS", "0");

        let result = Settings::load();
        std::env::remove_var("CHECKER_INTERVAL_SECONDS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "CHECKER_INTERVAL_SECONDS", .. })
        ));
    }

    #[tokio::test]
    async fn strict_mode_refuses_memory_store() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("PROCTOR_STRICT_CONFIG", "1");

        let result = Settings::load();
        std::env::set_var("PROCTOR_STRICT_CONFIG", "0");

        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "STORE_BACKEND", .. })));
    }
}
