use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub notifications: NotificationsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub functions_url: Option<String>,
    #[serde(skip_serializing)]
    pub functions_anon_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 0 disables the snapshot deadline
    pub snapshot_timeout_ms: u64,
    pub channel_capacity: usize,
    pub max_pending_events: usize,
    pub reload_on_reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// How long `start` waits for change streams before loading anyway
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub enable_request_logging: bool,
}

impl SyncConfig {
    pub fn snapshot_timeout(&self) -> Option<Duration> {
        (self.snapshot_timeout_ms > 0).then(|| Duration::from_millis(self.snapshot_timeout_ms))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout_ms: 0,
            channel_capacity: crate::realtime::subscriber::DEFAULT_CHANNEL_CAPACITY,
            max_pending_events: crate::realtime::mirror::DEFAULT_MAX_PENDING,
            reload_on_reconnect: false,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 10,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { capacity: crate::notifications::DEFAULT_CAPACITY }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Backend overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.backend.database_url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.backend.max_connections = v.parse().unwrap_or(self.backend.max_connections);
        }
        if let Ok(v) = env::var("FUNCTIONS_URL") {
            self.backend.functions_url = Some(v);
        }
        if let Ok(v) = env::var("FUNCTIONS_ANON_KEY") {
            self.backend.functions_anon_key = Some(v);
        }

        // Sync overrides
        if let Ok(v) = env::var("SYNC_SNAPSHOT_TIMEOUT_MS") {
            self.sync.snapshot_timeout_ms = v.parse().unwrap_or(self.sync.snapshot_timeout_ms);
        }
        if let Ok(v) = env::var("SYNC_CHANNEL_CAPACITY") {
            self.sync.channel_capacity = v.parse().unwrap_or(self.sync.channel_capacity);
        }
        if let Ok(v) = env::var("SYNC_MAX_PENDING_EVENTS") {
            self.sync.max_pending_events = v.parse().unwrap_or(self.sync.max_pending_events);
        }
        if let Ok(v) = env::var("SYNC_RELOAD_ON_RECONNECT") {
            self.sync.reload_on_reconnect = v.parse().unwrap_or(self.sync.reload_on_reconnect);
        }
        if let Ok(v) = env::var("SYNC_RECONNECT_DELAY_MS") {
            self.sync.reconnect_delay_ms = v.parse().unwrap_or(self.sync.reconnect_delay_ms);
        }
        if let Ok(v) = env::var("SYNC_CONNECT_TIMEOUT_MS") {
            self.sync.connect_timeout_ms = v.parse().unwrap_or(self.sync.connect_timeout_ms);
        }
        if let Ok(v) = env::var("SYNC_MAX_RECONNECT_ATTEMPTS") {
            self.sync.max_reconnect_attempts = v.parse().unwrap_or(self.sync.max_reconnect_attempts);
        }

        // Notification overrides
        if let Ok(v) = env::var("NOTIFICATIONS_CAPACITY") {
            self.notifications.capacity = v.parse().unwrap_or(self.notifications.capacity);
        }

        // API overrides
        if let Some(v) = env::var("API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }
        if let Ok(v) = env::var("API_CORS_ORIGINS") {
            self.api.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            backend: BackendConfig {
                database_url: None,
                max_connections: 5,
                functions_url: None,
                functions_anon_key: None,
            },
            sync: SyncConfig {
                snapshot_timeout_ms: 30_000,
                reload_on_reconnect: false,
                ..SyncConfig::default()
            },
            notifications: NotificationsConfig::default(),
            api: ApiConfig {
                port: 3000,
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                enable_request_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            backend: BackendConfig {
                database_url: None,
                max_connections: 10,
                functions_url: None,
                functions_anon_key: None,
            },
            sync: SyncConfig {
                snapshot_timeout_ms: 15_000,
                reload_on_reconnect: true,
                reconnect_delay_ms: 2000,
                ..SyncConfig::default()
            },
            notifications: NotificationsConfig::default(),
            api: ApiConfig {
                port: 3000,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                enable_request_logging: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            backend: BackendConfig {
                database_url: None,
                max_connections: 20,
                functions_url: None,
                functions_anon_key: None,
            },
            sync: SyncConfig {
                snapshot_timeout_ms: 10_000,
                reload_on_reconnect: true,
                reconnect_delay_ms: 5000,
                max_reconnect_attempts: 30,
                ..SyncConfig::default()
            },
            notifications: NotificationsConfig::default(),
            api: ApiConfig {
                port: 8080,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                enable_request_logging: false,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
