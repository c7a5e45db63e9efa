use serde::{Deserialize, Serialize};

#[repr(u8)]
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Memory,
    #[default]
    Sqlite,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 作成リクエストが失敗したとき Add のまま残す（次回も作成として再送する）
    pub preserve_add_on_create_failure: bool,
    /// 親エンティティの送信完了後に保留キューを流すかどうか
    pub drain_pending_after_submit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    pub capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./data/warikan.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            sync: SyncConfig::default(),
            cache: CacheConfig {
                backend: CacheBackend::Sqlite,
                capacity: 10_000,
            },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            preserve_add_on_create_failure: true,
            drain_pending_after_submit: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー検索関数から設定を組み立てる（テストでは環境変数を汚さずに済む）
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("WARIKAN_DATABASE_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.database.url = trimmed.to_string();
            }
        }
        if let Some(v) = lookup("WARIKAN_DB_MAX_CONNECTIONS")
            && let Some(value) = parse_u32(&v)
        {
            cfg.database.max_connections = value;
        }

        if let Some(v) = lookup("WARIKAN_PRESERVE_ADD_ON_FAILURE") {
            cfg.sync.preserve_add_on_create_failure =
                parse_bool(&v, cfg.sync.preserve_add_on_create_failure);
        }
        if let Some(v) = lookup("WARIKAN_DRAIN_PENDING") {
            cfg.sync.drain_pending_after_submit =
                parse_bool(&v, cfg.sync.drain_pending_after_submit);
        }

        if let Some(v) = lookup("WARIKAN_CACHE_BACKEND") {
            match v.trim().to_ascii_lowercase().as_str() {
                "memory" => cfg.cache.backend = CacheBackend::Memory,
                "sqlite" => cfg.cache.backend = CacheBackend::Sqlite,
                other => tracing::warn!(backend = other, "Unknown cache backend, keeping default"),
            }
        }
        if let Some(v) = lookup("WARIKAN_CACHE_CAPACITY")
            && let Some(value) = parse_usize(&v)
        {
            cfg.cache.capacity = value;
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.cache.backend == CacheBackend::Memory && self.cache.capacity == 0 {
            return Err("Cache capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}
