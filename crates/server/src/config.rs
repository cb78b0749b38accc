use std::{collections::HashMap, fs};

use collab::{lock::DEFAULT_LOCK_TTL, presence::DEFAULT_PRESENCE_TTL};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub store_url: String,
    pub jwt_secret: String,
    pub frontend_origin: String,
    pub presence_ttl_seconds: u64,
    pub lock_ttl_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8090".into(),
            store_url: "redis://127.0.0.1:6379".into(),
            jwt_secret: "secret".into(),
            frontend_origin: "http://localhost:8080".into(),
            presence_ttl_seconds: DEFAULT_PRESENCE_TTL.as_secs(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL.as_secs(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("store_url") {
                settings.store_url = v.clone();
            }
            if let Some(v) = file_cfg.get("jwt_secret") {
                settings.jwt_secret = v.clone();
            }
            if let Some(v) = file_cfg.get("frontend_origin") {
                settings.frontend_origin = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("REDIS_URL") {
        settings.store_url = v;
    }
    if let Ok(v) = std::env::var("APP__STORE_URL") {
        settings.store_url = v;
    }

    if let Ok(v) = std::env::var("JWT_SECRET") {
        settings.jwt_secret = v;
    }
    if let Ok(v) = std::env::var("APP__JWT_SECRET") {
        settings.jwt_secret = v;
    }

    if let Ok(v) = std::env::var("FRONTEND_URL") {
        settings.frontend_origin = v;
    }
    if let Ok(v) = std::env::var("APP__FRONTEND_ORIGIN") {
        settings.frontend_origin = v;
    }

    if let Ok(v) = std::env::var("APP__PRESENCE_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.presence_ttl_seconds = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__LOCK_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.lock_ttl_seconds = parsed;
        }
    }

    settings
}
