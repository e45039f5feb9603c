use serde::Deserialize;

/// Seven days, the lifetime of a login token.
const DEFAULT_TTL_MINUTES: i64 = 60 * 24 * 7;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "onmyway".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "onmyway-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(DEFAULT_TTL_MINUTES),
        };
        Ok(Self {
            database_url,
            max_connections,
            jwt,
        })
    }

    /// Configuration for a process that keeps all state in memory.
    pub fn ephemeral(secret: &str) -> Self {
        Self {
            database_url: String::new(),
            max_connections: 0,
            jwt: JwtConfig {
                secret: secret.into(),
                issuer: "onmyway".into(),
                audience: "onmyway-users".into(),
                ttl_minutes: DEFAULT_TTL_MINUTES,
            },
        }
    }
}
