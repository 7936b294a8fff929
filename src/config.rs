use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct MlConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    /// Argon2 time cost (iterations).
    pub password_hash_cost: u32,
    pub ml: MlConfig,
    /// Empty means no cross-origin access; a single `*` means any origin.
    pub cors_origins: Vec<String>,
    pub auth_rate_limit: RateLimitConfig,
    /// Reverse proxies in front of the service. The client address is read
    /// from the `X-Forwarded-For` entry the outermost of them appended;
    /// 0 ignores the header and uses the socket peer.
    pub trusted_proxy_hops: usize,
    pub environment: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => {
                let password = get("DB_PASSWORD", "");
                let credentials = if password.is_empty() {
                    get("DB_USER", "postgres")
                } else {
                    format!("{}:{}", get("DB_USER", "postgres"), password)
                };
                format!(
                    "postgres://{}@{}:{}/{}",
                    credentials,
                    get("DB_HOST", "localhost"),
                    get("DB_PORT", "5432"),
                    get("DB_NAME", "diabea"),
                )
            }
        };

        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))?,
            issuer: get("JWT_ISSUER", "diabea"),
            audience: get("JWT_AUDIENCE", "diabea-users"),
            ttl_minutes: parse_or(&lookup, "JWT_TTL_MINUTES", 60 * 24),
        };

        let ml = MlConfig {
            base_url: get("ML_API_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: parse_or(&lookup, "ML_TIMEOUT_SECS", 30),
        };

        let cors_origins = get(
            "CORS_ALLOWED_ORIGINS",
            "http://localhost:3001,http://127.0.0.1:3001",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        Ok(Self {
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10),
            jwt,
            password_hash_cost: parse_or(&lookup, "PASSWORD_HASH_COST", 2),
            ml,
            cors_origins,
            auth_rate_limit: RateLimitConfig {
                max_attempts: parse_or(&lookup, "AUTH_RATE_LIMIT_MAX", 10),
                window_secs: parse_or(&lookup, "AUTH_RATE_LIMIT_WINDOW_SECS", 15 * 60),
            },
            trusted_proxy_hops: parse_or(&lookup, "TRUST_PROXY_HOPS", 1),
            environment: get("APP_ENV", "production"),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
