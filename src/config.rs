use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCacheConfig {
    pub enabled: bool,
    /// A cached token is only handed out while at least this much lifetime remains.
    pub min_remaining_seconds: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    pub admin_password: Option<String>,
    pub demo_products: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub token_cache: TokenCacheConfig,
    pub seed: SeedConfig,
}

/// One year.
pub const MAX_TTL_MINUTES: i64 = 365 * 24 * 60;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "backoffice".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "backoffice-users".into()),
            ttl_minutes: parse_or(&lookup, "JWT_TTL_MINUTES", 60)?,
        };
        anyhow::ensure!(!jwt.secret.is_empty(), "JWT_SECRET must not be empty");
        anyhow::ensure!(
            (1..=MAX_TTL_MINUTES).contains(&jwt.ttl_minutes),
            "JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}"
        );

        let token_cache = TokenCacheConfig {
            enabled: parse_or(&lookup, "TOKEN_CACHE_ENABLED", true)?,
            min_remaining_seconds: parse_or(&lookup, "TOKEN_CACHE_MIN_REMAINING_SECONDS", 300)?,
        };
        if token_cache.enabled {
            let ttl_seconds = jwt.ttl_minutes * 60;
            anyhow::ensure!(
                (0..ttl_seconds).contains(&token_cache.min_remaining_seconds),
                "TOKEN_CACHE_MIN_REMAINING_SECONDS must be at least 0 and below the token lifetime \
                 ({ttl_seconds}s from JWT_TTL_MINUTES); otherwise no cached token is ever reused"
            );
        }

        let seed = SeedConfig {
            admin_password: lookup("SEED_ADMIN_PASSWORD").filter(|v| !v.is_empty()),
            demo_products: parse_or(&lookup, "SEED_DEMO_PRODUCTS", false)?,
        };

        Ok(Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "APP_PORT", 8080)?,
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            token_cache,
            seed,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.jwt.issuer, "backoffice");
        assert_eq!(cfg.jwt.audience, "backoffice-users");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert!(cfg.token_cache.enabled);
        assert_eq!(cfg.token_cache.min_remaining_seconds, 300);
        assert!(cfg.seed.admin_password.is_none());
        assert!(!cfg.seed.demo_products);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("APP_PORT", "9090"),
            ("DATABASE_URL", "postgres://localhost/backoffice"),
            ("JWT_TTL_MINUTES", "15"),
            ("TOKEN_CACHE_ENABLED", "false"),
            ("SEED_ADMIN_PASSWORD", "changeme1"),
            ("SEED_DEMO_PRODUCTS", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/backoffice"));
        assert_eq!(cfg.jwt.ttl_minutes, 15);
        assert!(!cfg.token_cache.enabled);
        assert_eq!(cfg.seed.admin_password.as_deref(), Some("changeme1"));
        assert!(cfg.seed.demo_products);
    }

    #[test]
    fn token_lifetime_is_bounded() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_TTL_MINUTES", "10000000000"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JWT_TTL_MINUTES"));

        let max = MAX_TTL_MINUTES.to_string();
        assert!(AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_TTL_MINUTES", max.as_str()),
        ]))
        .is_ok());
    }

    #[test]
    fn cache_window_must_fit_inside_the_token_lifetime() {
        for window in ["-3600", "3600", "7200"] {
            let err = AppConfig::from_lookup(lookup_from(&[
                ("JWT_SECRET", "s3cret"),
                ("JWT_TTL_MINUTES", "60"),
                ("TOKEN_CACHE_MIN_REMAINING_SECONDS", window),
            ]))
            .unwrap_err();
            assert!(
                err.to_string().contains("TOKEN_CACHE_MIN_REMAINING_SECONDS"),
                "{window}"
            );
        }

        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_TTL_MINUTES", "60"),
            ("TOKEN_CACHE_MIN_REMAINING_SECONDS", "3599"),
        ]))
        .unwrap();
        assert_eq!(cfg.token_cache.min_remaining_seconds, 3599);

        // Not checked while the cache is off.
        assert!(AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_CACHE_ENABLED", "false"),
            ("TOKEN_CACHE_MIN_REMAINING_SECONDS", "-1"),
        ]))
        .is_ok());
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("APP_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }
}
