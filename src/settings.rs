//! Runtime settings from the environment.

use crate::error::SettingsError;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub listen_addr: String,
    pub jwt_secret: String,
    pub jwt_expire_secs: i64,
    /// Table looked up by `login`.
    pub user_table: String,
    /// Request audit table; `None` disables audit logging.
    pub audit_table: Option<String>,
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub rule_timeout: Duration,
    pub batch_limit: usize,
    pub body_limit_bytes: usize,
}

fn var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, SettingsError> {
    match var(key) {
        Some(v) => v.parse().map_err(|_| SettingsError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

impl Settings {
    /// Defaults for everything except the database url and signing secret.
    pub fn new(database_url: &str, jwt_secret: &str) -> Self {
        Settings {
            database_url: database_url.to_string(),
            listen_addr: "0.0.0.0:3000".into(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expire_secs: 7200,
            user_table: "sys_user".into(),
            audit_table: Some("sys_log".into()),
            default_page_size: 10,
            max_page_size: 1000,
            rule_timeout: Duration::from_millis(5000),
            batch_limit: 100,
            body_limit_bytes: 1024 * 1024,
        }
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        let database_url = var("DATABASE_URL").ok_or(SettingsError::Missing("DATABASE_URL"))?;
        let jwt_secret = var("JWT_SECRET").ok_or(SettingsError::Missing("JWT_SECRET"))?;
        let d = Settings::new(&database_url, &jwt_secret);
        let audit_table = match std::env::var("AUDIT_TABLE") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(v.trim().to_string()),
            Err(_) => d.audit_table.clone(),
        };
        let settings = Settings {
            listen_addr: var("LISTEN_ADDR").unwrap_or(d.listen_addr.clone()),
            jwt_expire_secs: parsed("JWT_EXPIRE_SECS", d.jwt_expire_secs)?,
            user_table: var("USER_TABLE").unwrap_or(d.user_table.clone()),
            audit_table,
            default_page_size: parsed("DEFAULT_PAGE_SIZE", d.default_page_size)?,
            max_page_size: parsed("MAX_PAGE_SIZE", d.max_page_size)?,
            rule_timeout: Duration::from_millis(parsed("RULE_TIMEOUT_MS", 5000u64)?),
            batch_limit: parsed("BATCH_LIMIT", d.batch_limit)?,
            body_limit_bytes: parsed("BODY_LIMIT_BYTES", d.body_limit_bytes)?,
            ..d
        };
        if settings.default_page_size == 0 {
            return Err(SettingsError::Invalid {
                key: "DEFAULT_PAGE_SIZE",
                value: "0".into(),
            });
        }
        if settings.max_page_size == 0 {
            return Err(SettingsError::Invalid {
                key: "MAX_PAGE_SIZE",
                value: "0".into(),
            });
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::new("postgres://localhost/app", "secret");
        assert_eq!(s.user_table, "sys_user");
        assert_eq!(s.audit_table.as_deref(), Some("sys_log"));
        assert_eq!(s.default_page_size, 10);
        assert_eq!(s.rule_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unset_variable_takes_default() {
        let n: u64 = parsed("METACRUD_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(n, 42);
    }
}
