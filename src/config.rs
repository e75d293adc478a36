use std::env;

/// Default PostgreSQL server port.
pub const DEFAULT_PORT: u16 = 5432;

/// Connection parameters for [`QueryExecutor::connect`](crate::QueryExecutor::connect).
///
/// Unset user, password and port fall back to the `PGUSER`, `PGPASSWORD`
/// and `PGPORT` environment variables, then to the driver defaults.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub host: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn effective_user(&self) -> Option<String> {
        self.user.clone().or_else(|| env::var("PGUSER").ok())
    }

    pub fn effective_password(&self) -> Option<String> {
        self.password.clone().or_else(|| env::var("PGPASSWORD").ok())
    }

    pub fn effective_port(&self) -> u16 {
        self.port
            .or_else(|| env::var("PGPORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT)
    }

    /// Builds the tokio-postgres configuration.
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .dbname(&self.database)
            .port(self.effective_port());
        if let Some(user) = self.effective_user() {
            config.user(&user);
        }
        if let Some(password) = self.effective_password() {
            config.password(password);
        }
        config
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_values_win() {
        let options = ConnectOptions::new("db.local", "app")
            .user("svc")
            .password("secret")
            .port(6543);
        assert_eq!(options.effective_user().as_deref(), Some("svc"));
        assert_eq!(options.effective_password().as_deref(), Some("secret"));
        assert_eq!(options.effective_port(), 6543);

        let config = options.to_pg_config();
        assert_eq!(config.get_dbname(), Some("app"));
        assert_eq!(config.get_user(), Some("svc"));
        assert_eq!(config.get_ports(), &[6543]);
    }

    #[test]
    fn test_debug_hides_password() {
        let options = ConnectOptions::new("h", "d").password("secret");
        let rendered = format!("{:?}", options);
        assert!(!rendered.contains("secret"));
    }
}
