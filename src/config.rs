use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub sendgrid_api_key: String,
    pub from_email: String,
    pub from_name: String,
    /// Frontend origin used to build clickable links in account emails.
    /// When unset, emails carry the raw token and the API route instead.
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "accountd".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "accountd-users".into()),
            session_ttl_days: std::env::var("JWT_SESSION_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(7),
        };
        let mail = MailConfig {
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY")?,
            from_email: std::env::var("FROM_EMAIL")?,
            from_name: std::env::var("FROM_NAME").unwrap_or_else(|_| "Account Service".into()),
            origin: std::env::var("APP_ORIGIN").ok(),
        };
        Ok(Self {
            database_url,
            jwt,
            mail,
        })
    }
}
