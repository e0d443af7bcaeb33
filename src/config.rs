use std::{env, net::SocketAddr, str::FromStr};

use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailTransport {
    /// Writes outgoing mail to the log instead of delivering it.
    #[default]
    Log,
    Ses,
}

impl FromStr for MailTransport {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(MailTransport::Log),
            "ses" => Ok(MailTransport::Ses),
            other => Err(AppError::Config(format!(
                "invalid MAIL_TRANSPORT: {other} (expected log or ses)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    /// Public address of this API, used in confirmation links.
    pub api_base_url: String,
    /// Address of the web frontend, used for redirects.
    pub web_base_url: String,
    pub mail_transport: MailTransport,
    pub mail_from_name: String,
    pub mail_from_address: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://plann.db?mode=rwc".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3333".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let api_base_url = base_url(
            "API_BASE_URL",
            &env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3333".to_string()),
        )?;
        let web_base_url = base_url(
            "WEB_BASE_URL",
            &env::var("WEB_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        )?;

        let mail_transport = match env::var("MAIL_TRANSPORT") {
            Ok(value) => value.parse()?,
            Err(_) => MailTransport::default(),
        };
        let mail_from_name = display_name(
            "MAIL_FROM_NAME",
            &env::var("MAIL_FROM_NAME").unwrap_or_else(|_| "Equipe plann.er".to_string()),
        )?;
        let mail_from_address =
            env::var("MAIL_FROM_ADDRESS").unwrap_or_else(|_| "oi@plann.er".to_string());

        Ok(Self {
            database_url,
            listen_addr,
            api_base_url,
            web_base_url,
            mail_transport,
            mail_from_name,
            mail_from_address,
        })
    }

    pub fn trip_url(&self, trip_id: impl std::fmt::Display) -> String {
        format!("{}/trips/{trip_id}", self.web_base_url)
    }

    pub fn confirmation_url(
        &self,
        trip_id: impl std::fmt::Display,
        participant_id: impl std::fmt::Display,
    ) -> String {
        format!(
            "{}/trips/{trip_id}/confirm/{participant_id}",
            self.api_base_url
        )
    }
}

/// Validates an absolute http(s) URL and strips any trailing slash.
pub fn base_url(name: &str, raw: &str) -> Result<String, AppError> {
    let parsed =
        Url::parse(raw).map_err(|err| AppError::Config(format!("invalid {name}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Config(format!(
            "invalid {name}: unsupported scheme {}",
            parsed.scheme()
        )));
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

/// Sender names go into the mail header unencoded, so only printable ASCII
/// is allowed.
pub fn display_name(name: &str, raw: &str) -> Result<String, AppError> {
    let value = raw.trim();
    if let Some(bad) = value.chars().find(|ch| !(ch.is_ascii() && !ch.is_ascii_control())) {
        return Err(AppError::Config(format!(
            "invalid {name}: unsupported character {bad:?} (printable ASCII only)"
        )));
    }
    Ok(value.to_string())
}
