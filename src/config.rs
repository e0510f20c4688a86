use crate::components::event_store::models::AppointmentType;
use crate::error::{config_error, env_error, Error, SyncResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default endpoint file, relative to the working directory
pub const DEFAULT_ENDPOINTS_FILE: &str = "config/endpoints.toml";
/// Default IANA zone sent along with every outgoing timestamp
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
/// Default prefix for change notification channels
pub const DEFAULT_CHANNEL_PREFIX: &str = "changes:";

/// The four webhook URLs serving one appointment calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentEndpoints {
    pub fetch: Url,
    pub add: Url,
    pub update: Url,
    pub delete: Url,
}

impl AppointmentEndpoints {
    fn urls_mut(&mut self) -> [&mut Url; 4] {
        [&mut self.fetch, &mut self.add, &mut self.update, &mut self.delete]
    }
}

/// Layout of the endpoints file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EndpointsFile {
    #[serde(default)]
    appointments: BTreeMap<String, AppointmentEndpoints>,
}

/// Main configuration structure for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Endpoints keyed by appointment type name
    pub appointments: BTreeMap<String, AppointmentEndpoints>,
    /// IANA time zone for outgoing events and naive incoming timestamps
    pub timezone: String,
    /// Upper bound for every single HTTP attempt
    pub request_timeout_secs: u64,
    /// Redis server carrying change notifications, if any
    pub redis_url: Option<String>,
    /// Prefix prepended to topic names to form pub/sub channels
    pub change_channel_prefix: String,
    /// Locale used for user-facing messages
    pub bot_locale: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            appointments: BTreeMap::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            redis_url: None,
            change_channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            bot_locale: "en".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and the endpoints file
    pub fn load() -> SyncResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let endpoints_path = env::var("SHOWROOM_ENDPOINTS_FILE")
            .unwrap_or_else(|_| DEFAULT_ENDPOINTS_FILE.to_string());

        let mut config = if Path::new(&endpoints_path).exists() {
            let content = fs::read_to_string(&endpoints_path)?;
            Self::from_toml_str(&content)?
        } else {
            warn!("Endpoints file {} not found, no calendars configured", endpoints_path);
            Self::default()
        };

        if let Ok(timezone) = env::var("SHOWROOM_TIMEZONE") {
            config.timezone = timezone;
        }

        if let Ok(timeout) = env::var("SHOWROOM_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = timeout
                .parse::<u64>()
                .map_err(|_| env_error("SHOWROOM_REQUEST_TIMEOUT_SECS"))?;
        }

        config.redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        if let Ok(prefix) = env::var("SHOWROOM_CHANNEL_PREFIX") {
            config.change_channel_prefix = prefix;
        }

        if let Ok(locale) = env::var("SHOWROOM_LOCALE") {
            config.bot_locale = locale;
        }

        config.validate()?;
        debug!("Loaded {} appointment calendars", config.appointments.len());

        Ok(config)
    }

    /// Build a configuration from the contents of an endpoints file
    pub fn from_toml_str(content: &str) -> SyncResult<Self> {
        let file: EndpointsFile = toml::from_str(content)?;
        let config = Self {
            appointments: file.appointments,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that cannot be expressed by the types alone
    pub fn validate(&self) -> SyncResult<()> {
        self.tz()?;
        if self.request_timeout_secs == 0 {
            return Err(config_error("request_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Parsed configured time zone
    pub fn tz(&self) -> SyncResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| Error::Config(format!("Unknown time zone: {}", self.timezone)))
    }

    /// Timeout applied to each individual HTTP attempt
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// All configured appointment types
    pub fn appointment_types(&self) -> Vec<AppointmentType> {
        self.appointments
            .keys()
            .map(|name| AppointmentType::new(name.clone()))
            .collect()
    }

    /// Endpoints serving the given appointment type
    pub fn endpoints(&self, appointment_type: &AppointmentType) -> SyncResult<AppointmentEndpoints> {
        self.appointments
            .get(appointment_type.as_str())
            .cloned()
            .ok_or_else(|| Error::UnknownAppointmentType(appointment_type.to_string()))
    }

    /// Replace the endpoints of one appointment type
    pub fn set_endpoints(&mut self, appointment_type: &AppointmentType, endpoints: AppointmentEndpoints) {
        self.appointments
            .insert(appointment_type.as_str().to_string(), endpoints);
    }

    /// Move every endpoint under `old_base` to `new_base`, returning how many URLs changed.
    ///
    /// An endpoint is under `old_base` when it has the same origin and its path
    /// continues the base path at a segment boundary.
    pub fn rebase_endpoints(&mut self, old_base: &str, new_base: &str) -> SyncResult<usize> {
        let old = parse_base(old_base)?;
        let new = parse_base(new_base)?;
        let old_path = old.path().trim_end_matches('/');
        let new_path = new.path().trim_end_matches('/');

        let mut rewritten = 0;
        for endpoints in self.appointments.values_mut() {
            for url in endpoints.urls_mut() {
                if url.origin() != old.origin() {
                    continue;
                }
                let Some(rest) = url.path().strip_prefix(old_path) else {
                    continue;
                };
                if !rest.is_empty() && !rest.starts_with('/') {
                    continue;
                }

                let mut moved = new.clone();
                moved.set_path(&format!("{}{}", new_path, rest));
                moved.set_query(url.query());
                *url = moved;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

fn parse_base(base: &str) -> SyncResult<Url> {
    Url::parse(base).map_err(|e| Error::Config(format!("Invalid base URL {}: {}", base, e)))
}
