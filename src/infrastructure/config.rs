use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub firestore: FirestoreSettings,
    pub cooling: CoolingSettings,
    pub history: HistorySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Firestore,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// `collection/document` paths of the singleton documents
    pub latest_reading: String,
    pub control_state: String,
    pub cooling_settings: String,
    pub history_collection: String,
    pub memory_history_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirestoreSettings {
    pub api_base: String,
    pub project_id: String,
    pub database: String,
    #[serde(default)]
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoolingSettings {
    pub hysteresis: f64,
    pub relay_channels: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistorySettings {
    pub default_limit: usize,
    pub max_limit: usize,
}

pub fn load_app_config() -> anyhow::Result<AppConfig> {
    load_app_config_from("config/relay")
}

/// Defaults, then the optional config file, then `RELAY__SECTION__KEY`
/// environment variables.
pub fn load_app_config_from(path: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080_i64)?
        .set_default("logging.level", "info")?
        .set_default("store.backend", "memory")?
        .set_default("store.latest_reading", "sensorData/latest")?
        .set_default("store.control_state", "controlState/current")?
        .set_default("store.cooling_settings", "coolingSettings/current")?
        .set_default("store.history_collection", "sensorHistory")?
        .set_default("store.memory_history_capacity", 10_000_i64)?
        .set_default("firestore.api_base", "https://firestore.googleapis.com/v1")?
        .set_default("firestore.project_id", "")?
        .set_default("firestore.database", "(default)")?
        .set_default("firestore.timeout_secs", 10_i64)?
        .set_default("cooling.hysteresis", 2.0)?
        .set_default("cooling.relay_channels", vec!["ssr1", "ssr3", "ssr4"])?
        .set_default("history.default_limit", 50_i64)?
        .set_default("history.max_limit", 500_i64)?
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("RELAY")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cooling.relay_channels")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

impl AppConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if !(self.cooling.hysteresis.is_finite() && self.cooling.hysteresis >= 0.0) {
            anyhow::bail!("cooling.hysteresis must be a non-negative number");
        }
        if self.cooling.relay_channels.is_empty() {
            anyhow::bail!("cooling.relay_channels must name at least one channel");
        }
        if self.history.default_limit == 0 || self.history.default_limit > self.history.max_limit {
            anyhow::bail!("history.default_limit must be between 1 and history.max_limit");
        }
        if self.store.backend == StoreBackend::Firestore && self.firestore.project_id.is_empty() {
            anyhow::bail!("firestore.project_id is required for the firestore backend");
        }
        Ok(())
    }
}
