use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Fieldtrack tracking server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "fieldtrack-server", version, about = "Fieldtrack tracking server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "FIELDTRACK_PORT", default_value = "8320")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "FIELDTRACK_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./fieldtrack.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "FIELDTRACK_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT signing key)
    #[arg(long, env = "FIELDTRACK_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Per-identity in-memory history cap (samples kept for the admin snapshot)
    #[arg(long, env = "FIELDTRACK_HISTORY_CAP", default_value = "200")]
    pub history_cap: usize,

    /// Access token lifetime in seconds
    #[arg(long, env = "FIELDTRACK_TOKEN_TTL_SECS", default_value = "86400")]
    pub token_ttl_secs: i64,

    /// Capacity of the durable-store write queue
    #[arg(long, env = "FIELDTRACK_STORE_QUEUE_CAPACITY", default_value = "1024")]
    pub store_queue_capacity: usize,

    /// Mint an access token for the given identity, print it, and exit.
    /// Creates the identity in the user store if it does not exist.
    #[arg(long, value_name = "IDENTITY")]
    pub mint_token: Option<String>,

    /// Grant the admin role to the identity being minted (with --mint-token)
    #[arg(long)]
    pub admin: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8320,
            bind_address: "0.0.0.0".to_string(),
            config: "./fieldtrack.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            history_cap: 200,
            token_ttl_secs: 86400,
            store_queue_capacity: 1024,
            mint_token: None,
            admin: false,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (FIELDTRACK_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("FIELDTRACK_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Fieldtrack Tracking Server Configuration
# Place this file at ./fieldtrack.toml or specify with --config <path>
# All settings can be overridden via environment variables (FIELDTRACK_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8320)
# port = 8320

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# Per-identity in-memory history cap. Bounds the recent-sample buffer kept
# per tracked identity for the admin snapshot (default: 200)
# history_cap = 200

# Access token lifetime in seconds (default: 86400 = 24 hours)
# token_ttl_secs = 86400

# Capacity of the durable-store write queue. Appends beyond this are dropped
# rather than back-pressuring the real-time path (default: 1024)
# store_queue_capacity = 1024
"#
    .to_string()
}
