//! Process configuration.
//!
//! Every option is a command-line flag with an environment variable
//! fallback. `Config::from_args` validates the raw values once at startup;
//! any problem is a `DemandError::Configuration` and the server never binds.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::adapters::sheets::{
    AuthorizedUserInfo, SheetRanges, DEFAULT_ACTIVITY_RANGE, DEFAULT_SLOTS_RANGE,
};
use crate::web::auth::Credentials;
use crate::DemandError;

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogMode {
    Stdout,
    File,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Therapist demand estimator web app", long_about = None)]
pub struct Args {
    /// Basic-auth username
    #[arg(long, env = "AUTH_USERNAME")]
    pub auth_username: String,

    /// Basic-auth password
    #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
    pub auth_password: String,

    /// Base64-encoded authorized-user credentials for the Sheets API
    #[arg(long, env = "ENCODED_TOKEN", hide_env_values = true)]
    pub encoded_token: Option<String>,

    /// Spreadsheet holding the reference tables
    #[arg(long, env = "THERAPIST_EXPERIENCE_ID")]
    pub spreadsheet_id: Option<String>,

    /// Read reference tables from this JSON file instead of Sheets
    #[arg(long, env = "REFERENCE_DATA_FILE")]
    pub reference_data_file: Option<PathBuf>,

    /// Range of the slots-by-area-and-language table
    #[arg(long, env = "SLOTS_RANGE", default_value = DEFAULT_SLOTS_RANGE)]
    pub slots_range: String,

    /// Range of the per-therapist activity table
    #[arg(long, env = "ACTIVITY_RANGE", default_value = DEFAULT_ACTIVITY_RANGE)]
    pub activity_range: String,

    /// Directory with usage_model.json and label_encoders.json
    #[arg(long, env = "MODEL_DIR", default_value = "models")]
    pub model_dir: PathBuf,

    /// File with the base64 Ed25519 public key that signs model artifacts
    #[arg(long, env = "MODEL_SIGNING_PUBKEY_B64_FILE")]
    pub model_signing_pubkey_b64_file: Option<PathBuf>,

    /// Refuse to start with unsigned model artifacts
    #[arg(long, env = "REQUIRE_SIGNED_MODEL")]
    pub require_signed_model: bool,

    /// Seconds to reuse fetched reference data (0 fetches on every request)
    #[arg(long, env = "REFERENCE_CACHE_TTL_SECS", default_value_t = 300)]
    pub reference_cache_ttl_secs: u64,

    /// Timeout for each Sheets request, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8050)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_address: IpAddr,

    /// Log destination
    #[arg(long, env = "LOG_MODE", value_enum, default_value_t = LogMode::Stdout)]
    pub log_mode: LogMode,

    /// Log file used when LOG_MODE=file
    #[arg(long, env = "LOG_FILE", default_value = "therapist-demand.log")]
    pub log_file: PathBuf,
}

/// Where reference tables come from.
#[derive(Debug, Clone)]
pub enum ReferenceConfig {
    Sheets {
        credentials: AuthorizedUserInfo,
        spreadsheet_id: String,
        ranges: SheetRanges,
    },
    File(PathBuf),
}

/// Model artifact settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub dir: PathBuf,
    pub pubkey_file: Option<PathBuf>,
    pub require_signature: bool,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub reference: ReferenceConfig,
    pub model: ModelConfig,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    pub addr: SocketAddr,
}

impl Config {
    /// Validate parsed arguments.
    ///
    /// # Errors
    /// Returns `DemandError::Configuration` for empty credentials, missing
    /// Sheets settings without a reference file, or a zero fetch timeout.
    pub fn from_args(args: &Args) -> Result<Self, DemandError> {
        let credentials = Credentials::new(&args.auth_username, &args.auth_password)
            .map_err(DemandError::Configuration)?;

        let reference = match &args.reference_data_file {
            Some(path) => ReferenceConfig::File(path.clone()),
            None => {
                let token = args
                    .encoded_token
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| {
                        DemandError::Configuration(
                            "ENCODED_TOKEN is required unless REFERENCE_DATA_FILE is set".into(),
                        )
                    })?;
                let spreadsheet_id = args
                    .spreadsheet_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        DemandError::Configuration(
                            "THERAPIST_EXPERIENCE_ID is required unless REFERENCE_DATA_FILE is set"
                                .into(),
                        )
                    })?;
                ReferenceConfig::Sheets {
                    credentials: AuthorizedUserInfo::from_encoded(token)?,
                    spreadsheet_id: spreadsheet_id.to_string(),
                    ranges: SheetRanges {
                        slots: args.slots_range.clone(),
                        activity: args.activity_range.clone(),
                    },
                }
            }
        };

        if args.fetch_timeout_secs == 0 {
            return Err(DemandError::Configuration(
                "FETCH_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            credentials,
            reference,
            model: ModelConfig {
                dir: args.model_dir.clone(),
                pubkey_file: args.model_signing_pubkey_b64_file.clone(),
                require_signature: args.require_signed_model,
            },
            cache_ttl: Duration::from_secs(args.reference_cache_ttl_secs),
            fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
            addr: SocketAddr::new(args.bind_address, args.port),
        })
    }
}
