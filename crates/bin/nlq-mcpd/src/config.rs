use clap::{Parser, builder::BoolishValueParser};
use nlq_core::PipelineOptions;
use nlq_core::extract::{CorrectionSet, ExtractionOptions};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SERVER_COMMAND: &str = "npx";
const DEFAULT_SERVER_ARGS: &str = "-y,@tsmztech/mcp-server-salesforce";
const DEFAULT_SERVER_ENV: &str = "SALESFORCE_CONNECTION_TYPE,SALESFORCE_USERNAME,SALESFORCE_PASSWORD,SALESFORCE_TOKEN,SALESFORCE_INSTANCE_URL,SALESFORCE_CLIENT_ID,SALESFORCE_CLIENT_SECRET";
const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4040";
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:4050";
const DEFAULT_DISCOVERY_TTL_SECS: u64 = 300;
const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DISCOVERY_RETRY_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_MIN_CONFIDENCE: f64 = 0.1;
const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SAMPLE_SIZE: usize = 3;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HTTP_MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "nlq-mcpd", version, about = "Natural-language query MCP daemon.")]
#[allow(clippy::struct_excessive_bools)]
struct CliArgs {
    /// Program that starts the remote tool server.
    #[arg(long, env = "NLQ_SERVER_COMMAND", default_value = DEFAULT_SERVER_COMMAND)]
    server_command: String,

    #[arg(
        long,
        env = "NLQ_SERVER_ARGS",
        value_delimiter = ',',
        default_value = DEFAULT_SERVER_ARGS
    )]
    server_args: Vec<String>,

    /// Environment variables forwarded to the tool server process.
    #[arg(
        long,
        env = "NLQ_SERVER_ENV",
        value_delimiter = ',',
        default_value = DEFAULT_SERVER_ENV
    )]
    server_env: Vec<String>,

    #[arg(
        long,
        env = "NLQ_DISCOVERY_TTL_SECS",
        default_value_t = DEFAULT_DISCOVERY_TTL_SECS
    )]
    discovery_ttl_secs: u64,

    #[arg(
        long,
        env = "NLQ_DISCOVERY_TIMEOUT_SECS",
        default_value_t = DEFAULT_DISCOVERY_TIMEOUT_SECS
    )]
    discovery_timeout_secs: u64,

    /// Seconds to keep serving a stale catalog after discovery fails.
    #[arg(
        long,
        env = "NLQ_DISCOVERY_RETRY_SECS",
        default_value_t = DEFAULT_DISCOVERY_RETRY_SECS
    )]
    discovery_retry_secs: u64,

    #[arg(long, env = "NLQ_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: usize,

    #[arg(long, env = "NLQ_MIN_CONFIDENCE", default_value_t = DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f64,

    #[arg(
        long,
        env = "NLQ_INVOKE_TIMEOUT_SECS",
        default_value_t = DEFAULT_INVOKE_TIMEOUT_SECS
    )]
    invoke_timeout_secs: u64,

    #[arg(long, env = "NLQ_SAMPLE_SIZE", default_value_t = DEFAULT_SAMPLE_SIZE)]
    sample_size: usize,

    /// TOML file with correction rules, argument defaults, and projections.
    #[arg(long, env = "NLQ_RULES_FILE")]
    rules_file: Option<PathBuf>,

    #[arg(
        long,
        env = "NLQ_PREFETCH",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    prefetch: bool,

    #[arg(
        long = "stdio",
        env = "NLQ_ENABLE_STDIO",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(
        long,
        env = "NLQ_MCP_SERVE",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    mcp_serve: bool,

    #[arg(
        long,
        env = "NLQ_HTTP_SERVE",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    http_serve: bool,

    #[arg(long, env = "NLQ_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,

    #[arg(long, env = "NLQ_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    http_addr: SocketAddr,

    #[arg(
        long,
        env = "NLQ_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_HTTP_TIMEOUT_SECS
    )]
    http_timeout_secs: u64,

    #[arg(
        long,
        env = "NLQ_HTTP_MAX_BODY_BYTES",
        default_value_t = DEFAULT_HTTP_MAX_BODY_BYTES
    )]
    http_max_body_bytes: usize,
}

/// How to launch the remote tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
}

/// Runtime configuration loaded from CLI arguments, environment variables,
/// and the optional rules file.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct NlqConfig {
    pub server: ServerCommand,
    pub pipeline: PipelineOptions,
    pub prefetch: bool,
    pub enable_stdio: bool,
    pub mcp_serve: bool,
    pub http_serve: bool,
    pub mcp_http_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub http_timeout: Duration,
    pub http_max_body_bytes: usize,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
    RulesFile { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
            Self::RulesFile { path, message } => {
                write!(f, "invalid rules file {}: {message}", path.display())
            }
        }
    }
}

impl Error for ConfigError {}

/// Contents of the optional TOML rules file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RulesFile {
    extraction: ExtractionOptions,
}

impl RulesFile {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::RulesFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let rules: Self = toml::from_str(text).map_err(|err| ConfigError::RulesFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        CorrectionSet::from_names(&rules.extraction.corrections).map_err(|err| ConfigError::RulesFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(rules)
    }
}

impl NlqConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

impl TryFrom<CliArgs> for NlqConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.server_command.trim().is_empty() {
            return Err(ConfigError::MissingSetting("NLQ_SERVER_COMMAND"));
        }
        if args.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "NLQ_MAX_ATTEMPTS",
                value: args.max_attempts.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&args.min_confidence) {
            return Err(ConfigError::InvalidSetting {
                name: "NLQ_MIN_CONFIDENCE",
                value: args.min_confidence.to_string(),
            });
        }
        if args.invoke_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "NLQ_INVOKE_TIMEOUT_SECS",
                value: args.invoke_timeout_secs.to_string(),
            });
        }
        if args.discovery_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "NLQ_DISCOVERY_TIMEOUT_SECS",
                value: args.discovery_timeout_secs.to_string(),
            });
        }
        if !args.enable_stdio && !args.mcp_serve && !args.http_serve {
            return Err(ConfigError::MissingSetting("NLQ_ENABLE_STDIO, NLQ_MCP_SERVE or NLQ_HTTP_SERVE"));
        }

        let discovery_ttl = if args.discovery_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(args.discovery_ttl_secs))
        };
        let extraction = match args.rules_file.as_deref() {
            Some(path) => RulesFile::load(path)?.extraction,
            None => ExtractionOptions::default(),
        };
        let pipeline = PipelineOptions::default()
            .with_discovery_ttl(discovery_ttl)
            .with_discovery_timeout(Duration::from_secs(args.discovery_timeout_secs))
            .with_discovery_retry(Duration::from_secs(args.discovery_retry_secs))
            .with_max_attempts(args.max_attempts)
            .with_min_confidence(args.min_confidence)
            .with_invoke_timeout(Duration::from_secs(args.invoke_timeout_secs))
            .with_sample_size(args.sample_size)
            .with_extraction(extraction);

        let server = ServerCommand {
            program: args.server_command,
            args: args.server_args.into_iter().filter(|arg| !arg.trim().is_empty()).collect(),
            env: args.server_env.into_iter().map(|name| name.trim().to_string()).filter(|name| !name.is_empty()).collect(),
        };

        Ok(Self {
            server,
            pipeline,
            prefetch: args.prefetch,
            enable_stdio: args.enable_stdio,
            mcp_serve: args.mcp_serve,
            http_serve: args.http_serve,
            mcp_http_addr: args.mcp_http_addr,
            http_addr: args.http_addr,
            http_timeout: Duration::from_secs(args.http_timeout_secs),
            http_max_body_bytes: args.http_max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            server_command: DEFAULT_SERVER_COMMAND.to_string(),
            server_args: DEFAULT_SERVER_ARGS.split(',').map(str::to_string).collect(),
            server_env: DEFAULT_SERVER_ENV.split(',').map(str::to_string).collect(),
            discovery_ttl_secs: DEFAULT_DISCOVERY_TTL_SECS,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            discovery_retry_secs: DEFAULT_DISCOVERY_RETRY_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            invoke_timeout_secs: DEFAULT_INVOKE_TIMEOUT_SECS,
            sample_size: DEFAULT_SAMPLE_SIZE,
            rules_file: None,
            prefetch: true,
            enable_stdio: false,
            mcp_serve: true,
            http_serve: true,
            mcp_http_addr: DEFAULT_MCP_HTTP_ADDR.parse().expect("valid MCP addr"),
            http_addr: DEFAULT_HTTP_ADDR.parse().expect("valid HTTP addr"),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            http_max_body_bytes: DEFAULT_HTTP_MAX_BODY_BYTES,
        }
    }

    #[test]
    fn defaults_launch_the_salesforce_server() {
        let config = NlqConfig::try_from(base_args()).expect("config should parse");

        assert_eq!(config.server.program, "npx");
        assert_eq!(config.server.args, ["-y", "@tsmztech/mcp-server-salesforce"]);
        assert!(config.server.env.contains(&"SALESFORCE_USERNAME".to_string()));
        assert_eq!(config.pipeline.discovery_ttl, Some(Duration::from_secs(300)));
        assert_eq!(config.pipeline.discovery_timeout, Duration::from_secs(30));
        assert_eq!(config.pipeline.discovery_retry, Duration::from_secs(30));
        assert_eq!(config.pipeline.extraction, ExtractionOptions::default());
    }

    #[test]
    fn zero_ttl_never_expires() {
        let mut args = base_args();
        args.discovery_ttl_secs = 0;

        let config = NlqConfig::try_from(args).expect("config should parse");

        assert_eq!(config.pipeline.discovery_ttl, None);
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let mut args = base_args();
        args.max_attempts = 0;
        assert!(matches!(
            NlqConfig::try_from(args),
            Err(ConfigError::InvalidSetting { name: "NLQ_MAX_ATTEMPTS", .. })
        ));

        let mut args = base_args();
        args.min_confidence = 1.5;
        assert!(matches!(
            NlqConfig::try_from(args),
            Err(ConfigError::InvalidSetting { name: "NLQ_MIN_CONFIDENCE", .. })
        ));

        let mut args = base_args();
        args.discovery_timeout_secs = 0;
        assert!(matches!(
            NlqConfig::try_from(args),
            Err(ConfigError::InvalidSetting { name: "NLQ_DISCOVERY_TIMEOUT_SECS", .. })
        ));

        let mut args = base_args();
        args.enable_stdio = false;
        args.mcp_serve = false;
        args.http_serve = false;
        assert!(matches!(NlqConfig::try_from(args), Err(ConfigError::MissingSetting(_))));
    }

    #[test]
    fn parses_rules_file() {
        let text = r#"
[extraction]
corrections = ["normalize_quotes", "default_projection"]

[extraction.defaults]
"salesforce_query_records.limit" = 200

[extraction.projections]
Invoice__c = ["Id", "Name", "Amount__c"]
"#;
        let rules = RulesFile::parse(Path::new("rules.toml"), text).expect("rules parse");

        assert_eq!(rules.extraction.corrections, ["normalize_quotes", "default_projection"]);
        assert_eq!(
            rules.extraction.defaults["salesforce_query_records.limit"],
            serde_json::json!(200)
        );
        assert_eq!(rules.extraction.projections["Invoice__c"], ["Id", "Name", "Amount__c"]);
    }

    #[test]
    fn rules_file_rejects_unknown_rules() {
        let text = "[extraction]\ncorrections = [\"guess_everything\"]\n";
        let err = RulesFile::parse(Path::new("rules.toml"), text).expect_err("unknown rule");
        assert!(err.to_string().contains("guess_everything"));
    }
}
