use anyhow::bail;
use clap::Parser;
use core::fmt;
use std::path::PathBuf;

/// Runtime configuration for the `cdrgen` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults that match a local RabbitMQ.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cdrgen",
    version,
    about = "Publishes synthetic usage detail records to RabbitMQ on request"
)]
pub struct CliArgs {
    /// Serve requests from the request queue until SIGINT/SIGTERM.
    ///
    /// Without this flag a single normal record is published and the process
    /// exits.
    ///
    /// Environment variable: `CDRGEN_DAEMON`
    #[arg(short, long, env = "CDRGEN_DAEMON", default_value_t = false)]
    pub daemon: bool,

    /// Environment variable: `RABBIT_HOST`
    #[arg(long, env = "RABBIT_HOST", default_value_t = String::from("127.0.0.1"))]
    pub rabbit_host: String,

    /// Environment variable: `RABBIT_PORT`
    #[arg(long, env = "RABBIT_PORT", default_value_t = 5672)]
    pub rabbit_port: u16,

    /// Environment variable: `RABBIT_USER`
    #[arg(long, env = "RABBIT_USER", default_value_t = String::from("guest"))]
    pub rabbit_user: String,

    /// Environment variable: `RABBIT_PASSWORD`
    #[arg(
        long,
        env = "RABBIT_PASSWORD",
        default_value_t = String::from("guest"),
        hide_env_values = true
    )]
    pub rabbit_password: String,

    /// Environment variable: `RABBIT_VHOST`
    #[arg(long, env = "RABBIT_VHOST", default_value_t = String::from("/"))]
    pub rabbit_vhost: String,

    /// Queue generated records are published to.
    ///
    /// Environment variable: `UDR_QUEUE`
    #[arg(long, env = "UDR_QUEUE", default_value_t = String::from("udr"))]
    pub udr_queue: String,

    /// Queue generation requests are consumed from (daemon mode only).
    ///
    /// Environment variable: `REQUEST_QUEUE`
    #[arg(long, env = "REQUEST_QUEUE", default_value_t = String::from("udr_request"))]
    pub request_queue: String,

    /// Unacknowledged requests the broker may push at once.
    ///
    /// Environment variable: `PREFETCH_COUNT`
    #[arg(long, env = "PREFETCH_COUNT", default_value_t = 16)]
    pub prefetch_count: u16,

    /// Generation tasks allowed to run at once, across all requests.
    ///
    /// Environment variable: `MAX_INFLIGHT_TASKS`
    #[arg(long, env = "MAX_INFLIGHT_TASKS", default_value_t = 64)]
    pub max_inflight_tasks: usize,

    /// Outcomes a request may buffer before its tasks wait on the aggregator.
    ///
    /// Environment variable: `OUTCOME_BACKLOG`
    #[arg(long, env = "OUTCOME_BACKLOG", default_value_t = 100)]
    pub outcome_backlog: usize,

    /// Largest `count` a single request may ask for.
    ///
    /// Environment variable: `MAX_RECORDS_PER_REQUEST`
    #[arg(long, env = "MAX_RECORDS_PER_REQUEST", default_value_t = 1_000_000)]
    pub max_records_per_request: usize,

    /// Log filter used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `LOG_LEVEL`
    #[arg(long, env = "LOG_LEVEL", default_value_t = String::from("info"))]
    pub log_level: String,

    /// Emit JSON lines instead of human-readable logs.
    ///
    /// Environment variable: `LOG_JSON`
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Directory for a daily-rotated log file. Console logging continues
    /// either way.
    ///
    /// Environment variable: `LOG_DIR`
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// File name prefix used under `--log-dir`.
    ///
    /// Environment variable: `LOG_NAME`
    #[arg(long, env = "LOG_NAME", default_value_t = String::from("cdrgen.log"))]
    pub log_name: String,
}

/// Where and how to reach RabbitMQ.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub prefetch_count: u16,
}

impl BrokerConfig {
    /// AMQP URI with credentials and vhost percent-encoded.
    pub fn url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    /// [`Self::url`] with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            urlencoding::encode(&self.user),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &self.redacted_url())
            .field("prefetch_count", &self.prefetch_count)
            .finish()
    }
}

/// Concurrency and size bounds applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_inflight_tasks: usize,
    pub outcome_backlog: usize,
    pub max_records_per_request: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_inflight_tasks: 64,
            outcome_backlog: 100,
            max_records_per_request: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    pub file: Option<LogFile>,
}

/// Rotated log file written alongside the console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub dir: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub daemon: bool,
    pub broker: BrokerConfig,
    pub udr_queue: String,
    pub request_queue: String,
    pub limits: Limits,
    pub log: LogConfig,
}

impl TryFrom<CliArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_inflight_tasks == 0 {
            bail!("MAX_INFLIGHT_TASKS must be greater than 0");
        }

        if args.outcome_backlog == 0 {
            bail!("OUTCOME_BACKLOG must be greater than 0");
        }

        if args.prefetch_count == 0 {
            bail!("PREFETCH_COUNT must be greater than 0");
        }

        if args.udr_queue.trim().is_empty() {
            bail!("UDR_QUEUE must not be empty");
        }

        if args.log_dir.is_some() && args.log_name.trim().is_empty() {
            bail!("LOG_NAME must not be empty when LOG_DIR is set");
        }

        if args.daemon && args.request_queue.trim().is_empty() {
            bail!("REQUEST_QUEUE must not be empty in daemon mode");
        }

        if args.daemon && args.request_queue == args.udr_queue {
            bail!(
                "REQUEST_QUEUE and UDR_QUEUE are both `{}`; requests would be consumed as records",
                args.udr_queue
            );
        }

        Ok(Self {
            daemon: args.daemon,
            broker: BrokerConfig {
                host: args.rabbit_host,
                port: args.rabbit_port,
                user: args.rabbit_user,
                password: args.rabbit_password,
                vhost: args.rabbit_vhost,
                prefetch_count: args.prefetch_count,
            },
            udr_queue: args.udr_queue,
            request_queue: args.request_queue,
            limits: Limits {
                max_inflight_tasks: args.max_inflight_tasks,
                outcome_backlog: args.outcome_backlog,
                max_records_per_request: args.max_records_per_request,
            },
            log: LogConfig {
                level: args.log_level,
                json: args.log_json,
                file: args.log_dir.map(|dir| LogFile {
                    dir,
                    name: args.log_name,
                }),
            },
        })
    }
}
