//! `webtail` binary: serve a file (or a demo clock) to a browser over a `WebSocket`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use webtail_core::{BufferSource, FileSource, SharedSource, SourceFactory, StartAt};
use webtail_server::config::DEFAULT_ADDR;
use webtail_server::{Container, ServerConfig, WebtailServer};

/// How long to wait for the server and producer tasks after Ctrl-C.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Stream the growing tail of a source to a browser.
#[derive(Parser, Debug)]
#[command(name = "webtail", version, about)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "WEBTAIL_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// File to tail. Without it, a demo clock is streamed.
    #[arg(long, env = "WEBTAIL_FILE")]
    file: Option<PathBuf>,

    /// Start tailing at the current end of the file instead of the beginning.
    #[arg(long, env = "WEBTAIL_FROM_END")]
    from_end: bool,

    /// How often the demo producer appends a timestamp, in milliseconds.
    #[arg(long, env = "WEBTAIL_DEMO_INTERVAL_MS", default_value_t = 1_000)]
    demo_interval_ms: u64,

    /// Flush period in milliseconds.
    #[arg(long, env = "WEBTAIL_FLUSH_INTERVAL_MS", default_value_t = 1_000)]
    flush_interval_ms: u64,

    /// Idle-read deadline in seconds; pings go out at 9/10 of it.
    #[arg(long, env = "WEBTAIL_IDLE_TIMEOUT_SECS", default_value_t = 60)]
    idle_timeout_secs: u64,

    /// Per-frame write deadline in seconds.
    #[arg(long, env = "WEBTAIL_WRITE_TIMEOUT_SECS", default_value_t = 10)]
    write_timeout_secs: u64,

    /// Largest inbound frame accepted from the client, in bytes.
    #[arg(long, env = "WEBTAIL_MAX_MESSAGE_SIZE", default_value_t = 512)]
    max_message_size: usize,

    /// Log output format.
    #[arg(long, env = "WEBTAIL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            addr: self.addr.clone(),
            flush_interval_ms: self.flush_interval_ms,
            idle_timeout_secs: self.idle_timeout_secs,
            write_timeout_secs: self.write_timeout_secs,
            max_message_size: self.max_message_size,
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Container for tailing `path`.
///
/// Once the file is removed and fully read, the source reports exhaustion and
/// the factory starts a fresh source that follows the path from the start of
/// whatever file appears there next.
fn file_container(path: PathBuf, from_end: bool) -> Container {
    let start_at = if from_end { StartAt::End } else { StartAt::Beginning };
    let initial: SharedSource = Arc::new(FileSource::with_start(path.clone(), start_at));
    let factory: SourceFactory =
        Arc::new(move || Ok(Arc::new(FileSource::new(path.clone())) as SharedSource));
    Container::new(Some(initial), Some(factory))
}

/// Append the current time to `buffer` every `period` until cancelled.
/// Cancellation leaves the buffer open.
fn spawn_demo_producer(
    buffer: Arc<BufferSource>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    buffer.write_str(&format!("{}\n", chrono::Local::now().to_rfc3339()));
                }
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging(args.log_format);

    let config = args.server_config();
    config.validate().context("invalid server configuration")?;
    if args.demo_interval_ms == 0 {
        anyhow::bail!("--demo-interval-ms must be greater than zero");
    }

    let metrics = webtail_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let (container, demo) = match &args.file {
        Some(path) => {
            tracing::info!(path = %path.display(), from_end = args.from_end, "tailing file");
            (file_container(path.clone(), args.from_end), None)
        }
        None => {
            tracing::info!(interval_ms = args.demo_interval_ms, "no --file given, streaming demo clock");
            let buffer = Arc::new(BufferSource::new());
            (Container::with_source(buffer.clone()), Some(buffer))
        }
    };

    let server = WebtailServer::new(config, container).with_metrics(metrics);
    let (addr, server_task) = server.listen().await.context("failed to bind listener")?;
    tracing::info!(%addr, "open http://{addr}/ in a browser");

    let mut tasks = vec![server_task];
    if let Some(buffer) = demo {
        tasks.push(spawn_demo_producer(
            buffer,
            Duration::from_millis(args.demo_interval_ms),
            server.shutdown().child_token(),
        ));
    }

    server.shutdown().wait_for_signal().await;
    if !server.shutdown().drain(tasks, Some(SHUTDOWN_TIMEOUT)).await {
        tracing::warn!("some tasks did not stop in time");
    }
    tracing::info!("shutdown complete");
    Ok(())
}
