// ffcompose - media composition daemon / one-shot runner
// Serves organ stimuli over a Unix Domain Socket, or runs a single operation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use ffcompose::organ::{MediaOrgan, Organ, Response, Stimulus};
use ffcompose::{FfmpegEngine, PipelineConfig};

#[derive(Parser)]
#[command(name = "ffcompose", version, about = "FFmpeg media composition pipelines")]
struct Args {
    /// JSON config file (ffmpeg_bin, ffprobe_bin, temp_root)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long, global = true)]
    ffmpeg: Option<String>,

    /// ffprobe executable
    #[arg(long, global = true)]
    ffprobe: Option<String>,

    /// Directory for temporary workspaces
    #[arg(long, global = true)]
    temp_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run one operation and print the JSON response
    Run {
        /// Operation name, e.g. concat.mixed_codec
        #[arg(long)]
        op: String,

        /// Operation input as JSON
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Serve length-prefixed JSON stimuli on a Unix socket
    Serve {
        #[arg(long, default_value = "/tmp/ffcompose.sock")]
        socket_path: String,
    },
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => PipelineConfig::default(),
        };
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg_bin = ffmpeg.clone();
        }
        if let Some(ffprobe) = &self.ffprobe {
            config.ffprobe_bin = ffprobe.clone();
        }
        if let Some(root) = &self.temp_root {
            config.temp_root = Some(root.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.pipeline_config()?;

    if !FfmpegEngine::new(config.ffmpeg_bin.clone()).is_available() {
        error!("{} is not runnable; operations will fail", config.ffmpeg_bin);
    }

    let organ = Arc::new(MediaOrgan::from_config(&config));

    match args.command {
        Cmd::Run { op, input } => run_once(&organ, op, &input).await,
        Cmd::Serve { socket_path } => serve(organ, &socket_path).await,
    }
}

async fn run_once(organ: &MediaOrgan, op: String, input: &str) -> Result<()> {
    let input = serde_json::from_str(input).context("Failed to parse --input")?;
    let response = organ
        .stimulate(Stimulus {
            op,
            input,
            context: HashMap::new(),
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn serve(organ: Arc<MediaOrgan>, socket_path: &str) -> Result<()> {
    info!("Starting ffcompose on {}", socket_path);
    let start_time = std::time::Instant::now();

    // Remove old socket if exists
    let path = PathBuf::from(socket_path);
    if path.exists() {
        std::fs::remove_file(&path).context("Failed to remove old socket")?;
    }

    let listener = UnixListener::bind(&path).context("Failed to bind Unix socket")?;
    info!("Listening on {}", socket_path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let organ = Arc::clone(&organ);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, organ, start_time).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle a single UDS connection
async fn handle_connection(
    mut stream: UnixStream,
    organ: Arc<MediaOrgan>,
    start_time: std::time::Instant,
) -> Result<()> {
    let mut buffer = vec![0u8; 65536];

    loop {
        // Read request length (4 bytes)
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > buffer.len() {
            buffer.resize(len, 0);
        }

        stream.read_exact(&mut buffer[..len]).await?;

        let stimulus: Stimulus = serde_json::from_slice(&buffer[..len])
            .context("Failed to parse stimulus")?;

        debug!("Received: op={}", stimulus.op);

        let response = if stimulus.op == "health" {
            Response {
                ok: true,
                output: serde_json::json!({
                    "status": "healthy",
                    "organ": "ffcompose",
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptime_ms": start_time.elapsed().as_millis() as u64,
                }),
                latency_ms: 0,
                cost: None,
            }
        } else {
            // Blocking ffmpeg/ffprobe calls run off the reactor
            let organ = Arc::clone(&organ);
            tokio::task::spawn_blocking(move || {
                tokio::runtime::Handle::current().block_on(organ.stimulate(stimulus))
            })
            .await
            .context("Worker panicked")??
        };

        let response_bytes = serde_json::to_vec(&response)
            .context("Failed to serialize response")?;

        let len_bytes = (response_bytes.len() as u32).to_be_bytes();
        stream.write_all(&len_bytes).await?;
        stream.write_all(&response_bytes).await?;
        stream.flush().await?;

        debug!("Sent: ok={}, latency={}ms", response.ok, response.latency_ms);
    }
}
