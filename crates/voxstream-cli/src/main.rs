use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use voxstream_cache::{HttpTransport, PositionProvider, SharedPosition, StreamContext, VolumeStream};
use voxstream_core::{SliceRequest, StreamConfig, VolumeDimensions, Voxel};

#[derive(Parser, Debug)]
#[command(name = "voxstream")]
#[command(about = "Streaming slice cache for time-resolved volumes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the slice request URL for a time range
    Url {
        /// Data endpoint prefix (e.g., http://localhost:8080/slices?)
        #[arg(long)]
        base: String,

        /// First time point (inclusive)
        #[arg(long)]
        from: u64,

        /// Last time point (exclusive)
        #[arg(long)]
        to: u64,

        /// Voxel as x,y,z
        #[arg(long)]
        voxel: Voxel,
    },

    /// Play a volume over HTTP with buffering enabled
    Play {
        /// Data endpoint prefix
        #[arg(long, env = "VOXSTREAM_DATA_URL")]
        data_url: String,

        /// Background endpoint prefix
        #[arg(long, env = "VOXSTREAM_BACKGROUND_URL")]
        background_url: String,

        /// Volume dimensions as t,x,y,z
        #[arg(long)]
        dims: VolumeDimensions,

        /// Selected voxel as x,y,z
        #[arg(long)]
        voxel: Voxel,

        /// Milliseconds per frame
        #[arg(long, default_value = "66")]
        playback_rate_ms: u64,

        /// Frames to play (defaults to one pass over the volume)
        #[arg(long)]
        frames: Option<u64>,

        /// Configuration file (otherwise VOXSTREAM_CONFIG and ./config/voxstream)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Url {
            base,
            from,
            to,
            voxel,
        } => {
            anyhow::ensure!(from < to, "--from must be less than --to");
            println!("{}", SliceRequest::new(from, to, voxel).to_url(&base));
            Ok(())
        }

        Commands::Play {
            data_url,
            background_url,
            dims,
            voxel,
            playback_rate_ms,
            frames,
            config,
        } => {
            let config = match config {
                Some(path) => StreamConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => StreamConfig::load().context("loading configuration")?,
            };
            let playback_rate = Duration::from_millis(playback_rate_ms.max(1));
            let frames = frames.unwrap_or(dims.time_length);

            play(
                config,
                data_url,
                background_url,
                dims,
                voxel,
                playback_rate,
                frames,
            )
            .await
        }
    }
}

async fn play(
    config: StreamConfig,
    data_url: String,
    background_url: String,
    dims: VolumeDimensions,
    voxel: Voxel,
    playback_rate: Duration,
    frames: u64,
) -> anyhow::Result<()> {
    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let position = Arc::new(SharedPosition::new(0, voxel));
    let ctx = StreamContext::new(transport).with_config(config);

    let stream = VolumeStream::init_streaming(
        ctx,
        data_url,
        background_url,
        dims,
        playback_rate,
        position.clone(),
    )?;

    println!("Session {}", stream.id());
    println!(
        "  Segments: {} time points, {} resident after sweep",
        stream.sizing().buffer_size(),
        stream.sizing().buffer_l2_size()
    );

    match stream.background_view(voxel).await {
        Ok(view) => tracing::info!(values = view.value_count(), "Background loaded"),
        Err(e) => tracing::warn!(error = %e, "Background unavailable"),
    }

    stream.start_buffering();

    let mut ticker = tokio::time::interval(playback_rate);
    let mut played = 0;
    while played < frames {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        let time_point = position.current_position().time_point;
        match stream.view_at_time(time_point, voxel).await {
            Ok(view) => tracing::debug!(time_point, values = view.value_count(), "Frame"),
            Err(e) => tracing::warn!(time_point, error = %e, "Frame unavailable"),
        }
        position.advance(dims.time_length);
        played += 1;
    }

    stream.stop_buffering();

    let stats = stream.stats();
    println!("\nPlayed {played} frames");
    println!("  Segment hits: {}", stats.segment_hits);
    println!("  Fallback fetches: {}", stats.fallback_fetches);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);
    println!(
        "  Prefetch: {} stored, {} stale, {} failed",
        stats.prefetch_stored, stats.prefetch_stale, stats.prefetch_failed
    );
    println!("  Evicted segments: {}", stats.segments_evicted);
    println!("  Resident segments: {}", stats.resident_segments);

    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
