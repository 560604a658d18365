use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, process, thread};

use streamcast::clock::now_micros;
use streamcast::config::{Config, ServerSettings};
use streamcast::log::{LogSink, Logger};
use streamcast::protocol::{AudioFrame, StreamConfig, VideoFrame};
use streamcast::server::BroadcastServer;
use streamcast::transport::server_upgrader;
use streamcast::{logger_info, sink_info, sink_warn};

/// Stand-in for the capture side: what the synthetic source produces.
struct SourceSettings {
    fps: u32,
    width: u16,
    height: u16,
    quality: u8,
    frame_bytes: usize,
    sample_rate: u32,
    channels: u16,
    tone_hz: f32,
    /// Zero runs until the process is killed.
    duration: Duration,
}

impl SourceSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            fps: config
                .get_parsed("Source", "fps", u32::from(StreamConfig::DEFAULT_FPS))
                .max(1),
            width: config.get_parsed("Source", "width", 1280),
            height: config.get_parsed("Source", "height", 720),
            quality: config.get_parsed("Source", "quality", StreamConfig::DEFAULT_JPEG_QUALITY),
            frame_bytes: config.get_parsed("Source", "frame_bytes", 32 * 1024),
            sample_rate: config.get_parsed(
                "Source",
                "audio_sample_rate",
                u32::from(StreamConfig::DEFAULT_AUDIO_SAMPLE_RATE),
            ),
            channels: config.get_parsed(
                "Source",
                "audio_channels",
                u16::from(StreamConfig::DEFAULT_AUDIO_CHANNELS),
            ),
            tone_hz: config.get_parsed("Source", "tone_hz", 440.0),
            duration: Duration::from_secs(config.get_parsed("Source", "duration_secs", 0)),
        }
    }
}

fn load_config(args: &[String]) -> Config {
    match args.get(1) {
        Some(path) => Config::load(path).unwrap_or_else(|e| {
            eprintln!("[stream_server] {e}");
            process::exit(1);
        }),
        None => Config::load_first(&["stream_server.conf", "stream_server_default.conf"])
            .map(|(cfg, path)| {
                eprintln!("[stream_server] using config {path}");
                cfg
            })
            .unwrap_or_default(),
    }
}

fn main() {
    // --- Parse CLI args ----------------------------------------------------
    //
    //   stream_server            -> stream_server.conf, stream_server_default.conf, defaults
    //   stream_server PATH       -> that config file
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [CONFIG]", args[0]);
        process::exit(1);
    }
    let config = load_config(&args);

    // --- Start process logger ----------------------------------------------
    let logger = Logger::start_server(1024, &config);
    let log: Arc<dyn LogSink> = Arc::new(logger.handle());
    logger_info!(logger, "log file at {}", logger.file_path().display());

    let settings = ServerSettings::from_config(&config);
    let source = SourceSettings::from_config(&config);
    let upgrader = match server_upgrader(&config) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("[stream_server] TLS setup failed: {e}");
            process::exit(1);
        }
    };

    eprintln!("[stream_server] starting on {}", settings.listen_addr());
    let server = BroadcastServer::with_upgrader(settings, Arc::clone(&log), upgrader);
    if let Err(e) = server.start() {
        eprintln!("[stream_server] {e}");
        process::exit(1);
    }

    run_source(&server, &source, &log);

    if let Err(e) = server.stop() {
        sink_warn!(log, "stop failed: {}", e);
    }
    drop(server);
    drop(log);
    logger.shutdown();
}

/// Broadcasts one video and one audio frame per tick until the duration elapses.
fn run_source(server: &BroadcastServer, source: &SourceSettings, log: &Arc<dyn LogSink>) {
    let tick = Duration::from_secs(1) / source.fps;
    let samples_per_frame = (source.sample_rate / source.fps) as usize;
    let started = Instant::now();
    let mut next = started;

    for frame_number in 0u32.. {
        if !source.duration.is_zero() && started.elapsed() >= source.duration {
            break;
        }
        let ts = now_micros();
        let video = VideoFrame::synthetic(
            frame_number,
            source.width,
            source.height,
            source.quality,
            source.frame_bytes,
            ts,
        );
        if let Err(e) = server.broadcast_video_frame(&video) {
            sink_warn!(log, "video frame {} not sent: {}", frame_number, e);
        }
        let audio = AudioFrame::tone(
            frame_number,
            source.sample_rate,
            source.channels,
            source.tone_hz,
            samples_per_frame,
            ts,
        );
        if let Err(e) = server.broadcast_audio_frame(&audio) {
            sink_warn!(log, "audio frame {} not sent: {}", frame_number, e);
        }
        if frame_number % (source.fps * 10) == 0 {
            sink_info!(
                log,
                "frame {}: {} sessions connected",
                frame_number,
                server.session_count()
            );
        }

        next += tick;
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }
}
