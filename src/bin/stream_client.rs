use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use std::{env, process, thread};

use streamcast::client::StreamClient;
use streamcast::config::{ClientSettings, Config};
use streamcast::log::{LogSink, Logger};
use streamcast::{logger_info, sink_info};

fn load_config(args: &[String]) -> Config {
    match args.get(1) {
        Some(path) => Config::load(path).unwrap_or_else(|e| {
            eprintln!("[stream_client] {e}");
            process::exit(1);
        }),
        None => Config::load_first(&["stream_client.conf", "stream_client_default.conf"])
            .map(|(cfg, path)| {
                eprintln!("[stream_client] using config {path}");
                cfg
            })
            .unwrap_or_default(),
    }
}

fn main() {
    //   stream_client            -> stream_client.conf, stream_client_default.conf, defaults
    //   stream_client PATH       -> that config file
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [CONFIG]", args[0]);
        process::exit(1);
    }
    let config = load_config(&args);

    let logger = Logger::start_client(1024, &config);
    let log: Arc<dyn LogSink> = Arc::new(logger.handle());
    logger_info!(logger, "log file at {}", logger.file_path().display());

    let settings = ClientSettings::from_config(&config);
    let duration = Duration::from_secs(config.get_parsed("Client", "duration_secs", 0));
    let upgrader = match streamcast::transport::client_upgrader(&config) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("[stream_client] TLS setup failed: {e}");
            process::exit(1);
        }
    };

    let client = StreamClient::with_upgrader(settings, Arc::clone(&log), upgrader);

    let video_seen = Arc::new(AtomicU64::new(0));
    {
        let seen = Arc::clone(&video_seen);
        let log = Arc::clone(&log);
        client.set_video_callback(move |frame, _raw| {
            let n = seen.fetch_add(1, Ordering::Relaxed) + 1;
            if n % 30 == 0 {
                sink_info!(
                    log,
                    "video frame {} {}x{} q{} ({} bytes)",
                    frame.frame_number,
                    frame.width,
                    frame.height,
                    frame.quality,
                    frame.data.len()
                );
            }
        });
    }
    client.set_disconnect_callback(|| eprintln!("[stream_client] disconnected from server"));

    let id = match client.connect() {
        Ok(id) => id,
        Err(e) => {
            eprintln!("[stream_client] {e}");
            process::exit(1);
        }
    };
    eprintln!("[stream_client] connected as session {id} ({})", client.server_info());

    let started = Instant::now();
    while client.is_connected() && (duration.is_zero() || started.elapsed() < duration) {
        thread::sleep(Duration::from_millis(200));
    }
    let _ = client.disconnect();

    let stats = client.stats();
    eprintln!(
        "[stream_client] received {} video frames, {} audio frames, {} bytes",
        stats.video_frames, stats.audio_frames, stats.bytes_received
    );
    drop(client);
    drop(log);
    logger.shutdown();
}
