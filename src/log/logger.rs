use crate::{
    config::Config,
    log::{log_level::LogLevel, log_msg::LogMsg, logger_handle::LoggerHandle},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, TrySendError},
    thread::{self, JoinHandle},
    time::{SystemTime, UNIX_EPOCH},
};

/// Flush every 100 lines when debugging so a crash loses little.
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

/// Flush every 1000 lines otherwise.
#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

/// Bounded, non-blocking process logger.
///
/// Producers hold a [`LoggerHandle`] and enqueue into a bounded channel; a
/// single `logger-worker` thread appends rendered lines to
/// `<dir>/<app>-<unix secs>-pid<pid>.log`. Warn/Error lines force a flush and
/// can be mirrored to stderr.
pub struct Logger {
    handle: LoggerHandle,
    thread: Option<JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Logger for the `stream_server` binary, honoring `[Logging] server_log_path`.
    #[must_use]
    pub fn start_server(cap: usize, config: &Config) -> Self {
        Self::start("stream_server", "server_log_path", cap, config)
    }

    /// Logger for the `stream_client` binary, honoring `[Logging] client_log_path`.
    #[must_use]
    pub fn start_client(cap: usize, config: &Config) -> Self {
        Self::start("stream_client", "client_log_path", cap, config)
    }

    fn start(app_name: &str, path_key: &str, cap: usize, config: &Config) -> Self {
        let echo_stderr = config.get_bool("Logging", "echo_stderr", false);
        let dir = config
            .get_non_empty("Logging", path_key)
            .map(expand_path)
            .unwrap_or_else(|| exe_dir_fallback_cwd().join("logs"));
        Self::start_in_dir(dir, Some(app_name), cap, echo_stderr)
    }

    /// Starts the worker writing into `dir`, creating it when missing.
    pub fn start_in_dir<D: AsRef<Path>>(
        dir: D,
        app_name: Option<&str>,
        cap: usize,
        echo_stderr: bool,
    ) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let pid = std::process::id();
        let fname = match app_name {
            Some(name) => format!("{name}-{secs}-pid{pid}.log"),
            None => format!("{secs}-pid{pid}.log"),
        };
        let file_path = dir.join(fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let worker_path = file_path.clone();

        let thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || run_worker(&worker_path, &rx, echo_stderr))
            .ok();

        Self {
            handle: LoggerHandle { tx },
            thread,
            file_path,
        }
    }

    /// Enqueues a line without blocking; drops it when the queue is full.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.handle.try_log(level, text, target)
    }

    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Closes this logger's side of the queue and waits for the worker to
    /// drain and flush. Blocks until every outstanding handle clone is dropped.
    pub fn shutdown(self) {
        let Self { handle, thread, .. } = self;
        drop(handle);
        if let Some(t) = thread {
            let _ = t.join();
        }
    }
}

fn run_worker(path: &Path, rx: &mpsc::Receiver<LogMsg>, echo_stderr: bool) {
    // Target file, then a temp-dir fallback, then a sink. Never panic.
    let writer: Box<dyn Write + Send> = match OpenOptions::new().create(true).append(true).open(path)
    {
        Ok(f) => Box::new(f),
        Err(_) => {
            let fallback = std::env::temp_dir().join("streamcast-fallback.log");
            match OpenOptions::new().create(true).append(true).open(&fallback) {
                Ok(f) => Box::new(f),
                Err(_) => Box::new(io::sink()),
            }
        }
    };
    let mut out = BufWriter::new(writer);
    let mut lines_written: u32 = 0;

    while let Ok(m) = rx.recv() {
        let line = m.render();
        let _ = writeln!(&mut out, "{line}");
        lines_written = lines_written.wrapping_add(1);

        if m.level.is_alarming() {
            if echo_stderr {
                eprintln!("{line}");
            }
            let _ = out.flush();
        } else if lines_written.is_multiple_of(FLUSH_BATCH_SIZE) {
            let _ = out.flush();
        }
    }

    let _ = out.flush();
}

fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Expands a leading `~` to the user's home directory.
fn expand_path(path_str: &str) -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from);

    match (path_str, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") || p.starts_with("~\\") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}
