use std::{
    env, fs, io,
    net::SocketAddr,
    panic,
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::{Duration, SystemTime},
};
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// How the process lives, which decides how old log files get swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Long-running server: sweep on a background thread.
    Daemon,
    /// Short-lived command invoked by the OS cron: sweep once at startup.
    OneShot,
}

pub struct TracingGuards {
    _file_guard: Option<WorkerGuard>,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub root: PathBuf,
    pub default_filter: String,
    pub retention_days: u64,
    pub cleanup_interval_minutes: u64,
}

impl LogSettings {
    pub fn from_env(service_name: &str, default_filter: &str) -> Self {
        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "/var/log/legal".to_string());
        Self {
            root: PathBuf::from(log_dir).join(service_name),
            default_filter: default_filter.to_string(),
            retention_days: env_or("LOG_RETENTION_DAYS", 30u64),
            cleanup_interval_minutes: env_or("LOG_CLEANUP_INTERVAL_MINUTES", 360u64),
        }
    }
}

/// Installs the global subscriber: stdout plus a daily-rolling file when the
/// log directory is writable. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(service_name: &str, default_filter: &str, mode: RunMode) -> TracingGuards {
    let settings = LogSettings::from_env(service_name, default_filter);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_filter.as_str()));
    let stdout_layer = fmt::layer().with_writer(io::stderr);

    let mut file_guard = None;
    let mut file_layer = None;
    if fs::create_dir_all(&settings.root).is_ok() {
        let root = settings.root.clone();
        let file_name = format!("{service_name}.log");
        // The rolling appender panics on an unwritable directory.
        let appender =
            panic::catch_unwind(move || tracing_appender::rolling::daily(root, file_name)).ok();
        if let Some(appender) = appender {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_layer = Some(fmt::layer().with_ansi(false).with_writer(writer));
            file_guard = Some(guard);
        }
    }

    let subscriber = Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);

    if file_guard.is_some() && settings.retention_days > 0 {
        let retention = Duration::from_secs(settings.retention_days * 24 * 60 * 60);
        match mode {
            RunMode::OneShot => sweep_once(&settings.root, retention),
            RunMode::Daemon => spawn_log_cleanup(
                settings.root.clone(),
                retention,
                settings.cleanup_interval_minutes,
            ),
        }
    }

    TracingGuards {
        _file_guard: file_guard,
    }
}

/// Typed environment value with a fallback.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).unwrap_or(default)
}

/// Typed environment value; unset and unparsable are both `None`.
pub fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn sweep_once(root: &Path, retention: Duration) {
    if let Some(cutoff) = SystemTime::now().checked_sub(retention) {
        cleanup_old_logs(root, cutoff);
    }
}

fn spawn_log_cleanup(root: PathBuf, retention: Duration, interval_minutes: u64) {
    if interval_minutes == 0 {
        sweep_once(&root, retention);
        return;
    }
    let interval = Duration::from_secs(interval_minutes * 60);
    thread::spawn(move || loop {
        sweep_once(&root, retention);
        thread::sleep(interval);
    });
}

fn cleanup_old_logs(root: &Path, cutoff: SystemTime) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            cleanup_old_logs(&path, cutoff);
            continue;
        }
        let modified = fs::metadata(&path).and_then(|metadata| metadata.modified());
        if matches!(modified, Ok(modified) if modified < cutoff) {
            let _ = fs::remove_file(&path);
        }
    }
}

pub async fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr).await
}

pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "sigterm handler unavailable");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
