use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use directories::ProjectDirs;
use scanner_core::Settings;
use scanner_ui::Ui;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

const LOG_FILE_NAME: &str = "scanner.log";
const SETTINGS_FILE_NAME: &str = "settings.json";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let Some(initial_path) = parse_args(std::env::args().skip(1))? else {
        print_help();
        return Ok(());
    };

    let project_dirs =
        ProjectDirs::from("dev", "resume", "scanner").context("resolve project dirs")?;

    // The terminal belongs to the UI; logs only go to a file.
    let _log_guard = init_tracing(project_dirs.cache_dir())?;

    let settings_path = std::env::var_os("SCANNER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| project_dirs.config_dir().join(SETTINGS_FILE_NAME));
    let settings = load_settings(&settings_path)?;
    tracing::info!(
        config = %settings_path.display(),
        theme = %settings.theme,
        zoom = settings.zoom.default_percent,
        "scanner starting"
    );

    let mut ui = Ui::new(settings, initial_path);
    let outcome = ui.run()?;
    tracing::info!(theme = %outcome.settings.theme, "scanner exited");
    Ok(())
}

/// `Ok(None)` means help was requested. `Ok(Some(None))` starts with no file.
fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<Option<Option<PathBuf>>> {
    let mut path = None;
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            _ if arg.starts_with('-') => anyhow::bail!("unknown flag: {arg} (see --help)"),
            _ if path.is_some() => anyhow::bail!("only one PATH may be given"),
            _ => path = Some(PathBuf::from(arg)),
        }
    }
    Ok(Some(path))
}

fn print_help() {
    println!(
        "Usage: scanner [PATH]\n\n\
Preview a resume in the terminal. Press o to choose a file or drop one onto the window.\n\n\
Environment:\n  SCANNER_CONFIG          settings file (default: <config dir>/{SETTINGS_FILE_NAME})\n  SCANNER_LOG             log filter, e.g. debug or engine=trace\n  SCANNER_PDFIUM_LIB_PATH pdfium library used to draw PDF pages\n  SCANNER_DISABLE_PDFIUM  show PDF pages as text"
    );
}

/// Missing file means defaults. A file that exists but does not parse is an
/// error rather than silently ignored.
fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<Settings>(&raw)
            .with_context(|| format!("parse settings {}", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("read settings {}", path.display()));
        }
    };
    settings.normalize();
    Ok(settings)
}

fn init_tracing(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_env("SCANNER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}
