use std::io::Write;

use anyhow::{bail, Context};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use omega::cli;
use omega::config::Config;
use omega::memory::MemoryBackend;
use omega::render::render_page;
use omega::script::Evaluator;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("OMEGA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = cli::parse_args();

    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = match cli::find_config(args.config.as_ref()) {
        Some(path) => {
            let (config, problems) = Config::load_file(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            for p in problems {
                warn!(file = %path.display(), "{p}");
            }
            config
        }
        None => Config::default(),
    };
    args.apply(&mut config);

    let request = args.request();

    // ── Database ──────────────────────────────────────────────────────────────
    let backend = match &args.db {
        Some(path) => MemoryBackend::load(path)
            .with_context(|| format!("loading database {}", path.display()))?,
        None => {
            let requested = request.get("DB");
            let name = requested.unwrap_or(&config.default_db);
            match config.database_path(name) {
                Some(path) if path.exists() => MemoryBackend::load(&path)
                    .with_context(|| format!("loading database {}", path.display()))?,
                Some(path) if requested.is_none() => {
                    debug!(path = %path.display(), "no default database, searching nothing");
                    MemoryBackend::default()
                }
                _ => bail!("database `{name}' not found in {}", config.database_dir.display()),
            }
        }
    };

    // ── Render ────────────────────────────────────────────────────────────────
    let mut ev = Evaluator::new(&backend, &request, &config);
    info!(template = ev.fmt(), "render start");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match render_page(&mut ev) {
        Ok(page) => {
            page.write_to(&mut out)?;
            info!("render finished");
        }
        Err(e) => {
            out.write_all(e.preamble.as_bytes())?;
            writeln!(out, "Exception: {}", e.source)?;
            out.flush()?;
            error!(kind = ?e.source.kind(), "{}", e.source);
        }
    }
    Ok(())
}
