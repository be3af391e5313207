use std::{path::PathBuf, process::ExitCode};

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trove::{AssetKind, Config, Library};

fn main() -> ExitCode {
	let config = match load_config() {
		Ok(c) => c,
		Err(e) => {
			eprintln!("trove: {e}");
			return ExitCode::FAILURE;
		}
	};

	// Without a document root there is nowhere to keep assets.
	let log_dir = match config.resolve_log_dir() {
		Ok(dir) => dir,
		Err(e) => {
			eprintln!("trove: {e}");
			return ExitCode::FAILURE;
		}
	};
	std::fs::create_dir_all(&log_dir).ok();
	let file_appender = tracing_appender::rolling::never(log_dir, "trove.log");
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer().with_writer(file_appender))
		.init();

	let rt = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => {
			eprintln!("trove: failed to create tokio runtime: {e}");
			return ExitCode::FAILURE;
		}
	};

	match rt.block_on(run(&config)) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("startup failed: {e}");
			eprintln!("trove: {e}");
			ExitCode::FAILURE
		}
	}
}

fn load_config() -> Result<Config, trove::ConfigError> {
	let path = std::env::var_os("TROVE_CONFIG").map(PathBuf::from).or_else(Config::default_path);
	match path {
		Some(path) => Config::load(&path),
		None => Ok(Config::default()),
	}
}

/// Rebuild every kind's catalog, wait for previews and report what is there.
async fn run(config: &Config) -> Result<(), trove::ConfigError> {
	let library = Library::open(config)?;
	info!(root = %library.store().root().display(), "opening asset store");

	for outcome in library.rescan_all().await {
		outcome.thumbnails.join().await;
	}

	for kind in AssetKind::ALL {
		let assets = library.list_assets(kind);
		let with_preview = assets.iter().filter(|a| a.thumbnail.is_some()).count();
		info!(%kind, assets = assets.len(), with_preview, state = ?library.state(kind), "catalog ready");
		println!("{kind:<6} {:>5} assets, {with_preview} with preview", assets.len());
	}

	let scenes = library.bundled_scenes();
	if !scenes.is_empty() {
		info!(count = scenes.len(), "bundled scenes available");
	}

	Ok(())
}
