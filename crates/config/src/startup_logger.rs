//! Service startup logging for the MedLens aggregator

use crate::Settings;
use medlens_types::SourceKey;
use std::env;
use tracing::{info, warn};

/// Logs service information at startup
pub fn log_service_info() {
	let service_name = "medlens";
	let service_version = env!("CARGO_PKG_VERSION");

	info!("=== MedLens Aggregator Starting ===");
	info!("🚀 Service: {} v{}", service_name, service_version);
	info!("💻 Platform: {}", env::consts::OS);
	info!("🏗️ Architecture: {}", env::consts::ARCH);

	if let Ok(cwd) = env::current_dir() {
		info!("📁 Working Directory: {}", cwd.display());
	}

	if let Ok(rust_log) = env::var("RUST_LOG") {
		info!("🔧 Log Level: {}", rust_log);
	}

	if let Ok(config_path) = env::var("CONFIG_PATH") {
		info!("📋 Config Path: {}", config_path);
	}

	info!(
		"🕒 Started at: {}",
		chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
	);
}

/// Logs which sources are enabled and which credentials were found
pub fn log_source_summary(settings: &Settings) {
	for source in SourceKey::ALL {
		let source_settings = settings.sources.get(source);
		if !source_settings.enabled {
			info!("⏸️ {} ({}): disabled", source.label(), source);
			continue;
		}
		let runtime = source_settings.to_runtime_config(source);
		let key_state = if runtime.api_key.is_some() {
			"key configured"
		} else {
			"no key"
		};
		info!(
			"🔌 {} ({}): timeout {}ms, {} retries, {}",
			source.label(),
			source,
			runtime.timeout_ms,
			runtime.max_retries,
			key_state
		);
		if source_settings.api_key.as_ref().is_some_and(|key| key.is_inline()) {
			warn!("⚠️ {} API key is written inline in the config file", source);
		}
	}
	info!(
		"⏱️ Aggregation: global {}ms, per source {}ms",
		settings.aggregation.global_timeout_ms, settings.aggregation.per_source_timeout_ms
	);
}

/// Logs service shutdown information
pub fn log_service_shutdown() {
	info!("🛑 MedLens Aggregator Shutting Down");
	info!(
		"🕒 Shutdown at: {}",
		chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
	);
}

/// Logs startup completion
pub fn log_startup_complete(bind_address: &str) {
	info!("✅ MedLens Aggregator Started Successfully");
	info!("🌐 Server listening on: {}", bind_address);
	info!("📡 Ready to accept requests");
}
