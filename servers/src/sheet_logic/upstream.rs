use std::sync::Arc;

use anyhow::Context;
use lib_sheetcast::ingestors::SheetsSource;
use lib_sheetcast::{Hub, RefreshScheduler};
use tokio::sync::broadcast;
use tracing::info;

use crate::sheet_logic::config::Settings;

/// Builds the Sheets row source. Runs before any task is spawned so a bad
/// API base or an unreadable key file stops startup.
pub fn build_source(settings: &Settings) -> anyhow::Result<SheetsSource> {
    SheetsSource::new(settings.sheets.clone()).context("Failed to build the Sheets row source")
}

/// Polls `source` into `hub` until `shutdown` fires.
pub async fn run(source: SheetsSource, settings: Settings, hub: Arc<Hub>, shutdown: broadcast::Receiver<()>) {
    let scheduler = RefreshScheduler::new(source, hub, settings.refresh_interval);

    info!(
        spreadsheet = %settings.sheets.spreadsheet_id,
        range = %settings.sheets.range,
        interval_secs = settings.refresh_interval.as_secs(),
        service_account = settings.sheets.credentials_path.is_some(),
        "Upstream refresh loop starting"
    );
    scheduler.run(shutdown).await;
    info!("Upstream refresh loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_logic::config::Config;

    fn settings() -> Settings {
        Config::defaults()
            .merge(Config {
                spreadsheet_id: Some("abc".to_string()),
                ..Default::default()
            })
            .resolve()
            .unwrap()
    }

    #[test]
    fn builds_from_valid_settings() {
        assert!(build_source(&settings()).is_ok());
    }

    #[test]
    fn unreadable_key_file_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.sheets.credentials_path = Some(dir.path().join("missing.json"));
        let err = build_source(&settings).err().unwrap();
        assert!(format!("{:#}", err).contains("service account"));
    }

    #[test]
    fn bad_api_base_fails_before_spawning() {
        let mut settings = settings();
        settings.sheets.api_base = "not a url".to_string();
        assert!(build_source(&settings).is_err());
    }
}
