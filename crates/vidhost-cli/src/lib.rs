use anyhow::Context;
use serde::Serialize;
use vidhost_core::models::{DeleteOutcome, VideoMetadata};
use vidhost_transfer::TransferProgress;

const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

/// Initialize tracing for the CLI, honoring `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

/// Metadata for an upload: derived from the file name, with explicit
/// overrides taking precedence.
pub fn upload_metadata(
    file_name: &str,
    title: Option<String>,
    description: Option<String>,
    cors_origin: String,
) -> VideoMetadata {
    let mut metadata = VideoMetadata::from_filename(file_name, cors_origin);
    if let Some(title) = title {
        metadata.title = title;
    }
    if let Some(description) = description {
        metadata.description = description;
    }
    metadata
}

pub fn delete_message(asset_id: &str, outcome: DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::Deleted => format!("Video {} deleted", asset_id),
        DeleteOutcome::AlreadyAbsent => format!("Video {} was already gone", asset_id),
    }
}

/// Human-readable byte count, e.g. `5.0 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// One-line progress report written to stderr during uploads.
pub fn format_progress(progress: &TransferProgress) -> String {
    format!(
        "{:>5.1}%  {} / {}  {}/s",
        progress.percent(),
        format_bytes(progress.acknowledged),
        format_bytes(progress.total),
        format_bytes(progress.bytes_per_sec as u64)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_small() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn format_bytes_scaled() {
        assert_eq!(format_bytes(1024), "1.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 / 2), "1.5 GiB");
    }

    #[test]
    fn format_progress_line() {
        let progress = TransferProgress {
            acknowledged: 5 * 1024 * 1024,
            total: 10 * 1024 * 1024,
            bytes_per_sec: 1024.0 * 1024.0,
        };
        assert_eq!(
            format_progress(&progress),
            " 50.0%  5.0 MiB / 10.0 MiB  1.0 MiB/s"
        );
    }

    #[test]
    fn delete_message_follows_outcome() {
        assert_eq!(
            delete_message("v1", DeleteOutcome::Deleted),
            "Video v1 deleted"
        );
        assert_eq!(
            delete_message("v1", DeleteOutcome::AlreadyAbsent),
            "Video v1 was already gone"
        );
    }

    #[test]
    fn upload_metadata_defaults_from_file_name() {
        let metadata = upload_metadata("holiday.mov", None, None, "*".to_string());
        assert_eq!(metadata.title, "holiday");
        assert_eq!(metadata.description, "Upload of holiday.mov");
        assert_eq!(metadata.cors_origin, "*");
    }

    #[test]
    fn upload_metadata_overrides_win() {
        let metadata = upload_metadata(
            "holiday.mov",
            Some("Beach".to_string()),
            Some("Day one".to_string()),
            "https://app.example".to_string(),
        );
        assert_eq!(metadata.title, "Beach");
        assert_eq!(metadata.description, "Day one");
        assert_eq!(metadata.cors_origin, "https://app.example");
    }
}
