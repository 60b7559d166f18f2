use tabled::Tabled;

use crate::backup::{Backup, ChecksumState};

pub fn format_backups_table(backups: &[(Backup, ChecksumState)]) -> String {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "File")]
        file: String,
        #[tabled(rename = "Created (UTC)")]
        created: String,
        #[tabled(rename = "Size")]
        size: String,
        #[tabled(rename = "Checksum")]
        checksum: String,
    }

    if backups.is_empty() {
        return "(no backups)".to_string();
    }

    let rows: Vec<Row> = backups
        .iter()
        .map(|(backup, state)| Row {
            file: backup.file_name(),
            created: backup
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            size: human_size(backup.size),
            checksum: checksum_label(*state).to_string(),
        })
        .collect();

    tabled::Table::new(rows).to_string()
}

pub fn checksum_label(state: ChecksumState) -> &'static str {
    match state {
        ChecksumState::Valid => "ok",
        ChecksumState::Mismatch => "MISMATCH",
        ChecksumState::Missing => "-",
    }
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
