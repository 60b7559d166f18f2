const PENDING_MARKER: &str = "pending";
const NONE_PENDING: &str = "no migrations pending";

/// Text printed by `migrate info`. Only the pending marker is interpreted.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    raw: String,
    pending: usize,
}

impl MigrationReport {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let pending = raw.lines().filter(|line| marks_pending(line)).count();
        Self { raw, pending }
    }

    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }

    /// Lines carrying the marker. The tool may print several per migration,
    /// so treat this as a hint.
    pub fn pending_count(&self) -> usize {
        self.pending
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

fn marks_pending(line: &str) -> bool {
    let line = line.to_ascii_lowercase();
    line.contains(PENDING_MARKER) && !line.contains(NONE_PENDING)
}
