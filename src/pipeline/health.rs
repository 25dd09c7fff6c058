//! Per-session counters summarized at teardown

use std::time::Duration;

/// Message counters of one runtime session
///
/// Owned by the single-threaded supervisor, so plain integers suffice.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub info: u64,
    pub warnings: u64,
    pub errors: u64,
    pub eos: u64,
    pub clients_connected: u64,
    pub clients_closed: u64,
    /// Client sessions dropped because the pool was full
    pub clients_evicted: u64,
    /// Errors reported by individual stream clients
    pub client_errors: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_info(&mut self) {
        self.info += 1;
    }

    pub fn record_warning(&mut self) {
        self.warnings += 1;
    }

    pub fn record_error(&mut self, per_client: bool) {
        if per_client {
            self.client_errors += 1;
        } else {
            self.errors += 1;
        }
    }

    pub fn record_eos(&mut self) {
        self.eos += 1;
    }

    pub fn record_connect(&mut self, evicted: usize) {
        self.clients_connected += 1;
        self.clients_evicted += evicted as u64;
    }

    pub fn record_close(&mut self) {
        self.clients_closed += 1;
    }

    pub fn summary(&self, elapsed: Option<Duration>) -> StatsSummary {
        StatsSummary {
            stats: self.clone(),
            elapsed,
        }
    }
}

/// Snapshot printed when the session is released
#[derive(Debug, Clone)]
pub struct StatsSummary {
    pub stats: SessionStats,
    pub elapsed: Option<Duration>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.stats;
        write!(
            f,
            "Session: {} info, {} warnings, {} errors, {} EOS",
            s.info, s.warnings, s.errors, s.eos
        )?;
        if s.clients_connected > 0 {
            write!(
                f,
                ", {} clients ({} closed, {} evicted, {} client errors)",
                s.clients_connected, s.clients_closed, s.clients_evicted, s.client_errors
            )?;
        }
        if let Some(elapsed) = self.elapsed {
            write!(
                f,
                ", ran {}",
                crate::utils::string::format_seconds(elapsed.as_secs())
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = SessionStats::new();
        stats.record_info();
        stats.record_warning();
        stats.record_error(false);
        stats.record_error(true);
        stats.record_eos();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.client_errors, 1);
        assert_eq!(
            stats.summary(None).to_string(),
            "Session: 1 info, 1 warnings, 1 errors, 1 EOS"
        );
    }

    #[test]
    fn test_summary_with_clients_and_time() {
        let mut stats = SessionStats::new();
        stats.record_connect(0);
        stats.record_connect(1);
        stats.record_close();

        let text = stats.summary(Some(Duration::from_secs(75))).to_string();
        assert!(text.contains("2 clients (1 closed, 1 evicted, 0 client errors)"));
        assert!(text.ends_with("ran 01:15"));
    }
}
