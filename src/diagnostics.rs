//! Teardown reporting
//!
//! A cleanup pass is best-effort: it never stops at the first failure. The
//! [`TeardownReport`] it returns says what was removed, what was already
//! gone, and what could not be deleted.

use std::fmt;

const LINE_WIDTH: usize = 80;
const HEAVY_LINE: &str = "━";
const LIGHT_LINE: &str = "─";

/// Outcome of a teardown pass
///
/// Entries are `namespace/kind/name` references in deletion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// Deleted by this pass
    pub removed: Vec<String>,
    /// Not found; nothing to do
    pub already_absent: Vec<String>,
    /// Reference and error for each deletion that failed
    pub failed: Vec<(String, String)>,
}

impl TeardownReport {
    /// Create an empty report
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every deletion succeeded or was unnecessary
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of entries the pass handled
    #[must_use]
    pub fn total(&self) -> usize {
        self.removed.len() + self.already_absent.len() + self.failed.len()
    }

    /// Append another report, keeping order
    pub fn merge(&mut self, other: TeardownReport) {
        self.removed.extend(other.removed);
        self.already_absent.extend(other.already_absent);
        self.failed.extend(other.failed);
    }

    fn heavy_line() -> String {
        HEAVY_LINE.repeat(LINE_WIDTH)
    }

    fn section_header(title: &str) -> String {
        let title_with_spaces = format!(" {title} ");
        let remaining = LINE_WIDTH.saturating_sub(title_with_spaces.len() + 3);
        format!(
            "{}{}{}",
            LIGHT_LINE.repeat(3),
            title_with_spaces,
            LIGHT_LINE.repeat(remaining)
        )
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;
        if self.is_clean() {
            writeln!(f, "  TEARDOWN COMPLETE")?;
        } else {
            writeln!(f, "  TEARDOWN INCOMPLETE ({} failed)", self.failed.len())?;
        }
        writeln!(f, "{}", Self::heavy_line())?;

        if !self.removed.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{}",
                Self::section_header(&format!("Removed ({})", self.removed.len()))
            )?;
            for reference in &self.removed {
                writeln!(f, "  • {reference}")?;
            }
        }

        if !self.already_absent.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{}",
                Self::section_header(&format!("Already absent ({})", self.already_absent.len()))
            )?;
            for reference in &self.already_absent {
                writeln!(f, "  • {reference}")?;
            }
        }

        if !self.failed.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{}",
                Self::section_header(&format!("Failed ({})", self.failed.len()))
            )?;
            for (reference, error) in &self.failed {
                writeln!(f, "  • {reference}")?;
                writeln!(f, "    {error}")?;
            }

            // Leftovers need manual removal
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header("Debug"))?;
            writeln!(f)?;
            for (reference, _) in &self.failed {
                if let Some((namespace, object)) = reference.split_once('/') {
                    writeln!(f, "  kubectl -n {namespace} delete {object}")?;
                }
            }
        }

        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_clean() {
        let report = TeardownReport::new();
        assert!(report.is_clean());
        assert_eq!(report.total(), 0);
        assert!(report.to_string().contains("TEARDOWN COMPLETE"));
    }

    #[test]
    fn test_report_sections() {
        let report = TeardownReport {
            removed: vec!["core/pod/ephemera-server-abc".to_string()],
            already_absent: vec!["test-4/pod/ephemera-client-abc".to_string()],
            failed: vec![(
                "core/service/ephemera-lb-abc".to_string(),
                "Service 'ephemera-lb-abc': permission denied (check RBAC)".to_string(),
            )],
        };

        let output = report.to_string();
        assert!(output.contains("TEARDOWN INCOMPLETE (1 failed)"));
        assert!(output.contains("Removed (1)"));
        assert!(output.contains("Already absent (1)"));
        assert!(output.contains("• core/pod/ephemera-server-abc"));
        assert!(output.contains("permission denied"));
        assert!(output.contains("kubectl -n core delete service/ephemera-lb-abc"));
        assert!(output.contains("━━━"));
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut first = TeardownReport {
            removed: vec!["test-4/pod/client".to_string()],
            ..Default::default()
        };
        let second = TeardownReport {
            removed: vec!["core/pod/server".to_string(), "core/service/lb".to_string()],
            failed: vec![("core/networkpolicy/np".to_string(), "boom".to_string())],
            ..Default::default()
        };

        first.merge(second);
        assert_eq!(
            first.removed,
            vec!["test-4/pod/client", "core/pod/server", "core/service/lb"]
        );
        assert_eq!(first.total(), 4);
        assert!(!first.is_clean());
    }
}
