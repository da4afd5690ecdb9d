//! Per-run summary of processed and failed messages.

/// Subjects of messages handled in one run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: Vec<String>,
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&mut self, subject: impl Into<String>) {
        self.processed.push(subject.into());
    }

    pub fn record_failed(&mut self, subject: impl Into<String>) {
        self.failed.push(subject.into());
    }

    /// Nothing was handled, so there is nothing to notify about.
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.failed.is_empty()
    }

    /// Render the notification text.
    ///
    /// ```text
    /// Processed invoices:
    ///  - Invoice #1
    /// Failed or unrecognized emails:
    ///  - Newsletter
    /// ```
    ///
    /// The failed section only appears when something failed.
    pub fn render(&self) -> String {
        let mut lines = vec!["Processed invoices:".to_string()];
        lines.extend(self.processed.iter().map(|s| format!(" - {s}")));
        if !self.failed.is_empty() {
            lines.push("Failed or unrecognized emails:".to_string());
            lines.extend(self.failed.iter().map(|s| format!(" - {s}")));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary() {
        assert!(RunSummary::new().is_empty());
    }

    #[test]
    fn processed_only() {
        let mut summary = RunSummary::new();
        summary.record_processed("Invoice #1");
        summary.record_processed("Invoice #2");
        assert_eq!(
            summary.render(),
            "Processed invoices:\n - Invoice #1\n - Invoice #2"
        );
    }

    #[test]
    fn failed_only_keeps_processed_header() {
        let mut summary = RunSummary::new();
        summary.record_failed("Weekly newsletter");
        assert!(!summary.is_empty());
        assert_eq!(
            summary.render(),
            "Processed invoices:\nFailed or unrecognized emails:\n - Weekly newsletter"
        );
    }

    #[test]
    fn both_sections_in_order() {
        let mut summary = RunSummary::new();
        summary.record_processed("A");
        summary.record_failed("B");
        summary.record_processed("C");
        assert_eq!(
            summary.render(),
            "Processed invoices:\n - A\n - C\nFailed or unrecognized emails:\n - B"
        );
    }
}
