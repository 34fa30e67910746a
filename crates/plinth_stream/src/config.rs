//! Stream configuration

use plinth_wire::DEFAULT_CALLABLE_ID_PREFIX;

/// Configuration of an [`ElementMessageStream`](crate::ElementMessageStream)
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Prefix of the callable ids written into documents.
    pub callable_id_prefix: String,
    /// Stop rendering after an error that breaks the hook rules.
    pub close_on_fatal: bool,
    /// Send effect failures to the client as `documentError` notifications.
    pub report_effect_errors: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            callable_id_prefix: DEFAULT_CALLABLE_ID_PREFIX.to_owned(),
            close_on_fatal: true,
            report_effect_errors: true,
        }
    }
}

impl StreamConfig {
    pub fn with_callable_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.callable_id_prefix = prefix.into();
        self
    }

    pub fn with_close_on_fatal(mut self, close: bool) -> Self {
        self.close_on_fatal = close;
        self
    }

    pub fn with_report_effect_errors(mut self, report: bool) -> Self {
        self.report_effect_errors = report;
        self
    }
}
