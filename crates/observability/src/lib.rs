//! Tracing/logging setup shared by the binaries.

/// Initialize process-wide tracing with a default filter and output format.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init_with(default_filter: &str, json: bool) {
    tracing::init(default_filter, json);
}

/// Subscriber construction (filters, formatting).
pub mod tracing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_with_settings_defaults_twice() {
        init_with("info", true);
        init_with("jobportal=debug", false);
    }
}
