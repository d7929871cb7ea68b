//! Logging context handed to each component at construction.

use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A named tracing span owned by one component instance.
///
/// Components enter their context around every unit of work so that all events they emit
/// carry the component name, instead of reaching for a process-wide logger.
#[derive(Debug, Clone)]
pub struct LogContext {
    component: String,
    span: Span,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        let span = tracing::info_span!("component", name = component);
        LogContext {
            component: component.to_string(),
            span,
        }
    }

    /// Child context nested under this one, e.g. a selector fitting candidate models.
    pub fn child(&self, component: &str) -> Self {
        let span = tracing::info_span!(parent: &self.span, "component", name = component);
        LogContext {
            component: component.to_string(),
            span,
        }
    }

    /// Context that swallows everything; handy in tight loops and tests.
    pub fn disabled(component: &str) -> Self {
        LogContext {
            component: component.to_string(),
            span: Span::none(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn in_scope<F: FnOnce() -> T, T>(&self, f: F) -> T {
        self.span.in_scope(f)
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_subscriber(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from tests) is not an error worth surfacing.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

/// Map a `-v` count to a level name.
pub fn level_for_verbosity(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_lowercase(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_component_name() {
        let ctx = LogContext::new("SimpleMAForecaster");
        assert_eq!(ctx.component(), "SimpleMAForecaster");
        let child = ctx.child("fit");
        assert_eq!(child.component(), "fit");
    }

    #[test]
    fn in_scope_returns_closure_value() {
        let ctx = LogContext::disabled("test");
        assert_eq!(ctx.in_scope(|| 41 + 1), 42);
    }

    #[test]
    fn verbosity_mapping() {
        assert_eq!(level_for_verbosity(0, "WARN"), "warn");
        assert_eq!(level_for_verbosity(1, "warn"), "info");
        assert_eq!(level_for_verbosity(2, "warn"), "debug");
        assert_eq!(level_for_verbosity(9, "warn"), "trace");
    }
}
