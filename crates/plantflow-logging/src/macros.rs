//! ---
//! pf_section: "03-persistence-logging"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Context-enriched logging macros."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---

/// Shared expansion used by the level-specific macros below.
#[doc(hidden)]
#[macro_export]
macro_rules! __pf_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            resource = ctx.resource.unwrap_or(""),
            artifact = ctx.artifact.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            plan = ctx.plan.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with orchestration context.
#[macro_export]
macro_rules! pf_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__pf_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__pf_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with orchestration context.
#[macro_export]
macro_rules! pf_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__pf_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__pf_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with orchestration context.
#[macro_export]
macro_rules! pf_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__pf_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__pf_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
