//! Structured logging helpers for table events.

/// Single logging target for strata.
pub(crate) const LOG_TARGET: &str = "strata";

/// Common key/value fields appended to every log line in a scope.
#[derive(Clone, Debug)]
pub(crate) struct LogContext {
    common_kv: String,
}

impl LogContext {
    /// Context tagging every line with the table name.
    pub(crate) fn for_table(table: &str) -> Self {
        Self {
            common_kv: format!("table={table}"),
        }
    }

    pub(crate) fn common_kv(&self) -> Option<&str> {
        if self.common_kv.is_empty() {
            None
        } else {
            Some(&self.common_kv)
        }
    }
}

macro_rules! strata_log {
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
    ($level:expr, ctx: $ctx:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            match $ctx.common_kv() {
                Some(common_kv) => log::log!(
                    target: crate::logging::LOG_TARGET,
                    $level,
                    "event={} {} {}",
                    $event,
                    common_kv,
                    format_args!($fmt $(, $args)*)
                ),
                None => log::log!(
                    target: crate::logging::LOG_TARGET,
                    $level,
                    "event={} {}",
                    $event,
                    format_args!($fmt $(, $args)*)
                ),
            }
        }
    }};
}

pub(crate) use strata_log;
