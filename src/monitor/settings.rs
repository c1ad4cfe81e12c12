use std::env;

/// What happens to a fatal-class diagnostic when no monitor observer is
/// attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalPolicy {
    /// Panic with the diagnostic message.
    Halt,
    /// Log it and carry on.
    Continue,
}

impl Default for FatalPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            FatalPolicy::Halt
        } else {
            FatalPolicy::Continue
        }
    }
}

impl FatalPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "halt" | "panic" => Some(FatalPolicy::Halt),
            "continue" | "ignore" => Some(FatalPolicy::Continue),
            _ => None,
        }
    }
}

/// Process-wide store settings, applied with
/// [`StoreMonitor::configure`](super::StoreMonitor::configure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settings {
    /// Direct state writes raise a fatal-class diagnostic.
    pub strict_mode: bool,
    /// Main-context-only operations report calls from other threads.
    pub enforce_main_context: bool,
    /// Behaviour of fatal diagnostics with no observer attached.
    pub fatal_policy: FatalPolicy,
}

impl Settings {
    pub const STRICT_ENV: &'static str = "FLOWSTORE_STRICT";
    pub const ENFORCE_MAIN_ENV: &'static str = "FLOWSTORE_ENFORCE_MAIN";
    pub const FATAL_ENV: &'static str = "FLOWSTORE_FATAL";

    pub fn with_strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub fn with_enforce_main_context(mut self, enforce: bool) -> Self {
        self.enforce_main_context = enforce;
        self
    }

    pub fn with_fatal_policy(mut self, policy: FatalPolicy) -> Self {
        self.fatal_policy = policy;
        self
    }

    /// Defaults overridden by `FLOWSTORE_STRICT`, `FLOWSTORE_ENFORCE_MAIN`
    /// and `FLOWSTORE_FATAL`. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Settings::default();
        if let Some(raw) = lookup(Self::STRICT_ENV) {
            match parse_flag(&raw) {
                Some(flag) => settings.strict_mode = flag,
                None => tracing::warn!(key = Self::STRICT_ENV, value = %raw, "ignoring setting"),
            }
        }
        if let Some(raw) = lookup(Self::ENFORCE_MAIN_ENV) {
            match parse_flag(&raw) {
                Some(flag) => settings.enforce_main_context = flag,
                None => tracing::warn!(key = Self::ENFORCE_MAIN_ENV, value = %raw, "ignoring setting"),
            }
        }
        if let Some(raw) = lookup(Self::FATAL_ENV) {
            match FatalPolicy::parse(&raw) {
                Some(policy) => settings.fatal_policy = policy,
                None => tracing::warn!(key = Self::FATAL_ENV, value = %raw, "ignoring setting"),
            }
        }
        settings
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
