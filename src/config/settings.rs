//! Runtime settings for actions, with env overrides.

/// Env var overriding the page size used when `paginate.limit` is omitted.
pub const PAGE_SIZE_ENV: &str = "RESOURCE_ACTIONS_PAGE_SIZE";
/// Env var overriding the upper bound applied to `paginate.limit`.
pub const MAX_PAGE_SIZE_ENV: &str = "RESOURCE_ACTIONS_MAX_PAGE_SIZE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionSettings {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for ActionSettings {
    fn default() -> Self {
        ActionSettings {
            default_page_size: 10,
            max_page_size: 1000,
        }
    }
}

impl ActionSettings {
    /// Defaults overridden by env; unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ActionSettings::default();
        let read = |key: &str, fallback: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(fallback)
        };
        ActionSettings {
            default_page_size: read(PAGE_SIZE_ENV, defaults.default_page_size),
            max_page_size: read(MAX_PAGE_SIZE_ENV, defaults.max_page_size),
        }
    }

    /// Requested limit (or the default) bounded by `max_page_size`.
    pub fn page_limit(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.default_page_size).min(self.max_page_size)
    }
}
