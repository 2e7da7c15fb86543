//! # Output Configuration
//!
//! Colour and emoji handling for the `tree-pager` binary, plus the few
//! formatting helpers its commands share.
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag, wins over everything else
//! - `NO_COLOR` - disables colours when set (https://no-color.org/)
//! - `CLICOLOR=0` - disables colours
//! - `CLICOLOR_FORCE=1` - forces colours even without a TTY
//! - `TERM=dumb` - disables colours
//!
//! ## Usage
//!
//! ```
//! use tree_pager::output::{emoji, OutputConfig};
//!
//! let out = OutputConfig::from_env_and_flag("never");
//! assert_eq!(emoji(&out, "📦", "[CACHE]"), "[CACHE]");
//! ```

use std::env;

use crate::cache::CacheStats;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag (`always`, `never` or `auto`) against the
    /// environment. Anything other than `always`/`never` means `auto`.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// `emoji_str` when colours are on, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// One line of cache residency, e.g. `[CACHE] cache#0: 2 resident, capacity 4`
pub fn cache_line(config: &OutputConfig, stats: &CacheStats) -> String {
    format!(
        "{} {}: {} resident, capacity {}",
        emoji(config, "📦", "[CACHE]"),
        stats.id,
        stats.size.map_or("unknown".to_string(), |s| s.to_string()),
        stats.capacity.map_or("unlimited".to_string(), |c| c.to_string()),
    )
}
