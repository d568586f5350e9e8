//! Application-wide settings, fixed once the router is sealed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::render::Renderer;

/// Environment variable read by [`Settings::from_env`].
pub const DEBUG_ENV: &str = "BRISK_DEBUG";

/// Settings the dispatcher consults on every request.
#[derive(Clone, Default)]
pub struct Settings {
    /// Expose failure details in 500 bodies. Off in production.
    pub debug: bool,
    pub renderer: Option<Arc<dyn Renderer>>,
    values: HashMap<String, String>,
}

impl Settings {
    /// Defaults, with `debug` taken from `BRISK_DEBUG` (`1` or `true`).
    pub fn from_env() -> Self {
        let debug = std::env::var(DEBUG_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { debug, ..Self::default() }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("debug", &self.debug)
            .field("renderer", &self.renderer.is_some())
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_last_write_wins() {
        let mut s = Settings::default();
        s.set("views", "templates");
        s.set("views", "views");
        assert_eq!(s.get("views"), Some("views"));
        assert_eq!(s.get("missing"), None);
        assert!(!s.debug);
    }
}
