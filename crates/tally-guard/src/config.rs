//! # Guard Configuration
//!
//! Variables read by [`GuardConfig::from_env`]:
//! - `TALLY_AUDIT_ENABLED` (default: `true`)
//! - `TALLY_EVENTS_ENABLED` (default: `true`)
//! - `TALLY_SIDE_EFFECT_QUEUE_CAPACITY` (default: 1024)
//! - `TALLY_DEFAULT_ACTOR` (default: `system`)
//!
//! Unparseable values are logged and replaced by the default.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Emit an audit record for every write to an audited entity.
    pub audit_enabled: bool,
    /// Derive and persist operational events.
    pub events_enabled: bool,
    /// Bound of the side-effect channel.
    pub queue_capacity: usize,
    /// Actor recorded when the request names neither an audit actor nor a user.
    pub default_actor: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            events_enabled: true,
            queue_capacity: 1024,
            default_actor: "system".to_string(),
        }
    }
}

impl GuardConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            audit_enabled: env_bool("TALLY_AUDIT_ENABLED", defaults.audit_enabled),
            events_enabled: env_bool("TALLY_EVENTS_ENABLED", defaults.events_enabled),
            queue_capacity: env_capacity("TALLY_SIDE_EFFECT_QUEUE_CAPACITY", defaults.queue_capacity),
            default_actor: std::env::var("TALLY_DEFAULT_ACTOR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_actor),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(var: &str, default: bool) -> bool {
    let Ok(raw) = std::env::var(var) else {
        return default;
    };
    parse_bool(&raw).unwrap_or_else(|| {
        tracing::warn!(var, value = %raw, default, "ignoring unparseable boolean");
        default
    })
}

fn parse_capacity(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

fn env_capacity(var: &str, default: usize) -> usize {
    let Ok(raw) = std::env::var(var) else {
        return default;
    };
    parse_capacity(&raw).unwrap_or_else(|| {
        tracing::warn!(var, value = %raw, default, "ignoring invalid queue capacity");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn capacity_must_be_positive() {
        assert_eq!(parse_capacity("64"), Some(64));
        assert_eq!(parse_capacity("0"), None);
        assert_eq!(parse_capacity("-3"), None);
    }

    #[test]
    fn defaults() {
        let cfg = GuardConfig::default();
        assert!(cfg.audit_enabled && cfg.events_enabled);
        assert_eq!(cfg.queue_capacity, 1024);
        assert_eq!(cfg.default_actor, "system");
    }
}
