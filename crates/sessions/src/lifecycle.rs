//! Session reset lifecycle — daily reset hour + idle timeout.
//!
//! Evaluated whenever a session is touched (a message added, a status
//! check). If the session is stale the caller resets it by minting a fresh
//! session in its place; this module only decides *whether*, not *how*.

use chrono::{DateTime, Utc};

use kory_domain::config::LifecycleConfig;
use kory_domain::session::Session;

/// Reason a session should be reset, if any.
#[derive(Debug, Clone)]
pub enum ResetReason {
    DailyReset { hour: u8 },
    IdleTimeout { idle_minutes: u32 },
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyReset { hour } => write!(f, "daily reset (hour={hour})"),
            Self::IdleTimeout { idle_minutes } => {
                write!(f, "idle timeout ({idle_minutes}m)")
            }
        }
    }
}

/// Evaluates whether a session has gone stale under the configured lifecycle
/// rules.
pub struct LifecycleManager {
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Evaluate whether `session` should be reset at `now`. Daily reset is
    /// checked before idle timeout since it is the coarser boundary.
    pub fn should_reset(&self, session: &Session, now: DateTime<Utc>) -> Option<ResetReason> {
        if let Some(hour) = self.config.daily_reset_hour {
            if crossed_daily_boundary(session.updated_at, now, hour) {
                return Some(ResetReason::DailyReset { hour });
            }
        }

        if let Some(idle) = self.config.idle_minutes {
            let elapsed = now.signed_duration_since(session.updated_at).num_minutes();
            if elapsed >= idle as i64 {
                return Some(ResetReason::IdleTimeout { idle_minutes: idle });
            }
        }

        None
    }
}

/// Check whether the daily boundary at `hour` was crossed between
/// `last_active` and `now`.
fn crossed_daily_boundary(last_active: DateTime<Utc>, now: DateTime<Utc>, hour: u8) -> bool {
    if now.signed_duration_since(last_active).num_seconds() < 60 {
        return false;
    }

    let Some(today_boundary) = now.date_naive().and_hms_opt(hour as u32, 0, 0) else {
        return false;
    };
    let today_boundary = today_boundary.and_utc();

    let boundary = if now >= today_boundary {
        today_boundary
    } else {
        today_boundary - chrono::Duration::days(1)
    };

    last_active < boundary && now >= boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_boundary_crossed() {
        let last = Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 5, 0, 0).unwrap();
        assert!(crossed_daily_boundary(last, now, 4));
    }

    #[test]
    fn daily_boundary_not_crossed() {
        let last = Utc.with_ymd_and_hms(2026, 1, 15, 5, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 6, 0, 0).unwrap();
        assert!(!crossed_daily_boundary(last, now, 4));
    }

    #[test]
    fn daily_boundary_across_days() {
        let last = Utc.with_ymd_and_hms(2026, 1, 14, 23, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 5, 0, 0).unwrap();
        assert!(crossed_daily_boundary(last, now, 4));
    }

    #[test]
    fn idle_timeout() {
        let cfg = LifecycleConfig {
            daily_reset_hour: None,
            idle_minutes: Some(30),
        };
        let mgr = LifecycleManager::new(cfg);
        let mut session = Session::new("s1");
        session.updated_at = Utc::now() - chrono::Duration::minutes(45);

        let reason = mgr.should_reset(&session, Utc::now());
        assert!(matches!(reason, Some(ResetReason::IdleTimeout { .. })));
    }

    #[test]
    fn fresh_session_is_not_reset() {
        let cfg = LifecycleConfig {
            daily_reset_hour: None,
            idle_minutes: Some(30),
        };
        let mgr = LifecycleManager::new(cfg);
        let session = Session::new("s1");
        assert!(mgr.should_reset(&session, Utc::now()).is_none());
    }
}
