//! The version clock, the only place that mints version-batch stamps.
//!
//! Every document produced by one synthesis run carries the same
//! [`VersionStamp`]. A "generation" of the knowledge base is the set of
//! documents sharing a stamp, so two runs must never share one.

use std::{
  fmt,
  sync::{Mutex, PoisonError},
  time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Stamp ───────────────────────────────────────────────────────────────────

/// The moment a synthesis run began, at microsecond resolution.
///
/// Stamps are truncated to whole microseconds on construction so that the
/// value read back from storage compares equal to the value written.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionStamp(DateTime<Utc>);

impl VersionStamp {
  pub fn from_datetime(at: DateTime<Utc>) -> Self { Self(at.trunc_subsecs(6)) }

  pub fn as_datetime(&self) -> DateTime<Utc> { self.0 }

  /// Fixed-width RFC 3339 form (`2024-05-01T09:30:00.000123Z`). Lexical
  /// order of encoded stamps matches chronological order.
  pub fn encode(&self) -> String {
    self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
  }

  /// The smallest stamp strictly after `self`.
  fn successor(self) -> Self { Self(self.0 + TimeDelta::microseconds(1)) }
}

impl fmt::Display for VersionStamp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.encode())
  }
}

// ─── Time source ─────────────────────────────────────────────────────────────

/// Where the clock reads the current time from.
pub trait TimeSource: Send + Sync {
  fn now(&self) -> Result<DateTime<Utc>>;
}

/// Reads the operating-system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
  fn now(&self) -> Result<DateTime<Utc>> {
    let since_epoch = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map_err(|e| Error::ClockUnavailable(e.to_string()))?;
    let secs = i64::try_from(since_epoch.as_secs())
      .map_err(|e| Error::ClockUnavailable(e.to_string()))?;
    DateTime::from_timestamp(secs, since_epoch.subsec_nanos())
      .ok_or_else(|| Error::ClockUnavailable("timestamp out of range".into()))
  }
}

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Issues one [`VersionStamp`] per synthesis run.
///
/// Stamps are strictly increasing for the lifetime of the clock, and strictly
/// after whatever `floor` the caller passes (normally the newest stamp already
/// persisted), so two runs never collide even if the wall clock stalls or
/// steps backwards.
pub struct VersionClock {
  source: Box<dyn TimeSource>,
  last:   Mutex<Option<VersionStamp>>,
}

impl VersionClock {
  pub fn system() -> Self { Self::with_source(SystemTimeSource) }

  pub fn with_source(source: impl TimeSource + 'static) -> Self {
    Self { source: Box::new(source), last: Mutex::new(None) }
  }

  /// Mint the stamp for a new run.
  ///
  /// Fails with [`Error::ClockUnavailable`] if the time source cannot be
  /// read; callers must abort the run rather than continue unversioned.
  pub fn tick(&self, floor: Option<VersionStamp>) -> Result<VersionStamp> {
    let now = VersionStamp::from_datetime(self.source.now()?);
    let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

    let stamp = match floor.max(*last) {
      Some(prev) if now <= prev => prev.successor(),
      _ => now,
    };
    *last = Some(stamp);
    Ok(stamp)
  }
}

impl Default for VersionClock {
  fn default() -> Self { Self::system() }
}

impl fmt::Debug for VersionClock {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("VersionClock").field("last", &self.last).finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  struct Frozen(DateTime<Utc>);

  impl TimeSource for Frozen {
    fn now(&self) -> Result<DateTime<Utc>> { Ok(self.0) }
  }

  struct Broken;

  impl TimeSource for Broken {
    fn now(&self) -> Result<DateTime<Utc>> {
      Err(Error::ClockUnavailable("no clock".into()))
    }
  }

  fn instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
  }

  #[test]
  fn frozen_clock_still_yields_distinct_stamps() {
    let clock = VersionClock::with_source(Frozen(instant()));
    let a = clock.tick(None).unwrap();
    let b = clock.tick(None).unwrap();
    assert!(b > a);
  }

  #[test]
  fn stamp_is_after_floor() {
    let clock = VersionClock::with_source(Frozen(instant()));
    let floor = VersionStamp::from_datetime(instant() + TimeDelta::seconds(5));
    let stamp = clock.tick(Some(floor)).unwrap();
    assert!(stamp > floor);
  }

  #[test]
  fn stamp_uses_current_time_when_ahead_of_floor() {
    let clock = VersionClock::with_source(Frozen(instant()));
    let floor = VersionStamp::from_datetime(instant() - TimeDelta::seconds(5));
    let stamp = clock.tick(Some(floor)).unwrap();
    assert_eq!(stamp.as_datetime(), instant());
  }

  #[test]
  fn unavailable_clock_is_an_error() {
    let clock = VersionClock::with_source(Broken);
    assert!(matches!(clock.tick(None), Err(Error::ClockUnavailable(_))));
  }

  #[test]
  fn stamps_are_truncated_to_microseconds() {
    let at = instant() + TimeDelta::nanoseconds(1_234_567);
    let stamp = VersionStamp::from_datetime(at);
    assert_eq!(stamp.encode(), "2024-05-01T09:30:00.001234Z");
  }
}
