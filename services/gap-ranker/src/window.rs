//! Session window gating
//!
//! Decides whether a ticker timestamp falls inside the tradable update
//! window of the venue's session:
//!
//! ```text
//! [open + bake_in, close - bake_out)
//! ```
//!
//! Session bounds come from a `TradingCalendar`. A date without a session
//! (weekend, holiday, or bounds the calendar cannot produce) rejects every
//! timestamp on that date.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tracing::warn;

/// Open and close instants of one session. Open is inclusive, close exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBounds {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl SessionBounds {
    pub fn contains<T: TimeZone>(&self, t: &DateTime<T>) -> bool {
        let t = t.with_timezone(&Utc);
        t >= self.open && t < self.close
    }
}

/// Trading calendar lookup for a single venue.
pub trait TradingCalendar: Send + Sync {
    /// Venue time zone; session dates are calendar dates in this zone.
    fn timezone(&self) -> Tz;

    /// Session bounds for `date`, or `None` if the venue does not trade.
    fn session_bounds(&self, date: NaiveDate) -> Option<SessionBounds>;
}

/// Weekday calendar with a fixed regular session, holidays, and early closes.
#[derive(Debug, Clone)]
pub struct ExchangeCalendar {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
    early_closes: BTreeMap<NaiveDate, NaiveTime>,
}

impl ExchangeCalendar {
    pub fn new(tz: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            tz,
            open,
            close,
            holidays: BTreeSet::new(),
            early_closes: BTreeMap::new(),
        }
    }

    /// NASDAQ regular hours, 09:30-16:00 America/New_York.
    pub fn nasdaq() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        )
    }

    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    pub fn with_early_close(mut self, date: NaiveDate, close: NaiveTime) -> Self {
        self.early_closes.insert(date, close);
        self
    }

    fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        // Non-existent or ambiguous local times have no well-defined session edge.
        self.tz
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl TradingCalendar for ExchangeCalendar {
    fn timezone(&self) -> Tz {
        self.tz
    }

    fn session_bounds(&self, date: NaiveDate) -> Option<SessionBounds> {
        if !self.is_session(date) {
            return None;
        }
        let close = self.early_closes.get(&date).copied().unwrap_or(self.close);
        Some(SessionBounds {
            open: self.local_instant(date, self.open)?,
            close: self.local_instant(date, close)?,
        })
    }
}

/// Qualified-window filter over a trading calendar.
///
/// All parameters are fixed at construction.
#[derive(Clone)]
pub struct SessionWindow {
    calendar: Arc<dyn TradingCalendar>,
    bake_in: Duration,
    bake_out: Duration,
    bypass: bool,
}

impl SessionWindow {
    /// Bake offsets are not validated; negative values widen the window.
    pub fn new(
        calendar: Arc<dyn TradingCalendar>,
        bake_in_minutes: i64,
        bake_out_minutes: i64,
        bypass: bool,
    ) -> Self {
        Self {
            calendar,
            bake_in: Duration::minutes(bake_in_minutes),
            bake_out: Duration::minutes(bake_out_minutes),
            bypass,
        }
    }

    /// Whether window filtering is disabled.
    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Venue calendar date of an instant.
    pub fn session_date<T: TimeZone>(&self, t: &DateTime<T>) -> NaiveDate {
        t.with_timezone(&self.calendar.timezone()).date_naive()
    }

    /// Raw session bounds for a date. Fails closed on malformed bounds.
    pub fn bounds(&self, date: NaiveDate) -> Option<SessionBounds> {
        let bounds = self.calendar.session_bounds(date)?;
        if bounds.open >= bounds.close {
            warn!(
                %date,
                open = %bounds.open,
                close = %bounds.close,
                "Calendar returned malformed session bounds, treating as closed"
            );
            return None;
        }
        Some(bounds)
    }

    /// Session bounds shrunk by the bake-in and bake-out offsets.
    pub fn qualified_bounds(&self, date: NaiveDate) -> Option<SessionBounds> {
        self.bounds(date).map(|b| SessionBounds {
            open: b.open + self.bake_in,
            close: b.close - self.bake_out,
        })
    }

    /// Whether `t` lies in `[open + bake_in, close - bake_out)` of its session.
    ///
    /// Ignores the bypass flag; see `accepts`.
    pub fn in_qualified_window<T: TimeZone>(&self, t: &DateTime<T>) -> bool {
        self.qualified_bounds(self.session_date(t))
            .map(|b| b.contains(t))
            .unwrap_or(false)
    }

    /// Whether `t` lies within the unshrunk session.
    pub fn in_session<T: TimeZone>(&self, t: &DateTime<T>) -> bool {
        self.bounds(self.session_date(t))
            .map(|b| b.contains(t))
            .unwrap_or(false)
    }

    /// Window filter decision: bypassed, or inside the qualified window.
    pub fn accepts<T: TimeZone>(&self, t: &DateTime<T>) -> bool {
        self.bypass || self.in_qualified_window(t)
    }
}

impl std::fmt::Debug for SessionWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWindow")
            .field("timezone", &self.calendar.timezone())
            .field("bake_in", &self.bake_in)
            .field("bake_out", &self.bake_out)
            .field("bypass", &self.bypass)
            .finish()
    }
}
