use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Half-open `[from, to)` range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    // Zones that skip midnight on DST days fall back to the UTC reading.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

fn local_date(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

fn span(tz: Tz, first: NaiveDate, days: u64) -> Window {
    let last = first.checked_add_days(Days::new(days)).unwrap_or(first);
    Window {
        from: local_midnight(tz, first),
        to: local_midnight(tz, last),
    }
}

/// The local calendar day `days_back` days before the one containing `now`.
pub fn day(tz: Tz, now: DateTime<Utc>, days_back: u64) -> Window {
    let today = local_date(tz, now);
    let date = today.checked_sub_days(Days::new(days_back)).unwrap_or(today);
    span(tz, date, 1)
}

/// The local week containing `now`, starting Monday.
pub fn week(tz: Tz, now: DateTime<Utc>) -> Window {
    let today = local_date(tz, now);
    let offset = u64::from(today.weekday().num_days_from_monday());
    let monday = today.checked_sub_days(Days::new(offset)).unwrap_or(today);
    span(tz, monday, 7)
}
