//! Conversion between wall-clock instants and the internal time line.
//!
//! Internally every time is an `i32` number of seconds relative to UTC
//! midnight of the query's reference date. Schedules are stored in local
//! service-day seconds; they are shifted onto the internal time line with the
//! zone offset at local noon of the service date, which is stable across the
//! DST switch that happens at night.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::TimeType;

pub const SECONDS_PER_DAY: i32 = 86_400;

/// Anchor instant of a batch of source times: the earliest time for
/// departure queries, the latest for arrival queries.
pub fn reference_datetime<'a, I>(times: I, time_type: TimeType) -> Option<DateTime<FixedOffset>>
where
    I: IntoIterator<Item = &'a DateTime<FixedOffset>>,
{
    let times = times.into_iter().copied();
    match time_type {
        TimeType::Departure => times.min(),
        TimeType::Arrival => times.max(),
    }
}

/// UTC midnight at the start of `date`.
pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Seconds between UTC midnight of `reference_date` and `datetime`, clamped
/// to the representable range (never reaching `i32::MIN`).
pub fn to_utc_seconds(datetime: &DateTime<FixedOffset>, reference_date: NaiveDate) -> i32 {
    let seconds = datetime.timestamp() - utc_midnight(reference_date).timestamp();
    i32::try_from(seconds).unwrap_or(if seconds < 0 { -i32::MAX } else { i32::MAX })
}

/// The instant `seconds` after UTC midnight of `reference_date`, expressed in
/// `zone`. Local times inside a DST gap never occur since the conversion goes
/// through the absolute instant.
pub fn to_offset_datetime<Z: TimeZone>(
    seconds: i32,
    reference_date: NaiveDate,
    zone: &Z,
) -> DateTime<FixedOffset> {
    let instant = utc_midnight(reference_date) + Duration::seconds(i64::from(seconds));
    instant.with_timezone(zone).fixed_offset()
}

/// Offset (seconds) converting local service-day seconds of `date` in `zone`
/// to UTC seconds relative to UTC midnight of `date`. Zurich in winter
/// (UTC+1) yields -3600.
pub fn local_to_utc_offset(date: NaiveDate, zone: &Tz) -> i32 {
    let noon = date.and_time(NaiveTime::MIN) + Duration::hours(12);
    let offset = zone
        .offset_from_local_datetime(&noon)
        .earliest()
        .unwrap_or_else(|| zone.offset_from_utc_datetime(&noon));
    -offset.fix().local_minus_utc()
}
