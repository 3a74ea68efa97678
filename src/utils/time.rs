use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, TimeZone, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn from_rfc3339(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Monday 00:00 of the week containing `now`, in `now`'s offset.
pub fn start_of_week(now: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    let date = now.date_naive();
    let monday = date.checked_sub_days(Days::new(date.weekday().num_days_from_monday() as u64))?;
    local_midnight(monday, *now.offset())
}

pub fn start_of_next_week(now: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    start_of_week(now)?.checked_add_days(Days::new(7))
}

/// First day of the month containing `now`, 00:00 in `now`'s offset.
pub fn start_of_month(now: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    let first = now.date_naive().with_day(1)?;
    local_midnight(first, *now.offset())
}

pub fn start_of_next_month(now: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    let next = now.date_naive().with_day(1)?.checked_add_months(Months::new(1))?;
    local_midnight(next, *now.offset())
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_starts_on_monday() {
        // 2024-05-16 is a Thursday
        let now = from_rfc3339("2024-05-16T10:00:00Z")
            .unwrap()
            .with_timezone(&FixedOffset::east_opt(0).unwrap());
        assert_eq!(start_of_week(now), Some(from_rfc3339("2024-05-13T00:00:00Z").unwrap()));
        assert_eq!(start_of_next_week(now), Some(from_rfc3339("2024-05-20T00:00:00Z").unwrap()));
    }

    #[test]
    fn month_bounds_follow_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let now = from_rfc3339("2024-01-31T22:30:00Z").unwrap().with_timezone(&offset);
        // Already February 1st in UTC+3.
        assert_eq!(start_of_month(now), Some(from_rfc3339("2024-01-31T21:00:00Z").unwrap()));
        assert_eq!(start_of_next_month(now), Some(from_rfc3339("2024-02-29T21:00:00Z").unwrap()));
    }
}
