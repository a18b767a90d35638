//! SOA serial assignment policies (`spec.md` §4.4 step 1).

use time::OffsetDateTime;

use crate::config::SerialPolicy;

/// Compute the next serial for `policy` given the previous serial and the
/// current wall-clock time.
pub fn next_serial(policy: SerialPolicy, previous: u32, now_unix: i64) -> u32 {
    match policy {
        SerialPolicy::Counter => previous.wrapping_add(1),
        SerialPolicy::DateCounter => {
            let base = date_counter_base(now_unix);
            if previous >= base && previous < base + 100 {
                previous + 1
            } else {
                base
            }
        }
        SerialPolicy::UnixTime => {
            let now = now_unix.max(0) as u32;
            if now > previous {
                now
            } else {
                previous.wrapping_add(1)
            }
        }
        SerialPolicy::Keep => previous,
    }
}

fn date_counter_base(now_unix: i64) -> u32 {
    let dt = OffsetDateTime::from_unix_timestamp(now_unix).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let ymd = dt.year() as u32 * 10_000 + u8::from(dt.month()) as u32 * 100 + dt.day() as u32;
    ymd * 100
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counter_increments() {
        assert_eq!(next_serial(SerialPolicy::Counter, 5, 0), 6);
    }

    #[test]
    fn keep_is_unchanged() {
        assert_eq!(next_serial(SerialPolicy::Keep, 42, 123), 42);
    }

    #[test]
    fn datecounter_bumps_subcounter_same_day() {
        let day_start = 1_700_000_000; // arbitrary fixed instant
        let base = date_counter_base(day_start);
        assert_eq!(next_serial(SerialPolicy::DateCounter, base, day_start), base + 1);
    }

    #[test]
    fn datecounter_resets_on_new_day() {
        let base = date_counter_base(1_700_000_000);
        // A serial from a much earlier day should reset to the new day's base.
        assert_eq!(next_serial(SerialPolicy::DateCounter, 1, 1_700_000_000), base);
    }
}
