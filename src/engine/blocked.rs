use chrono::NaiveDate;

use crate::model::*;

use super::hours::DayHours;

/// Project booked slots and breaks onto `date`, sorted by start.
pub fn build_blocked_intervals(
    date: NaiveDate,
    day: &DayHours,
    booked: &[BookedSlot],
) -> Vec<BlockedInterval> {
    let mut blocked: Vec<BlockedInterval> = Vec::with_capacity(booked.len() + day.breaks.len());
    blocked.extend(booked.iter().map(|slot| slot.span_on(date)));
    blocked.extend(
        day.breaks
            .iter()
            .map(|b| Span::new(b.start.on(date), b.end.on(date))),
    );
    blocked.sort_by_key(|s| s.start);
    blocked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn day(breaks: Vec<Break>) -> DayHours {
        DayHours {
            open: t("09:00"),
            close: t("17:00"),
            breaks,
        }
    }

    #[test]
    fn empty_day_has_no_blocks() {
        assert!(build_blocked_intervals(date(), &day(vec![]), &[]).is_empty());
    }

    #[test]
    fn bookings_and_breaks_merge_sorted() {
        let breaks = vec![Break { start: t("12:00"), end: t("13:00") }];
        let booked = [
            BookedSlot::new(t("15:00"), 30),
            BookedSlot::new(t("10:00"), 60),
        ];
        let blocked = build_blocked_intervals(date(), &day(breaks), &booked);
        assert_eq!(
            blocked,
            vec![
                Span::at(date(), t("10:00"), 60),
                Span::at(date(), t("12:00"), 60),
                Span::at(date(), t("15:00"), 30),
            ]
        );
    }

    #[test]
    fn booking_may_run_past_midnight() {
        let booked = [BookedSlot::new(t("23:30"), 60)];
        let blocked = build_blocked_intervals(date(), &day(vec![]), &booked);
        assert_eq!(blocked[0].end.date(), date().succ_opt().unwrap());
    }
}
