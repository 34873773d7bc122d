use chrono::NaiveDate;

use crate::model::*;

use super::EngineError;

/// One open day in query-ready form: validated, breaks sorted by start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayHours {
    pub open: TimeOfDay,
    pub close: TimeOfDay,
    pub breaks: Vec<Break>,
}

impl DayHours {
    /// The open window projected onto `date`.
    pub fn window_on(&self, date: NaiveDate) -> Span {
        Span::new(self.open.on(date), self.close.on(date))
    }

    fn normalize(day: DayKey, schedule: &DaySchedule) -> Result<Option<Self>, EngineError> {
        let (Some(open), Some(close)) = (schedule.open, schedule.close) else {
            return Ok(None);
        };
        if open >= close {
            return Err(EngineError::OpenNotBeforeClose { day, open, close });
        }

        let mut breaks = schedule.breaks.clone();
        breaks.sort_by_key(|b| b.start);
        for b in &breaks {
            if b.start >= b.end || b.start < open || b.end > close {
                return Err(EngineError::BreakOutsideHours {
                    day,
                    start: b.start,
                    end: b.end,
                });
            }
        }
        for pair in breaks.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(EngineError::OverlappingBreaks {
                    day,
                    start: pair[1].start,
                });
            }
        }

        Ok(Some(Self { open, close, breaks }))
    }
}

/// A business's weekly hours, checked once and then looked up per date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingHoursModel {
    days: [Option<DayHours>; 7],
}

impl WorkingHoursModel {
    pub fn new(hours: &WorkingHours) -> Result<Self, EngineError> {
        let mut days: [Option<DayHours>; 7] = Default::default();
        for key in DayKey::ALL {
            if let Some(schedule) = hours.get(key) {
                days[key as usize] = DayHours::normalize(key, schedule)?;
            }
        }
        Ok(Self { days })
    }

    /// `None` means closed: zero slots, nothing further to compute.
    pub fn hours_for(&self, date: NaiveDate) -> Option<&DayHours> {
        self.days[DayKey::of(date) as usize].as_ref()
    }

    pub fn is_closed_all_week(&self) -> bool {
        self.days.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn brk(start: &str, end: &str) -> Break {
        Break { start: t(start), end: t(end) }
    }

    // 2026-10-19 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn open_day_is_found() {
        let hours = WorkingHours::new().with_day(DayKey::Mon, t("09:00"), t("17:00"), vec![]);
        let model = WorkingHoursModel::new(&hours).unwrap();
        let day = model.hours_for(monday()).unwrap();
        assert_eq!(day.open, t("09:00"));
        assert_eq!(day.close, t("17:00"));
        assert!(model.hours_for(monday().succ_opt().unwrap()).is_none());
    }

    #[test]
    fn missing_close_means_closed() {
        let mut hours = WorkingHours::new();
        hours.0.insert(
            DayKey::Mon,
            DaySchedule {
                open: Some(t("09:00")),
                close: None,
                breaks: vec![],
            },
        );
        let model = WorkingHoursModel::new(&hours).unwrap();
        assert!(model.hours_for(monday()).is_none());
        assert!(model.is_closed_all_week());
    }

    #[test]
    fn breaks_are_sorted() {
        let hours = WorkingHours::new().with_day(
            DayKey::Mon,
            t("08:00"),
            t("18:00"),
            vec![brk("15:00", "15:30"), brk("12:00", "13:00")],
        );
        let model = WorkingHoursModel::new(&hours).unwrap();
        let day = model.hours_for(monday()).unwrap();
        assert_eq!(day.breaks[0].start, t("12:00"));
        assert_eq!(day.breaks[1].start, t("15:00"));
    }

    #[test]
    fn open_after_close_rejected() {
        let hours = WorkingHours::new().with_day(DayKey::Tue, t("17:00"), t("09:00"), vec![]);
        assert!(matches!(
            WorkingHoursModel::new(&hours),
            Err(EngineError::OpenNotBeforeClose { day: DayKey::Tue, .. })
        ));
    }

    #[test]
    fn break_outside_hours_rejected() {
        let hours = WorkingHours::new().with_day(
            DayKey::Mon,
            t("09:00"),
            t("17:00"),
            vec![brk("16:30", "17:30")],
        );
        assert!(matches!(
            WorkingHoursModel::new(&hours),
            Err(EngineError::BreakOutsideHours { .. })
        ));
    }

    #[test]
    fn overlapping_breaks_rejected() {
        let hours = WorkingHours::new().with_day(
            DayKey::Mon,
            t("09:00"),
            t("17:00"),
            vec![brk("12:00", "13:00"), brk("12:30", "13:30")],
        );
        assert!(matches!(
            WorkingHoursModel::new(&hours),
            Err(EngineError::OverlappingBreaks { .. })
        ));
    }

    #[test]
    fn window_projection() {
        let hours = WorkingHours::new().with_day(DayKey::Mon, t("09:00"), t("17:00"), vec![]);
        let model = WorkingHoursModel::new(&hours).unwrap();
        let window = model.hours_for(monday()).unwrap().window_on(monday());
        assert_eq!(window.duration_minutes(), 8 * 60);
    }
}
