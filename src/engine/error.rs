use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{DayKey, TimeOfDay};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{day:?}: opening {open} is not before closing {close}")]
    OpenNotBeforeClose {
        day: DayKey,
        open: TimeOfDay,
        close: TimeOfDay,
    },
    #[error("{day:?}: break {start}-{end} is outside opening hours or empty")]
    BreakOutsideHours {
        day: DayKey,
        start: TimeOfDay,
        end: TimeOfDay,
    },
    #[error("{day:?}: break at {start} overlaps the previous break")]
    OverlappingBreaks { day: DayKey, start: TimeOfDay },
    #[error("slot generation for {date} exceeded {limit} iterations")]
    IterationLimit { date: NaiveDate, limit: usize },
}
