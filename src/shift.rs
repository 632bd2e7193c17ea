//! Shift windows: whether a wall-clock time falls inside a class's shift.

use chrono::{NaiveTime, Timelike};

use crate::entities::shift;

/// Daily window in minutes since midnight. `end < start` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftWindow {
    start: u32,
    end: u32,
}

impl ShiftWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: minute_of_day(start),
            end: minute_of_day(end),
        }
    }

    /// Parses two `HH:MM` (or `HH:MM:SS`) bounds.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self::new(parse_time(start)?, parse_time(end)?))
    }

    /// Built-in bounds for a named shift lacking explicit ones.
    pub fn default_for(name: &str) -> Option<Self> {
        let (start, end) = match name.trim().to_ascii_uppercase().as_str() {
            "MORNING" | "MANANA" | "MAÑANA" => ("06:00", "13:10"),
            "AFTERNOON" | "TARDE" => ("13:00", "18:10"),
            "NIGHT" | "NOCHE" => ("17:50", "23:10"),
            "WEEKEND" | "FIN DE SEMANA" | "FINES DE SEMANA" => ("06:00", "18:00"),
            _ => return None,
        };
        Self::parse(start, end)
    }

    /// Window for a configured shift, `None` when it cannot be determined.
    pub fn resolve(shift: &shift::Model) -> Option<Self> {
        let explicit = shift
            .start_time
            .as_deref()
            .zip(shift.end_time.as_deref())
            .filter(|(start, end)| !start.trim().is_empty() && !end.trim().is_empty());

        match explicit {
            Some((start, end)) => {
                let window = Self::parse(start, end);
                if window.is_none() {
                    tracing::warn!(shift_id = shift.id, start, end, "Unparseable shift bounds");
                }
                window
            }
            None => Self::default_for(&shift.name),
        }
    }

    /// Inclusive on both ends, compared at minute resolution.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = minute_of_day(time);
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

/// Permissive check: a class without a resolvable window is always open.
pub fn is_within_shift(shift: Option<&shift::Model>, now: NaiveTime) -> bool {
    match shift.and_then(ShiftWindow::resolve) {
        Some(window) => window.contains(now),
        None => true,
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn shift(name: &str, start: Option<&str>, end: Option<&str>) -> shift::Model {
        shift::Model {
            id: 1,
            name: name.to_string(),
            start_time: start.map(str::to_string),
            end_time: end.map(str::to_string),
        }
    }

    #[test]
    fn test_explicit_afternoon_bounds() {
        let s = shift("AFTERNOON", Some("13:00"), Some("18:10"));
        assert!(!is_within_shift(Some(&s), at(12, 59, 59)));
        assert!(is_within_shift(Some(&s), at(13, 0, 0)));
        assert!(is_within_shift(Some(&s), at(18, 10, 30)));
        assert!(!is_within_shift(Some(&s), at(18, 11, 0)));
    }

    #[test]
    fn test_named_defaults() {
        let morning = shift("MORNING", None, None);
        assert!(is_within_shift(Some(&morning), at(6, 0, 0)));
        assert!(!is_within_shift(Some(&morning), at(13, 11, 0)));

        let night = shift("night", None, None);
        assert!(is_within_shift(Some(&night), at(17, 50, 0)));
        assert!(!is_within_shift(Some(&night), at(23, 30, 0)));

        let weekend = shift("WEEKEND", Some(""), Some(""));
        assert!(is_within_shift(Some(&weekend), at(12, 0, 0)));
        assert!(!is_within_shift(Some(&weekend), at(19, 0, 0)));

        let fines = shift("Fines de semana", None, None);
        assert_eq!(ShiftWindow::resolve(&fines), ShiftWindow::default_for("WEEKEND"));
        assert!(!is_within_shift(Some(&fines), at(19, 0, 0)));
    }

    #[test]
    fn test_wraps_midnight() {
        let late = shift("CUSTOM", Some("22:00"), Some("02:00"));
        assert!(is_within_shift(Some(&late), at(23, 30, 0)));
        assert!(is_within_shift(Some(&late), at(0, 15, 0)));
        assert!(is_within_shift(Some(&late), at(2, 0, 0)));
        assert!(!is_within_shift(Some(&late), at(12, 0, 0)));
    }

    #[test]
    fn test_unknown_or_missing_is_permissive() {
        assert!(is_within_shift(None, at(3, 0, 0)));
        assert!(is_within_shift(Some(&shift("ROTATING", None, None)), at(3, 0, 0)));
        assert!(is_within_shift(
            Some(&shift("MORNING", Some("soon"), Some("later"))),
            at(3, 0, 0)
        ));
    }

    #[test]
    fn test_seconds_in_bounds_accepted() {
        let window = ShiftWindow::parse("07:30:00", "09:00:00").unwrap();
        assert!(window.contains(at(7, 30, 0)));
        assert!(!window.contains(at(7, 29, 59)));
    }
}
