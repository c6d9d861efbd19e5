use std::sync::{Arc, Mutex, RwLock};

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::Serialize;

use photoloop_shared::{parse_hhmm, Config, ScheduleEvent, ScheduleSettings};
use photoloop_state::DisplayMode;

use crate::collaborators::HolidayCalendar;

/// How far ahead to look for a mode change when computing override expiry and
/// the next transition. Covers schedules where whole days are homogeneous.
const LOOKAHEAD_DAYS: i64 = 7;

#[derive(Debug, Clone)]
struct Override {
    mode: DisplayMode,
    /// `None` means the override never expires (no differing event found).
    expires_at: Option<NaiveDateTime>,
}

/// Snapshot of schedule state for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    pub display_mode: DisplayMode,
    /// "manual" when an override is active, "disabled" when scheduling is
    /// off, otherwise "scheduled".
    pub mode_reason: &'static str,
    pub has_override: bool,
    pub override_mode: Option<DisplayMode>,
    pub override_expires: Option<NaiveDateTime>,
    pub is_holiday_today: bool,
    pub next_transition: Option<NaiveDateTime>,
    pub next_transition_description: Option<String>,
}

/// Event-based time-of-day state machine: produces a mode for "now", honors
/// weekend/holiday schedules, and supports auto-expiring manual overrides.
pub struct Scheduler {
    config: Arc<RwLock<Config>>,
    holidays: Arc<dyn HolidayCalendar>,
    override_state: Mutex<Option<Override>>,
}

impl Scheduler {
    pub fn new(config: Arc<RwLock<Config>>, holidays: Arc<dyn HolidayCalendar>) -> Self {
        Scheduler {
            config,
            holidays,
            override_state: Mutex::new(None),
        }
    }

    /// The mode that should be on screen at `now`.
    pub fn display_mode(&self, now: NaiveDateTime) -> DisplayMode {
        if let Some(mode) = self.active_override(now) {
            return mode;
        }

        let config = self.config.read().unwrap();
        if !config.schedule.enabled {
            return DisplayMode::Slideshow;
        }

        let events = self.events_for_day(&config.schedule, now.date());
        match current_event(&events, now) {
            Some(event) => event.mode,
            // A malformed schedule that covers nothing defaults to black.
            None => DisplayMode::Black,
        }
    }

    pub fn display_mode_now(&self) -> DisplayMode {
        self.display_mode(Local::now().naive_local())
    }

    /// Force a mode until the next scheduled event whose mode differs from
    /// it. With a homogeneous schedule the search runs up to a week ahead;
    /// past that the override simply never expires.
    pub fn force_mode(&self, mode: DisplayMode) {
        self.force_mode_at(mode, Local::now().naive_local());
    }

    pub fn force_mode_at(&self, mode: DisplayMode, now: NaiveDateTime) {
        let expires_at = {
            let config = self.config.read().unwrap();
            self.next_differing_event_start(&config.schedule, mode, now)
        };
        match expires_at {
            Some(at) => tracing::info!("schedule override: {mode} (expires at {at})"),
            None => tracing::info!("schedule override: {mode} (no expiry)"),
        }
        *self.override_state.lock().unwrap() = Some(Override { mode, expires_at });
    }

    pub fn clear_override(&self) {
        *self.override_state.lock().unwrap() = None;
        tracing::info!("schedule override cleared, resuming normal schedule");
    }

    pub fn has_override(&self) -> bool {
        self.has_override_at(Local::now().naive_local())
    }

    pub fn has_override_at(&self, now: NaiveDateTime) -> bool {
        self.active_override(now).is_some()
    }

    /// The next moment the effective mode will change, with a description.
    /// Override expiry takes precedence; otherwise the event lists are
    /// scanned forward for the first event with a different mode. `None`
    /// when scheduling is disabled or nothing changes within the lookahead.
    pub fn next_transition(&self, now: NaiveDateTime) -> Option<(NaiveDateTime, String)> {
        let config = self.config.read().unwrap();
        if !config.schedule.enabled {
            return None;
        }

        if let Some(ov) = self.active_override_state(now) {
            // A never-expiring override means the mode never changes.
            return ov
                .expires_at
                .map(|at| (at, "override expires (resume schedule)".to_string()));
        }

        let events = self.events_for_day(&config.schedule, now.date());
        let current_mode = current_event(&events, now).map(|e| e.mode)?;

        self.next_differing_event(&config.schedule, current_mode, now)
            .map(|(at, mode)| (at, format!("switch to {mode}")))
    }

    pub fn status(&self, now: NaiveDateTime) -> ScheduleStatus {
        let display_mode = self.display_mode(now);
        let ov = self.active_override_state(now);
        let (enabled, is_holiday_today) = {
            let config = self.config.read().unwrap();
            (
                config.schedule.enabled,
                self.is_holiday(&config.schedule, now.date()),
            )
        };
        let mode_reason = if ov.is_some() {
            "manual"
        } else if !enabled {
            "disabled"
        } else {
            "scheduled"
        };
        let next = self.next_transition(now);
        ScheduleStatus {
            enabled,
            display_mode,
            mode_reason,
            has_override: ov.is_some(),
            override_mode: ov.as_ref().map(|o| o.mode),
            override_expires: ov.as_ref().and_then(|o| o.expires_at),
            is_holiday_today,
            next_transition: next.as_ref().map(|(at, _)| *at),
            next_transition_description: next.map(|(_, description)| description),
        }
    }

    /// Current override, clearing it first if it has expired.
    fn active_override_state(&self, now: NaiveDateTime) -> Option<Override> {
        let mut state = self.override_state.lock().unwrap();
        let expired = state
            .as_ref()
            .and_then(|ov| ov.expires_at)
            .is_some_and(|expires_at| now >= expires_at);
        if expired {
            tracing::info!("override expired, resuming schedule");
            *state = None;
        }
        state.clone()
    }

    fn active_override(&self, now: NaiveDateTime) -> Option<DisplayMode> {
        self.active_override_state(now).map(|ov| ov.mode)
    }

    fn is_holiday(&self, schedule: &ScheduleSettings, date: NaiveDate) -> bool {
        schedule.holidays.use_weekend_schedule
            && schedule
                .holidays
                .countries
                .iter()
                .any(|country| self.holidays.is_holiday(date, country))
    }

    /// Event list for a calendar day: the per-weekday override if present,
    /// else the weekend list on Sat/Sun or holidays, else the weekday list.
    fn events_for_day(&self, schedule: &ScheduleSettings, date: NaiveDate) -> Vec<ScheduleEvent> {
        let day_name = weekday_name(date.weekday());
        if let Some(events) = schedule.overrides.get(day_name) {
            return events.clone();
        }
        let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        if is_weekend || self.is_holiday(schedule, date) {
            schedule.weekend.clone()
        } else {
            schedule.weekday.clone()
        }
    }

    /// Start of the next event (strictly after `now`) whose mode differs from
    /// `mode`, scanning today's remainder and then up to a week ahead.
    fn next_differing_event_start(
        &self,
        schedule: &ScheduleSettings,
        mode: DisplayMode,
        now: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        self.next_differing_event(schedule, mode, now).map(|(at, _)| at)
    }

    fn next_differing_event(
        &self,
        schedule: &ScheduleSettings,
        mode: DisplayMode,
        now: NaiveDateTime,
    ) -> Option<(NaiveDateTime, DisplayMode)> {
        let now_minutes = now.hour() * 60 + now.minute();

        let today = self.events_for_day(schedule, now.date());
        for event in &today {
            let Some(start) = parse_hhmm(&event.start_time) else {
                continue;
            };
            if start > now_minutes && event.mode != mode {
                return Some((at_minutes(now.date(), start)?, event.mode));
            }
        }

        for days_ahead in 1..=LOOKAHEAD_DAYS {
            let date = now.date() + Duration::days(days_ahead);
            for event in self.events_for_day(schedule, date) {
                let Some(start) = parse_hhmm(&event.start_time) else {
                    continue;
                };
                if event.mode != mode {
                    return Some((at_minutes(date, start)?, event.mode));
                }
            }
        }

        None
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn at_minutes(date: NaiveDate, minutes: u32) -> Option<NaiveDateTime> {
    // Minute 1440 can only come from "24:00" used as a start, which a
    // well-formed schedule never has; treat it as midnight of the next day.
    if minutes >= 24 * 60 {
        return (date + Duration::days(1)).and_hms_opt(0, 0, 0);
    }
    date.and_hms_opt(minutes / 60, minutes % 60, 0)
}

/// The event covering `now`, matching on `[start, end)` with minute
/// granularity; an end of `"24:00"` covers through the last instant of the
/// day.
fn current_event(events: &[ScheduleEvent], now: NaiveDateTime) -> Option<&ScheduleEvent> {
    let now_minutes = now.hour() * 60 + now.minute();
    events.iter().find(|event| {
        let (Some(start), Some(end)) = (parse_hhmm(&event.start_time), parse_hhmm(&event.end_time))
        else {
            return false;
        };
        start <= now_minutes && now_minutes < end
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use photoloop_shared::HolidaySettings;

    /// Calendar that treats a fixed set of dates as holidays everywhere.
    struct FixedHolidays(Vec<NaiveDate>);

    impl HolidayCalendar for FixedHolidays {
        fn is_holiday(&self, date: NaiveDate, _country: &str) -> bool {
            self.0.contains(&date)
        }
    }

    fn scheduler_with(
        schedule: ScheduleSettings,
        holidays: Vec<NaiveDate>,
    ) -> Scheduler {
        let config = Config {
            schedule,
            ..Default::default()
        };
        Scheduler::new(
            Arc::new(RwLock::new(config)),
            Arc::new(FixedHolidays(holidays)),
        )
    }

    fn scheduler() -> Scheduler {
        scheduler_with(ScheduleSettings::default(), Vec::new())
    }

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    // 2026-01-05 is a Monday.
    const MONDAY: &str = "2026-01-05";
    const TUESDAY: &str = "2026-01-06";

    #[test]
    fn weekday_transitions_at_event_boundaries() {
        let s = scheduler();
        assert_eq!(s.display_mode(at(MONDAY, "06:59:59")), DisplayMode::Black);
        assert_eq!(
            s.display_mode(at(MONDAY, "07:00:00")),
            DisplayMode::Slideshow
        );
        assert_eq!(
            s.display_mode(at(MONDAY, "21:59:00")),
            DisplayMode::Slideshow
        );
        assert_eq!(s.display_mode(at(MONDAY, "22:00:00")), DisplayMode::Black);

        let (when, description) = s.next_transition(at(MONDAY, "06:59:59")).unwrap();
        assert_eq!(when, at(MONDAY, "07:00:00"));
        assert_eq!(description, "switch to slideshow");
    }

    #[test]
    fn end_of_day_event_covers_last_instant() {
        let s = scheduler();
        assert_eq!(s.display_mode(at(MONDAY, "23:59:59")), DisplayMode::Black);
    }

    #[test]
    fn disabled_schedule_is_always_slideshow() {
        let s = scheduler_with(
            ScheduleSettings {
                enabled: false,
                ..Default::default()
            },
            Vec::new(),
        );
        assert_eq!(s.display_mode(at(MONDAY, "03:00:00")), DisplayMode::Slideshow);
        assert_eq!(s.next_transition(at(MONDAY, "03:00:00")), None);
    }

    #[test]
    fn malformed_schedule_defaults_to_black() {
        let s = scheduler_with(
            ScheduleSettings {
                weekday: vec![ScheduleEvent::new("09:00", "17:00", DisplayMode::Slideshow)],
                ..Default::default()
            },
            Vec::new(),
        );
        // 03:00 falls in the uncovered gap.
        assert_eq!(s.display_mode(at(MONDAY, "03:00:00")), DisplayMode::Black);
    }

    #[test]
    fn holiday_uses_weekend_schedule() {
        let holiday = NaiveDate::parse_from_str(MONDAY, "%Y-%m-%d").unwrap();
        let s = scheduler_with(
            ScheduleSettings {
                holidays: HolidaySettings {
                    use_weekend_schedule: true,
                    countries: vec!["US".to_string()],
                },
                ..Default::default()
            },
            vec![holiday],
        );
        // A normal Monday would already be in slideshow at 07:30; the weekend
        // schedule does not start until 08:00.
        assert_eq!(s.display_mode(at(MONDAY, "07:30:00")), DisplayMode::Black);
        assert_eq!(
            s.display_mode(at(MONDAY, "08:00:00")),
            DisplayMode::Slideshow
        );
    }

    #[test]
    fn weekend_days_use_weekend_schedule_without_holiday() {
        let s = scheduler();
        // 2026-01-10 is a Saturday.
        assert_eq!(
            s.display_mode(at("2026-01-10", "07:30:00")),
            DisplayMode::Black
        );
    }

    #[test]
    fn override_expires_at_next_differing_event() {
        let s = scheduler();
        let now = at(MONDAY, "10:00:00");

        // Forcing black at 10:00: today's 22:00 event is also black, so the
        // expiry search continues to tomorrow's 07:00 slideshow.
        s.force_mode_at(DisplayMode::Black, now);
        assert_eq!(s.display_mode(now), DisplayMode::Black);
        assert!(s.has_override_at(now));

        let (when, _) = s.next_transition(now).unwrap();
        assert_eq!(when, at(TUESDAY, "07:00:00"));

        let just_before = at(TUESDAY, "06:59:00");
        assert_eq!(s.display_mode(just_before), DisplayMode::Black);
        assert!(s.has_override_at(just_before));

        let after = at(TUESDAY, "09:59:00");
        assert_eq!(s.display_mode(after), DisplayMode::Slideshow);
        assert!(!s.has_override_at(after));
    }

    #[test]
    fn late_override_expires_next_day_not_same_evening() {
        let s = scheduler_with(
            ScheduleSettings {
                weekday: vec![
                    ScheduleEvent::new("00:00", "22:00", DisplayMode::Slideshow),
                    ScheduleEvent::new("22:00", "24:00", DisplayMode::Black),
                ],
                weekend: vec![
                    ScheduleEvent::new("00:00", "22:00", DisplayMode::Slideshow),
                    ScheduleEvent::new("22:00", "24:00", DisplayMode::Black),
                ],
                ..Default::default()
            },
            Vec::new(),
        );
        let now = at(MONDAY, "23:50:00");
        s.force_mode_at(DisplayMode::Slideshow, now);
        // Tomorrow's 00:00 event matches the forced mode, so the expiry
        // search skips past it to tomorrow's 22:00 black.
        let (when, _) = s.next_transition(now).unwrap();
        assert_eq!(when, at(TUESDAY, "22:00:00"));
    }

    #[test]
    fn clear_override_resumes_schedule_immediately() {
        let s = scheduler();
        let now = at(MONDAY, "03:00:00");
        s.force_mode_at(DisplayMode::Slideshow, now);
        assert_eq!(s.display_mode(now), DisplayMode::Slideshow);
        s.clear_override();
        assert_eq!(s.display_mode(now), DisplayMode::Black);
    }

    #[test]
    fn midnight_boundary_override_expiry() {
        let s = scheduler_with(
            ScheduleSettings {
                weekday: vec![
                    ScheduleEvent::new("00:00", "12:00", DisplayMode::Slideshow),
                    ScheduleEvent::new("12:00", "24:00", DisplayMode::Black),
                ],
                weekend: vec![
                    ScheduleEvent::new("00:00", "12:00", DisplayMode::Slideshow),
                    ScheduleEvent::new("12:00", "24:00", DisplayMode::Black),
                ],
                ..Default::default()
            },
            Vec::new(),
        );
        // Forcing black at 23:50: the next differing event is tomorrow's
        // slideshow starting at midnight, so the expiry is 00:00 next day.
        let now = at(MONDAY, "23:50:00");
        s.force_mode_at(DisplayMode::Black, now);
        let (when, _) = s.next_transition(now).unwrap();
        assert_eq!(when, at(TUESDAY, "00:00:00"));
    }

    #[test]
    fn status_reports_reason() {
        let s = scheduler();
        let now = at(MONDAY, "10:00:00");
        assert_eq!(s.status(now).mode_reason, "scheduled");
        s.force_mode_at(DisplayMode::Clock, now);
        let status = s.status(now);
        assert_eq!(status.mode_reason, "manual");
        assert_eq!(status.override_mode, Some(DisplayMode::Clock));
    }
}
