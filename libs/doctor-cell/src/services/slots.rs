use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use shared_config::ClinicHours;
use shared_models::appointment::Appointment;
use shared_models::schedule::{DoctorDayOff, Schedule, Session};

use crate::models::{DaySlots, Slot, UnavailableReason};

/// Working window of a session in clinic-local time.
pub fn session_window(hours: &ClinicHours, session: Session) -> (NaiveTime, NaiveTime) {
    match session {
        Session::Morning => (hours.morning_start, hours.morning_end),
        Session::Afternoon => (hours.afternoon_start, hours.afternoon_end),
    }
}

/// Session an appointment instant belongs to.
pub fn session_of(hours: &ClinicHours, instant: DateTime<Utc>) -> Session {
    if hours.local_datetime(instant).time() < hours.afternoon_start {
        Session::Morning
    } else {
        Session::Afternoon
    }
}

fn session_slots(date: NaiveDate, session: Session, hours: &ClinicHours) -> Vec<Slot> {
    let (start, end) = session_window(hours, session);
    let step = hours.slot_duration();
    let mut slots = Vec::new();

    if step <= Duration::zero() {
        return slots;
    }

    let mut current = date.and_time(start);
    let window_end = date.and_time(end);
    while current + step <= window_end {
        slots.push(Slot {
            date,
            start: current.time(),
            end: (current + step).time(),
            session,
            starts_at: hours.to_utc(date, current.time()),
        });
        current += step;
    }

    slots
}

/// Bookable slots of one doctor on one clinic-local date.
///
/// `day_off` must be the active day-off for `date`, if any. `booked` holds the
/// doctor's slot-blocking appointments; entries on other dates are ignored.
pub fn compute_day_slots(
    date: NaiveDate,
    schedule: Option<&Schedule>,
    day_off: Option<&DoctorDayOff>,
    booked: &[Appointment],
    hours: &ClinicHours,
    now: DateTime<Utc>,
) -> DaySlots {
    let today = hours.local_date(now);
    if date < today {
        return DaySlots::unavailable(date, UnavailableReason::PastDate);
    }

    let Some(schedule) = schedule else {
        return DaySlots::unavailable(date, UnavailableReason::NoSchedule);
    };
    if !schedule.works_on(date.weekday()) {
        return DaySlots::unavailable(date, UnavailableReason::WeekdayDisabled);
    }

    let day_off = day_off.filter(|d| d.is_active() && d.off_date == date);
    if day_off.is_some_and(|d| d.is_full_day()) {
        return DaySlots::unavailable(date, UnavailableReason::DayOffFull);
    }

    let mut slots: Vec<Slot> = [Session::Morning, Session::Afternoon]
        .into_iter()
        .filter(|session| !day_off.is_some_and(|d| d.covers(*session)))
        .flat_map(|session| session_slots(date, session, hours))
        .collect();
    if slots.is_empty() {
        let reason = if day_off.is_some() {
            UnavailableReason::DayOffPartial
        } else {
            UnavailableReason::WeekdayDisabled
        };
        return DaySlots::unavailable(date, reason);
    }

    let step = hours.slot_duration();
    slots.retain(|slot| {
        let slot_end = slot.starts_at + step;
        !booked.iter().any(|a| {
            a.status.blocks_slot()
                && a.appointment_datetime < slot_end
                && a.appointment_datetime + step > slot.starts_at
        })
    });
    if slots.is_empty() {
        return DaySlots::unavailable(date, UnavailableReason::FullyBooked);
    }

    if date == today {
        let earliest = now + Duration::minutes(hours.min_lead_minutes);
        slots.retain(|slot| slot.starts_at >= earliest);
        if slots.is_empty() {
            return DaySlots::unavailable(date, UnavailableReason::NoLeadTime);
        }
    }

    DaySlots {
        date,
        slots,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::appointment::AppointmentStatus;
    use shared_models::schedule::DayOffStatus;
    use shared_utils::test_utils::Fixtures;
    use uuid::Uuid;

    fn hours() -> ClinicHours {
        ClinicHours::default()
    }

    // 2026-03-02 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn local(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        hours().to_utc(date, NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn day_off(doctor_id: Uuid, morning: bool, afternoon: bool) -> DoctorDayOff {
        DoctorDayOff {
            id: 1,
            doctor_id,
            off_date: monday(),
            morning,
            afternoon,
            status: DayOffStatus::Active,
            reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn full_working_day_has_sixteen_slots() {
        let doctor = Uuid::new_v4();
        let schedule = Schedule::weekdays(doctor);
        let now = local(monday() - Duration::days(7), 9, 0);

        let day = compute_day_slots(monday(), Some(&schedule), None, &[], &hours(), now);

        assert_eq!(day.slots.len(), 16);
        assert_eq!(day.reason, None);
        assert_eq!(day.slots[0].start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(day.slots[0].starts_at, local(monday(), 8, 0));
        assert_eq!(day.slots[8].session, Session::Afternoon);
        assert_eq!(day.slots[15].end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
    }

    #[test]
    fn disabled_weekday_yields_reason_not_error() {
        let doctor = Uuid::new_v4();
        let mut schedule = Schedule::weekdays(doctor);
        schedule.monday = false;
        let now = local(monday() - Duration::days(7), 9, 0);

        let day = compute_day_slots(monday(), Some(&schedule), None, &[], &hours(), now);

        assert!(day.slots.is_empty());
        assert_eq!(day.reason, Some(UnavailableReason::WeekdayDisabled));
    }

    #[test]
    fn missing_schedule_and_past_dates() {
        let now = local(monday(), 9, 0);
        assert_eq!(
            compute_day_slots(monday(), None, None, &[], &hours(), now).reason,
            Some(UnavailableReason::NoSchedule)
        );

        let schedule = Schedule::weekdays(Uuid::new_v4());
        let yesterday = monday() - Duration::days(1);
        assert_eq!(
            compute_day_slots(yesterday, Some(&schedule), None, &[], &hours(), now).reason,
            Some(UnavailableReason::PastDate)
        );
    }

    #[test]
    fn full_day_off_removes_everything() {
        let doctor = Uuid::new_v4();
        let schedule = Schedule::weekdays(doctor);
        let off = day_off(doctor, true, true);
        let now = local(monday() - Duration::days(7), 9, 0);

        let day = compute_day_slots(monday(), Some(&schedule), Some(&off), &[], &hours(), now);

        assert_eq!(day.reason, Some(UnavailableReason::DayOffFull));
    }

    #[test]
    fn afternoon_day_off_keeps_only_morning() {
        let doctor = Uuid::new_v4();
        let schedule = Schedule::weekdays(doctor);
        let off = day_off(doctor, false, true);
        let now = local(monday() - Duration::days(7), 9, 0);

        let day = compute_day_slots(monday(), Some(&schedule), Some(&off), &[], &hours(), now);

        assert_eq!(day.slots.len(), 8);
        assert!(day.slots.iter().all(|s| s.session == Session::Morning));
    }

    #[test]
    fn cancelled_day_off_is_ignored() {
        let doctor = Uuid::new_v4();
        let schedule = Schedule::weekdays(doctor);
        let mut off = day_off(doctor, true, true);
        off.status = DayOffStatus::Cancelled;
        let now = local(monday() - Duration::days(7), 9, 0);

        let day = compute_day_slots(monday(), Some(&schedule), Some(&off), &[], &hours(), now);

        assert_eq!(day.slots.len(), 16);
    }

    #[test]
    fn blocking_appointments_remove_their_slot() {
        let doctor = Uuid::new_v4();
        let schedule = Schedule::weekdays(doctor);
        let now = local(monday() - Duration::days(7), 9, 0);
        let taken = local(monday(), 9, 0);
        let released = local(monday(), 10, 0);

        let booked = vec![
            Fixtures::appointment(1, Uuid::new_v4(), doctor, taken, AppointmentStatus::Accepted),
            Fixtures::appointment(2, Uuid::new_v4(), doctor, released, AppointmentStatus::Cancelled),
        ];

        let day = compute_day_slots(monday(), Some(&schedule), None, &booked, &hours(), now);

        assert_eq!(day.slots.len(), 15);
        assert!(day.slot_at(taken).is_none());
        assert!(day.slot_at(released).is_some());
    }

    #[test]
    fn today_respects_lead_time() {
        let doctor = Uuid::new_v4();
        let schedule = Schedule::weekdays(doctor);
        let now = local(monday(), 14, 10);

        let day = compute_day_slots(monday(), Some(&schedule), None, &[], &hours(), now);

        // 16:10 is the earliest start; only 16:30 remains.
        assert_eq!(day.slots.len(), 1);
        assert_eq!(day.slots[0].starts_at, local(monday(), 16, 30));

        let late = local(monday(), 15, 45);
        let day = compute_day_slots(monday(), Some(&schedule), None, &[], &hours(), late);
        assert_eq!(day.reason, Some(UnavailableReason::NoLeadTime));
    }

    #[test]
    fn session_is_split_at_afternoon_start() {
        assert_eq!(session_of(&hours(), local(monday(), 11, 30)), Session::Morning);
        assert_eq!(session_of(&hours(), local(monday(), 13, 0)), Session::Afternoon);
    }
}
