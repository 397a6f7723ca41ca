use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weekly working template of one doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub doctor_id: Uuid,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Monday to Friday template.
    pub fn weekdays(doctor_id: Uuid) -> Self {
        Self {
            doctor_id,
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
            updated_at: None,
        }
    }

    pub fn works_on(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

/// Half-day working session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Morning,
    Afternoon,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Morning => write!(f, "morning"),
            Session::Afternoon => write!(f, "afternoon"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayOffStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorDayOff {
    pub id: i64,
    pub doctor_id: Uuid,
    pub off_date: NaiveDate,
    pub morning: bool,
    pub afternoon: bool,
    pub status: DayOffStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DoctorDayOff {
    pub fn is_active(&self) -> bool {
        self.status == DayOffStatus::Active
    }

    pub fn is_full_day(&self) -> bool {
        self.morning && self.afternoon
    }

    pub fn covers(&self, session: Session) -> bool {
        match session {
            Session::Morning => self.morning,
            Session::Afternoon => self.afternoon,
        }
    }

    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions = Vec::new();
        if self.morning {
            sessions.push(Session::Morning);
        }
        if self.afternoon {
            sessions.push(Session::Afternoon);
        }
        sessions
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDayOff {
    pub doctor_id: Uuid,
    pub off_date: NaiveDate,
    pub morning: bool,
    pub afternoon: bool,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_template_excludes_weekend() {
        let schedule = Schedule::weekdays(Uuid::new_v4());
        assert!(schedule.works_on(Weekday::Mon));
        assert!(!schedule.works_on(Weekday::Sat));
        assert!(!schedule.works_on(Weekday::Sun));
    }

    #[test]
    fn day_off_lists_covered_sessions() {
        let day_off = DoctorDayOff {
            id: 1,
            doctor_id: Uuid::new_v4(),
            off_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            morning: false,
            afternoon: true,
            status: DayOffStatus::Active,
            reason: None,
            created_at: Utc::now(),
        };
        assert!(!day_off.is_full_day());
        assert_eq!(day_off.sessions(), vec![Session::Afternoon]);
        assert!(day_off.covers(Session::Afternoon));
    }
}
