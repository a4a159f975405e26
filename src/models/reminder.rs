use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const TITLE_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Target device (`devices.id`).
    pub device_id: Uuid,
    pub title: String,
    pub message: Option<String>,
    pub reminder_time: DateTime<Utc>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub is_active: bool,
    pub is_dismissed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "recurrence_pattern", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrencePattern {
    /// The `n`th occurrence after `start`. Monthly steps keep the original
    /// day of month, clamped to the length of the target month.
    pub fn nth_after(self, start: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        match self {
            RecurrencePattern::Daily => start.checked_add_signed(Duration::days(n as i64)),
            RecurrencePattern::Weekly => start.checked_add_signed(Duration::weeks(n as i64)),
            RecurrencePattern::Monthly => start.checked_add_months(Months::new(n)),
        }
    }

    /// First occurrence strictly after `now`, skipping at least one period.
    pub fn next_after(self, start: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut n: u32 = if start >= now {
            1
        } else {
            let elapsed = now - start;
            match self {
                RecurrencePattern::Daily => elapsed.num_days().max(1) as u32,
                RecurrencePattern::Weekly => elapsed.num_weeks().max(1) as u32,
                RecurrencePattern::Monthly => {
                    let months = (now.year() - start.year()) * 12 + now.month() as i32
                        - start.month() as i32;
                    months.max(1) as u32
                }
            }
        };

        loop {
            let candidate = self.nth_after(start, n)?;
            if candidate > now {
                return Some(candidate);
            }
            n = n.checked_add(1)?;
        }
    }
}

fn validate_title(title: &str) -> Result<String, String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("title is required".to_string());
    }
    if trimmed.chars().count() > TITLE_MAX_LEN {
        return Err(format!("title must be at most {} characters", TITLE_MAX_LEN));
    }
    Ok(trimmed.to_string())
}

fn validate_recurrence(
    is_recurring: bool,
    pattern: Option<RecurrencePattern>,
) -> Result<(), String> {
    match (is_recurring, pattern) {
        (true, None) => Err("recurrence_pattern is required for recurring reminders".to_string()),
        (false, Some(_)) => {
            Err("recurrence_pattern is only allowed for recurring reminders".to_string())
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReminder {
    pub device_id: Uuid,
    pub title: String,
    pub message: Option<String>,
    pub reminder_time: DateTime<Utc>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
}

impl NewReminder {
    /// Normalizes the title and message and checks the recurrence invariant.
    pub fn validated(mut self) -> Result<Self, String> {
        self.title = validate_title(&self.title)?;
        self.message = self
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        validate_recurrence(self.is_recurring, self.recurrence_pattern)?;
        Ok(self)
    }
}

/// Partial update. An empty `message` clears it; turning `is_recurring` off
/// drops the pattern, so it cannot come with a new one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReminderChanges {
    pub title: Option<String>,
    pub message: Option<String>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub is_active: Option<bool>,
}

impl ReminderChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.message.is_none()
            && self.reminder_time.is_none()
            && self.is_recurring.is_none()
            && self.recurrence_pattern.is_none()
            && self.is_active.is_none()
    }

    pub fn apply(&self, current: &Reminder) -> Result<Reminder, String> {
        if self.recurrence_pattern.is_some() && self.is_recurring == Some(false) {
            return Err("recurrence_pattern cannot be set when is_recurring is false".to_string());
        }

        let mut next = current.clone();

        if let Some(title) = &self.title {
            next.title = validate_title(title)?;
        }
        if let Some(message) = &self.message {
            let message = message.trim();
            next.message = (!message.is_empty()).then(|| message.to_string());
        }
        if let Some(time) = self.reminder_time {
            next.reminder_time = time;
        }
        if let Some(pattern) = self.recurrence_pattern {
            next.recurrence_pattern = Some(pattern);
            next.is_recurring = true;
        }
        if let Some(recurring) = self.is_recurring {
            next.is_recurring = recurring;
            if !recurring {
                next.recurrence_pattern = None;
            }
        }
        if let Some(active) = self.is_active {
            next.is_active = active;
        }

        validate_recurrence(next.is_recurring, next.recurrence_pattern)?;
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReminderFilter {
    #[serde(default)]
    pub include_inactive: bool,
    pub device_id: Option<Uuid>,
}

impl Reminder {
    /// Dismisses the current occurrence. One-shot reminders are retired;
    /// recurring ones move to their next occurrence after `now`.
    pub fn dismissed(&self, now: DateTime<Utc>) -> Reminder {
        let mut next = self.clone();
        match self.recurrence_pattern.filter(|_| self.is_recurring) {
            Some(pattern) => match pattern.next_after(self.reminder_time, now) {
                Some(time) => {
                    next.reminder_time = time;
                    next.is_dismissed = false;
                    next.is_active = true;
                }
                None => {
                    next.is_dismissed = true;
                    next.is_active = false;
                }
            },
            None => {
                next.is_dismissed = true;
                next.is_active = false;
            }
        }
        next
    }
}
