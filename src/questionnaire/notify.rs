//! Non-blocking notifications surfaced to the visitor (the toast layer).

use serde::Serialize;

use crate::error::PersistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A dismissible message. Never blocks navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }

    fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    /// A remote save that did not go through. Answers remain on this device.
    pub fn save_failed(step: u8, error: &PersistError) -> Self {
        let message = if error.is_retryable() {
            "Your answers are kept on this device; we'll save them again on your next step."
        } else {
            "Your answers are kept on this device, but the server rejected them."
        };
        tracing::debug!(step, error = %error, "Save-failed notification raised");
        Self::error(format!("Couldn't save step {step}"), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_failed_is_an_error_notification() {
        let n = Notification::save_failed(2, &PersistError::Transient("timeout".into()));
        assert_eq!(n.level, NotificationLevel::Error);
        assert!(n.title.contains("step 2"));

        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["level"], "error");
    }
}
