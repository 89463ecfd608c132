// SPDX-License-Identifier: MPL-2.0

//! Dismissable notifications, the terminal stand-in for alert dialogs.

use crate::scan::OpenError;
use crate::store::StoreError;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
    /// Offer a "retry" hint alongside the message
    pub retryable: bool,
}

impl Notice {
    pub fn info(title: &str, message: &str) -> Self {
        Self::new(NoticeKind::Info, title, message)
    }

    pub fn success(title: &str, message: &str) -> Self {
        Self::new(NoticeKind::Success, title, message)
    }

    pub fn error(title: &str, message: &str) -> Self {
        Self::new(NoticeKind::Error, title, message)
    }

    fn new(kind: NoticeKind, title: &str, message: &str) -> Self {
        Self {
            kind,
            title: title.to_string(),
            message: message.to_string(),
            retryable: false,
        }
    }

    pub fn from_store_error(err: &StoreError) -> Self {
        let mut notice = match err {
            StoreError::Validation(message) => Notice::error("Missing Info", message),
            StoreError::Unauthenticated => Notice::error("Error", "Please log in again."),
            other => Notice::error("Error", &other.to_string()),
        };
        notice.retryable = err.is_retryable();
        notice
    }

    pub fn from_open_error(err: &OpenError) -> Self {
        Notice::error("Couldn't open link", &err.to_string())
    }
}

/// Notices waiting to be acknowledged, oldest first.
#[derive(Debug, Default)]
pub struct Notices {
    queue: VecDeque<Notice>,
}

impl Notices {
    pub fn push(&mut self, notice: Notice) {
        // Same notice twice in a row adds nothing.
        if self.queue.back() != Some(&notice) {
            self.queue.push_back(notice);
        }
    }

    pub fn current(&self) -> Option<&Notice> {
        self.queue.front()
    }

    pub fn dismiss(&mut self) -> Option<Notice> {
        self.queue.pop_front()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_becomes_missing_info() {
        let notice = Notice::from_store_error(&StoreError::Validation(
            "Enter both email and password.".into(),
        ));
        assert_eq!(notice.title, "Missing Info");
        assert_eq!(notice.message, "Enter both email and password.");
        assert!(!notice.retryable);
    }

    #[test]
    fn test_network_failure_offers_retry() {
        let notice = Notice::from_store_error(&StoreError::Timeout);
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(notice.retryable);
    }

    #[test]
    fn test_dismiss_in_order_and_collapse_repeats() {
        let mut notices = Notices::default();
        notices.push(Notice::error("Error", "one"));
        notices.push(Notice::error("Error", "one"));
        notices.push(Notice::success("Success", "two"));
        assert_eq!(notices.len(), 2);

        assert_eq!(notices.dismiss().map(|n| n.message), Some("one".into()));
        assert_eq!(notices.current().map(|n| n.kind), Some(NoticeKind::Success));
        notices.dismiss();
        assert!(notices.is_empty());
    }
}
