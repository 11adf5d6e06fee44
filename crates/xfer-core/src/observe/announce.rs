//! Accessibility announcements (append-only log read by the host UI).

use std::fmt;

/// Lifecycle moments that produce a spoken announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl Announcement {
    pub fn text(self) -> &'static str {
        match self {
            Announcement::Started => "Upload started",
            Announcement::Completed => "Upload completed",
            Announcement::Failed => "Upload failed",
            Announcement::Cancelled => "Upload cancelled",
        }
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnouncementLog {
    entries: Vec<String>,
}

impl AnnouncementLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, announcement: Announcement) {
        self.entries.push(announcement.text().to_string());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
