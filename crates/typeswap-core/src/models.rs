use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ShortcutEntry {
    pub keyword: String,
    pub replacement: String,
    pub updated_at: DateTime<Utc>,
}

impl ShortcutEntry {
    pub fn new(keyword: String, replacement: String) -> Self {
        Self {
            keyword,
            replacement,
            updated_at: Utc::now(),
        }
    }

    pub fn update_replacement(&mut self, replacement: String) {
        self.replacement = replacement;
        self.updated_at = Utc::now();
    }

    pub fn formatted_time(&self) -> String {
        let duration = Utc::now().signed_duration_since(self.updated_at);

        if duration.num_seconds() < 60 {
            format!("{}s ago", duration.num_seconds())
        } else if duration.num_minutes() < 60 {
            format!("{}m ago", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h ago", duration.num_hours())
        } else {
            format!("{}d ago", duration.num_days())
        }
    }
}

/// A logical service whose credentials rotate behind one keyword.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: u64,
    pub code: String,
    pub name: String,
    /// Credential keyword, e.g. `@nf`.
    pub shortcut: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialEntry {
    pub id: u64,
    pub service_id: u64,
    pub content: String,
    /// Strictly increasing within a service.
    pub position: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl CredentialEntry {
    pub fn is_used(&self) -> bool {
        self.last_used.is_some()
    }

    pub fn formatted_last_used(&self) -> String {
        match self.last_used {
            Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "never".to_string(),
        }
    }
}
