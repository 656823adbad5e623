use tracing::warn;

use crate::workflow::state::{ErrorKind, StageError};

pub const MAX_ACTIVITY_CHARS: usize = 500;
pub const MAX_THEME_CHARS: usize = 200;

/// Trimmed input plus any bound violations.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub activity: String,
    pub theme: String,
    pub errors: Vec<StageError>,
}

impl ValidatedInput {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Lengths are counted in characters, not bytes. Content is never rejected.
pub fn validate_input(activity: &str, theme: &str) -> ValidatedInput {
    let activity = activity.trim();
    let theme = theme.trim();
    let mut errors = Vec::new();

    let activity_len = activity.chars().count();
    if activity.is_empty() {
        errors.push(StageError::new(
            ErrorKind::Input,
            "Pole 'activity' nie może być puste",
        ));
    } else if activity_len > MAX_ACTIVITY_CHARS {
        errors.push(StageError::new(
            ErrorKind::Input,
            format!("Pole 'activity' jest za długie ({activity_len} znaków, max {MAX_ACTIVITY_CHARS})"),
        ));
    }

    let theme_len = theme.chars().count();
    if theme_len > MAX_THEME_CHARS {
        errors.push(StageError::new(
            ErrorKind::Input,
            format!("Pole 'theme' jest za długie ({theme_len} znaków, max {MAX_THEME_CHARS})"),
        ));
    }

    for error in &errors {
        warn!("Input rejected: {}", error.message);
    }

    ValidatedInput {
        activity: activity.to_string(),
        theme: theme.to_string(),
        errors,
    }
}
