//! Recipient list file
//!
//! Addresses are listed one per line under `[TO]` and `[CC]` headers.
//! Lines before the first header, blank lines and `#` comments are ignored.

use std::path::PathBuf;

use fleetpatch_core::{NotifyError, RecipientSource, Recipients};

/// Recipient file, re-read for every report so edits apply mid-campaign
#[derive(Debug, Clone)]
pub struct RecipientsFile {
    path: PathBuf,
}

impl RecipientsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecipientSource for RecipientsFile {
    fn recipients(&self) -> Result<Recipients, NotifyError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| NotifyError::Recipients(format!("{}: {e}", self.path.display())))?;
        Ok(parse_recipients(&content))
    }
}

#[derive(Clone, Copy)]
enum Section {
    To,
    Cc,
}

#[must_use]
pub fn parse_recipients(content: &str) -> Recipients {
    let mut recipients = Recipients::default();
    let mut section = None;

    for line in content.lines().map(str::trim) {
        if line.eq_ignore_ascii_case("[to]") {
            section = Some(Section::To);
        } else if line.eq_ignore_ascii_case("[cc]") {
            section = Some(Section::Cc);
        } else if line.is_empty() || line.starts_with('#') {
            continue;
        } else {
            match section {
                Some(Section::To) => recipients.to.push(line.to_string()),
                Some(Section::Cc) => recipients.cc.push(line.to_string()),
                None => {}
            }
        }
    }

    recipients
}
