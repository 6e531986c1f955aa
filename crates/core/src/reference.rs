use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::Result;

/// Minimal psychology theory written into an empty reference directory.
pub const DEFAULT_REFERENCE_DOCS: [(&str, &str); 4] = [
    (
        "big_five.md",
        "# Big Five (OCEAN)\n- Openness\n- Conscientiousness\n- Extraversion\n- Agreeableness\n- Neuroticism\n",
    ),
    (
        "attachment.md",
        "# Attachment Styles\n- Secure\n- Anxious\n- Avoidant\n- Disorganized\n",
    ),
    (
        "coping.md",
        "# Coping Strategies\n- Problem-focused\n- Emotion-focused\n- Maladaptive\n",
    ),
    (
        "defenses.md",
        "# Defense Mechanisms\n- Denial, Projection, Rationalization, Displacement, Sublimation, Humor, Intellectualization.\n",
    ),
];

/// Creates `dir` if needed and writes [`DEFAULT_REFERENCE_DOCS`] when it has
/// no entries. Returns whether anything was written.
pub fn bootstrap_reference_corpus(dir: &Path) -> Result<bool> {
    fs::create_dir_all(dir)?;
    if fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    for (name, body) in DEFAULT_REFERENCE_DOCS {
        fs::write(dir.join(name), body)?;
    }
    info!(dir = %dir.display(), files = DEFAULT_REFERENCE_DOCS.len(), "bootstrapped reference corpus");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_defaults_only_into_empty_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("knowledge").join("psychology");
        assert!(bootstrap_reference_corpus(&dir).unwrap());
        assert!(dir.join("attachment.md").exists());
        fs::write(dir.join("big_five.md"), "# custom").unwrap();
        assert!(!bootstrap_reference_corpus(&dir).unwrap());
        assert_eq!(fs::read_to_string(dir.join("big_five.md")).unwrap(), "# custom");
    }
}
