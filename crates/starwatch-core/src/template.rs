//! Canonical message rendering
//!
//! A message template is a plain string with named substitution fields.
//! Recognized fields: `{url}`, `{name}`, `{description}`. The description
//! field falls back to a literal `No description` when the repository has
//! none. Unknown text passes through verbatim.

use crate::traits::snapshot_source::Repo;

/// Template used when the operator configures none.
pub const DEFAULT_TEMPLATE: &str = "I just starred a new repository on GitHub: {url}";

/// Configurable message template over [`Repo`] fields.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    template: String,
}

impl MessageTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Render the canonical message for one repository.
    pub fn render(&self, repo: &Repo) -> String {
        self.template
            .replace("{url}", &repo.html_url)
            .replace("{name}", &repo.full_name)
            .replace("{description}", repo.description_or_fallback())
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repo {
        let mut repo = Repo::new("rust-lang/rust", "https://github.com/rust-lang/rust");
        repo.description = Some("The Rust programming language".to_string());
        repo
    }

    #[test]
    fn all_fields_substitute() {
        let template = MessageTemplate::new("{name}: {description} ({url})");
        assert_eq!(
            template.render(&repo()),
            "rust-lang/rust: The Rust programming language (https://github.com/rust-lang/rust)"
        );
    }

    #[test]
    fn missing_description_uses_fallback() {
        let mut repo = repo();
        repo.description = None;

        let template = MessageTemplate::new("{name}: {description}");
        assert_eq!(template.render(&repo), "rust-lang/rust: No description");
    }

    #[test]
    fn default_template_mentions_the_url() {
        let rendered = MessageTemplate::default().render(&repo());
        assert!(rendered.contains("https://github.com/rust-lang/rust"));
    }

    #[test]
    fn literal_text_passes_through() {
        let template = MessageTemplate::new("no fields here");
        assert_eq!(template.render(&repo()), "no fields here");
    }
}
