/// Per-source category allow-list. `["all"]` (or an empty list) forwards
/// everything; otherwise categories match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    allowed: Option<Vec<String>>,
}

impl CategoryFilter {
    pub fn all() -> Self {
        Self { allowed: None }
    }

    pub fn from_categories<S: AsRef<str>>(categories: &[S]) -> Self {
        let wildcard = categories.is_empty()
            || categories
                .iter()
                .any(|c| c.as_ref().trim().eq_ignore_ascii_case("all"));
        if wildcard {
            return Self::all();
        }
        Self {
            allowed: Some(
                categories
                    .iter()
                    .map(|c| c.as_ref().trim().to_ascii_lowercase())
                    .collect(),
            ),
        }
    }

    pub fn matches(&self, category: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(allowed) => allowed.iter().any(|c| c.eq_ignore_ascii_case(category)),
        }
    }
}
