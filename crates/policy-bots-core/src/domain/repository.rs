use serde::{Deserialize, Serialize};

/// Read-only snapshot of a repository, fetched once per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    /// Short name, e.g. "api".
    pub name: String,
    /// Owner-qualified name, e.g. "stevedores-org/api".
    pub full_name: String,
    pub is_private: bool,
    pub is_archived: bool,
}

impl Repository {
    /// Active, public repository owned by `owner`.
    pub fn new(owner: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: format!("{owner}/{name}"),
            name,
            is_private: false,
            is_archived: false,
        }
    }

    pub fn archived(mut self) -> Self {
        self.is_archived = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name)
    }
}
