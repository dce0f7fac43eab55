//! Per-path differences found while inspecting a repository

/// A working-directory leaf compared with its index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceChangeType {
    #[default]
    None,
    Untracked,
    Modified,
    Deleted,
}

/// An index entry compared with the same path in the `HEAD` tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexChangeType {
    #[default]
    None,
    Added,
    Modified,
    Deleted,
}

impl WorkspaceChangeType {
    pub fn label(&self) -> &'static str {
        match self {
            WorkspaceChangeType::None => "unchanged",
            WorkspaceChangeType::Untracked => "untracked",
            WorkspaceChangeType::Modified => "modified",
            WorkspaceChangeType::Deleted => "deleted",
        }
    }
}
