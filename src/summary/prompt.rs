use crate::db::CommitChangeRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    CodeReview,
    AlgorithmExplanation,
    Theme,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::CodeReview, Role::AlgorithmExplanation, Role::Theme];

    pub fn title(self) -> &'static str {
        match self {
            Role::CodeReview => "Code review",
            Role::AlgorithmExplanation => "Algorithms",
            Role::Theme => "Theme",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            Role::CodeReview => {
                "You are a senior software engineer reviewing the commit history of one repository. \
                 For each commit give one line of potential issues, one line of improvements, \
                 and one line of best practices if any apply."
            }
            Role::AlgorithmExplanation => {
                "If the changes contain a specific algorithm or a non-obvious mechanism, explain it \
                 in one line. Otherwise answer \"None\"."
            }
            Role::Theme => "Describe the overall theme of these commits in one line.",
        }
    }
}

/// Renders one commit and its file changes as the user message of a summary request.
///
/// `changes` comes from a left join, so a commit without file changes yields a
/// single row whose path is empty; that case returns `None`.
pub fn build_commit_prompt(repo_name: &str, changes: &[CommitChangeRow]) -> Option<String> {
    let first = changes.first()?;
    let files = changes
        .iter()
        .filter_map(|change| change.path.as_deref().map(|path| (path, change)))
        .collect::<Vec<_>>();

    if files.is_empty() {
        return None;
    }

    let mut lines = vec![
        format!("- repository name: {repo_name}\n"),
        "- commit".to_string(),
        format!("\t- commit message: \"{}\"", first.message),
    ];

    for (path, change) in files {
        lines.push(format!("\t- changed file: {path}"));
        lines.push(format!(
            "\t\t- type: {}",
            change.change_type.as_deref().unwrap_or("unknown")
        ));
        lines.push(format!(
            "\t\t- content: '''\n{}\n'''",
            change.content.as_deref().unwrap_or_default()
        ));
        lines.push(String::new());
    }

    Some(lines.join("\n"))
}
