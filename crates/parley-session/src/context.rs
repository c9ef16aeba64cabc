//! Preamble assembly for prompt references and open editor files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Material the user attached to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptReference {
    File {
        path: PathBuf,
        contents: String,
    },
    Selection {
        path: PathBuf,
        start_line: u32,
        end_line: u32,
        text: String,
    },
}

impl PromptReference {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::File { path, .. } | Self::Selection { path, .. } => path,
        }
    }

    fn header(&self) -> String {
        match self {
            Self::File { path, .. } => format!("File: {}", path.display()),
            Self::Selection {
                path,
                start_line,
                end_line,
                ..
            } => format!(
                "Selection: {} (lines {start_line}-{end_line})",
                path.display()
            ),
        }
    }

    fn body(&self) -> &str {
        match self {
            Self::File { contents, .. } => contents,
            Self::Selection { text, .. } => text,
        }
    }

    fn render(&self) -> String {
        fenced(&self.header(), self.body())
    }
}

/// Render references (and, if enabled, open files) into the text placed
/// before the question. Empty when there is nothing to include.
pub fn build_preamble(
    references: &[PromptReference],
    open_files: &[PromptReference],
    include_open_files: bool,
) -> String {
    let mut out = String::new();
    for reference in references {
        out.push_str(&reference.render());
    }

    if include_open_files {
        for file in open_files {
            if references.iter().any(|r| r == file) {
                continue;
            }
            out.push_str(&file.render());
        }
    }
    out
}

fn fenced(header: &str, body: &str) -> String {
    let fence = fence_for(body);
    let newline = if body.ends_with('\n') { "" } else { "\n" };
    format!("{header}\n{fence}\n{body}{newline}{fence}\n\n")
}

/// A backtick fence longer than any run inside `body`.
fn fence_for(body: &str) -> String {
    let longest = body
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
