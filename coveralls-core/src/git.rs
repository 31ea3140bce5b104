//! Git metadata collection.

use std::path::Path;
use std::process::Command;

use crate::config::Environment;
use crate::domain::{GitHead, GitInfo, GitRemote};
use crate::error::{CoverallsError, Result};

const LOG_FORMAT: &str = "--pretty=format:%H%n%aN%n%ae%n%cN%n%ce%n%s";

/// Runs git subcommands in a working tree.
#[cfg_attr(test, mockall::automock)]
pub trait GitCommand {
    /// Run `git <args>` in `root`, returning trimmed stdout.
    fn run(&self, root: &Path, args: &[&'static str]) -> Result<String>;
}

/// Git runner that shells out to the `git` executable.
#[derive(Debug, Default, Clone)]
pub struct SystemGit;

impl GitCommand for SystemGit {
    fn run(&self, root: &Path, args: &[&'static str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .map_err(CoverallsError::from)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoverallsError::Other(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Collect commit metadata, falling back to `GIT_*` environment variables.
///
/// Returns `None` when neither git nor the environment identify a commit.
/// A branch detected from CI wins over the checked-out branch, which is
/// often a detached HEAD on CI runners.
pub fn collect_git_info<G: GitCommand>(
    git: &G,
    root: &Path,
    ci_branch: Option<&str>,
    env: &dyn Environment,
) -> Option<GitInfo> {
    let info = match from_git(git, root) {
        Ok(info) => Some(info),
        Err(err) => {
            log::debug!("falling back to GIT_* environment variables: {err}");
            from_env(env)
        }
    };
    info.map(|mut info| {
        if let Some(branch) = ci_branch {
            info.branch = Some(branch.to_string());
        }
        info
    })
}

fn from_git<G: GitCommand>(git: &G, root: &Path) -> Result<GitInfo> {
    let log = git.run(root, &["log", "-1", LOG_FORMAT])?;
    let mut fields = log.lines();
    let mut next = || fields.next().unwrap_or_default().to_string();
    let head = GitHead {
        id: next(),
        author_name: next(),
        author_email: next(),
        committer_name: next(),
        committer_email: next(),
        message: next(),
    };
    if head.id.is_empty() {
        return Err(CoverallsError::Other("git log returned no commit".to_string()));
    }

    let branch = git
        .run(root, &["rev-parse", "--abbrev-ref", "HEAD"])
        .ok()
        .filter(|branch| !branch.is_empty() && branch != "HEAD");
    let remotes = git
        .run(root, &["remote", "-v"])
        .map(|output| parse_remotes(&output))
        .unwrap_or_default();

    Ok(GitInfo {
        branch,
        head,
        remotes,
    })
}

fn from_env(env: &dyn Environment) -> Option<GitInfo> {
    let id = env.var("GIT_ID")?;
    let field = |key: &str| env.var(key).unwrap_or_default();
    let remotes = match (env.var("GIT_REMOTE"), env.var("GIT_URL")) {
        (Some(name), Some(url)) => vec![GitRemote { name, url }],
        _ => Vec::new(),
    };
    Some(GitInfo {
        branch: env.var("GIT_BRANCH"),
        head: GitHead {
            id,
            author_name: field("GIT_AUTHOR_NAME"),
            author_email: field("GIT_AUTHOR_EMAIL"),
            committer_name: field("GIT_COMMITTER_NAME"),
            committer_email: field("GIT_COMMITTER_EMAIL"),
            message: field("GIT_MESSAGE"),
        },
        remotes,
    })
}

/// Parse `git remote -v` output into unique fetch remotes.
fn parse_remotes(output: &str) -> Vec<GitRemote> {
    let mut remotes: Vec<GitRemote> = Vec::new();
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        if parts.next().is_some_and(|kind| kind != "(fetch)") {
            continue;
        }
        if remotes.iter().any(|remote| remote.name == name) {
            continue;
        }
        remotes.push(GitRemote {
            name: name.to_string(),
            url: url.to_string(),
        });
    }
    remotes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn working_git() -> MockGitCommand {
        let mut git = MockGitCommand::new();
        git.expect_run().returning(|_, args| match args[0] {
            "log" => Ok("abc123\nAda\nada@example.com\nGrace\ngrace@example.com\nFix parser"
                .to_string()),
            "rev-parse" => Ok("main".to_string()),
            "remote" => Ok("origin\thttps://example.com/repo.git (fetch)\n\
                            origin\thttps://example.com/repo.git (push)\n\
                            fork\tgit@example.com:me/repo.git (fetch)"
                .to_string()),
            other => panic!("unexpected git {other}"),
        });
        git
    }

    fn broken_git() -> MockGitCommand {
        let mut git = MockGitCommand::new();
        git.expect_run()
            .returning(|_, _| Err(CoverallsError::Other("not a git repository".to_string())));
        git
    }

    #[test]
    fn reads_head_branch_and_remotes_from_git() {
        let info = collect_git_info(&working_git(), Path::new("."), None, &env(&[]))
            .expect("git info");
        assert_eq!(info.head.id, "abc123");
        assert_eq!(info.head.author_email, "ada@example.com");
        assert_eq!(info.head.committer_name, "Grace");
        assert_eq!(info.head.message, "Fix parser");
        assert_eq!(info.branch.as_deref(), Some("main"));
        assert_eq!(
            info.remotes,
            vec![
                GitRemote {
                    name: "origin".to_string(),
                    url: "https://example.com/repo.git".to_string(),
                },
                GitRemote {
                    name: "fork".to_string(),
                    url: "git@example.com:me/repo.git".to_string(),
                },
            ]
        );
    }

    #[test]
    fn ci_branch_overrides_checked_out_branch() {
        let info = collect_git_info(&working_git(), Path::new("."), Some("release"), &env(&[]))
            .expect("git info");
        assert_eq!(info.branch.as_deref(), Some("release"));
    }

    #[test]
    fn falls_back_to_environment_when_git_fails() {
        let vars = env(&[
            ("GIT_ID", "def456"),
            ("GIT_BRANCH", "topic"),
            ("GIT_MESSAGE", "Add tests"),
            ("GIT_REMOTE", "origin"),
            ("GIT_URL", "https://example.com/repo.git"),
        ]);
        let info = collect_git_info(&broken_git(), Path::new("."), None, &vars).expect("git info");
        assert_eq!(info.head.id, "def456");
        assert_eq!(info.head.message, "Add tests");
        assert_eq!(info.head.author_name, "");
        assert_eq!(info.branch.as_deref(), Some("topic"));
        assert_eq!(info.remotes.len(), 1);
    }

    #[test]
    fn no_git_and_no_environment_yields_none() {
        assert_eq!(
            collect_git_info(&broken_git(), Path::new("."), Some("main"), &env(&[])),
            None
        );
    }
}
