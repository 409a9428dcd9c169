//! Version-control and review-hosting adapter.
//!
//! The publisher talks to [`VersionControl`]; [`GitCli`] shells out to `git`
//! and the configured review command through the timeout helper.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::process::{ProcessLimits, ProcessOutput, command_from_argv, run_with_timeout};

/// Arguments for a review request (pull request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Operations the publisher needs from version control.
pub trait VersionControl {
    fn checkout(&self, branch: &str) -> Result<()>;
    fn pull(&self, remote: &str, branch: &str) -> Result<()>;
    fn create_branch(&self, branch: &str) -> Result<()>;
    fn add(&self, paths: &[PathBuf]) -> Result<()>;
    fn commit(&self, message: &str) -> Result<()>;
    fn push(&self, remote: &str, branch: &str) -> Result<()>;
    /// Open a review request and return its URL.
    fn open_review(&self, request: &ReviewRequest) -> Result<String>;
}

impl<T: VersionControl + ?Sized> VersionControl for &T {
    fn checkout(&self, branch: &str) -> Result<()> {
        (**self).checkout(branch)
    }

    fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        (**self).pull(remote, branch)
    }

    fn create_branch(&self, branch: &str) -> Result<()> {
        (**self).create_branch(branch)
    }

    fn add(&self, paths: &[PathBuf]) -> Result<()> {
        (**self).add(paths)
    }

    fn commit(&self, message: &str) -> Result<()> {
        (**self).commit(message)
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        (**self).push(remote, branch)
    }

    fn open_review(&self, request: &ReviewRequest) -> Result<String> {
        (**self).open_review(request)
    }
}

/// `git` plus a review CLI (`gh pr create` by default), run in `workdir`.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    review_command: Vec<String>,
    limits: ProcessLimits,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>, review_command: Vec<String>, limits: ProcessLimits) -> Self {
        Self {
            workdir: workdir.into(),
            review_command,
            limits,
        }
    }

    fn run_checked(&self, args: &[&str]) -> Result<ProcessOutput> {
        let mut argv = vec!["git".to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        let output = self.run(&argv)?;
        if !output.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                output.failure_summary()
            ));
        }
        Ok(output)
    }

    fn run(&self, argv: &[String]) -> Result<ProcessOutput> {
        let cmd = command_from_argv(argv, Some(&self.workdir))?;
        run_with_timeout(cmd, None, self.limits)
    }
}

impl VersionControl for GitCli {
    #[instrument(skip_all, fields(branch))]
    fn checkout(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    #[instrument(skip_all, fields(remote, branch))]
    fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["pull", remote, branch])?;
        Ok(())
    }

    #[instrument(skip_all, fields(branch))]
    fn create_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    fn add(&self, paths: &[PathBuf]) -> Result<()> {
        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let mut args = vec!["add", "--"];
        args.extend(rendered.iter().map(String::as_str));
        self.run_checked(&args)?;
        Ok(())
    }

    #[instrument(skip_all)]
    fn commit(&self, message: &str) -> Result<()> {
        self.run_checked(&["commit", "-m", message])?;
        Ok(())
    }

    #[instrument(skip_all, fields(remote, branch))]
    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", "-u", remote, branch])?;
        Ok(())
    }

    #[instrument(skip_all, fields(head = %request.head, base = %request.base))]
    fn open_review(&self, request: &ReviewRequest) -> Result<String> {
        let mut argv = self.review_command.clone();
        argv.extend([
            "--title".to_string(),
            request.title.clone(),
            "--body".to_string(),
            request.body.clone(),
            "--head".to_string(),
            request.head.clone(),
            "--base".to_string(),
            request.base.clone(),
        ]);
        let output = self.run(&argv)?;
        let program = argv.first().map(String::as_str).unwrap_or("review");
        if !output.success() {
            return Err(anyhow!("{program} failed: {}", output.failure_summary()));
        }
        let url = review_url(&output.stdout_text())
            .ok_or_else(|| anyhow!("{program} printed no review URL"))?;
        info!(url = %url, "review request opened");
        Ok(url)
    }
}

/// Last non-empty stdout line; review CLIs print the URL last.
fn review_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::process::Command;
    use std::time::Duration;

    fn limits() -> ProcessLimits {
        ProcessLimits::new(Duration::from_secs(30), 100_000)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("spawn git");
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]);
        git(dir, &["config", "user.email", "autofix@example.test"]);
        git(dir, &["config", "user.name", "autofix"]);
        fs::write(dir.join("app.py"), "print(1)\n").expect("write");
        git(dir, &["add", "app.py"]);
        git(dir, &["commit", "-q", "-m", "init"]);
    }

    #[test]
    fn review_url_takes_last_nonempty_line() {
        assert_eq!(
            review_url("Creating pull request\nhttps://example.test/pr/7\n\n"),
            Some("https://example.test/pr/7".to_string())
        );
        assert_eq!(review_url("  \n"), None);
    }

    #[test]
    fn branch_add_commit_in_real_repo() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_repo(temp.path());
        let vcs = GitCli::new(temp.path(), vec!["true".to_string()], limits());

        vcs.create_branch("auto-fix-app-20240101-000000").expect("branch");
        fs::write(temp.path().join("app.py"), "print(2)\n").expect("write");
        vcs.add(&[temp.path().join("app.py")]).expect("add");
        vcs.commit("Auto-fix: app.py").expect("commit");

        let out = Command::new("git")
            .args(["log", "-1", "--format=%s"])
            .current_dir(temp.path())
            .output()
            .expect("git log");
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "Auto-fix: app.py");
    }

    #[test]
    fn failing_git_command_reports_args() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_repo(temp.path());
        let vcs = GitCli::new(temp.path(), vec!["true".to_string()], limits());
        let err = vcs.checkout("no-such-branch").expect_err("checkout fails");
        assert!(err.to_string().starts_with("git checkout no-such-branch failed"));
    }

    #[test]
    fn review_command_stdout_is_url() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = GitCli::new(
            temp.path(),
            vec!["sh".to_string(), "-c".to_string(), "echo https://example.test/pr/3".to_string()],
            limits(),
        );
        let url = vcs
            .open_review(&ReviewRequest {
                title: "t".to_string(),
                body: "b".to_string(),
                head: "h".to_string(),
                base: "main".to_string(),
            })
            .expect("review");
        assert_eq!(url, "https://example.test/pr/3");
    }

    #[test]
    fn empty_review_output_is_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = GitCli::new(temp.path(), vec!["true".to_string()], limits());
        let request = ReviewRequest {
            title: "t".to_string(),
            body: "b".to_string(),
            head: "h".to_string(),
            base: "main".to_string(),
        };
        assert!(vcs.open_review(&request).is_err());
    }
}
