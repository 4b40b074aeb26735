//! Native git transport: every command is a `git` child process

use crate::error::{Error, Result};
use crate::traits::GitExecutable;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// `GitExecutable` spawning the git binary
#[derive(Debug, Clone)]
pub struct NativeGit {
    git_path: PathBuf,
}

impl Default for NativeGit {
    fn default() -> Self {
        Self::new("git")
    }
}

impl NativeGit {
    /// Use the given git executable
    pub fn new<P: Into<PathBuf>>(git_path: P) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    /// Executable in use
    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    fn command(&self, dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.git_path);
        // Never block on a credential prompt.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd
    }

    fn describe(&self, cmd: &Command) -> String {
        std::iter::once(cmd.get_program())
            .chain(cmd.get_args())
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn output(&self, mut cmd: Command) -> Result<Output> {
        let line = self.describe(&cmd);
        tracing::debug!(command = %line, "running git");
        cmd.output().map_err(|e| Error::Command {
            command: line,
            exit_code: None,
            stderr: e.to_string(),
            stdout: String::new(),
        })
    }

    /// Run and fail on non-zero exit
    fn run(&self, cmd: Command) -> Result<Output> {
        let line = self.describe(&cmd);
        let output = self.output(cmd)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(command_error(line, &output))
        }
    }
}

fn command_error(command: String, output: &Output) -> Error {
    Error::Command {
        command,
        exit_code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
    }
}

/// Parse `git show-ref` output: one `<sha> <refname>` per line
pub(crate) fn parse_show_ref(stdout: &[u8]) -> BTreeMap<String, String> {
    let mut refs = BTreeMap::new();
    for line in stdout.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(space) = memchr::memchr(b' ', line) else {
            continue;
        };
        let (sha, name) = (&line[..space], &line[space + 1..]);
        if sha.is_empty() || name.is_empty() {
            continue;
        }
        refs.insert(
            String::from_utf8_lossy(name).into_owned(),
            String::from_utf8_lossy(sha).into_owned(),
        );
    }
    refs
}

impl GitExecutable for NativeGit {
    fn init(&self, dir: &Path, bare: bool) -> Result<()> {
        let mut cmd = self.command(None);
        cmd.arg("init").arg("--quiet");
        if bare {
            cmd.arg("--bare");
        }
        cmd.arg(dir);
        self.run(cmd).map(drop)
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<()> {
        let mut cmd = self.command(Some(dir));
        cmd.args(["remote", "add", name, url]);
        self.run(cmd).map(drop)
    }

    fn fetch(&self, dir: &Path, refspec: Option<&str>, shallow: bool) -> Result<()> {
        let mut cmd = self.command(Some(dir));
        cmd.args(["fetch", "--quiet", "--no-tags"]);
        if shallow {
            cmd.arg("--depth=1");
        }
        cmd.arg("origin");
        if let Some(refspec) = refspec {
            cmd.arg(refspec);
        }
        self.run(cmd).map(drop)
    }

    fn delete_branch(&self, dir: &Path, name: &str) -> Result<()> {
        let mut cmd = self.command(Some(dir));
        cmd.args(["branch", "-D", name]);
        self.run(cmd).map(drop)
    }

    fn create_branch(&self, dir: &Path, name: &str, start_point: &str) -> Result<()> {
        let mut cmd = self.command(Some(dir));
        cmd.args(["branch", name, start_point]);
        self.run(cmd).map(drop)
    }

    fn show_refs(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
        let mut cmd = self.command(Some(dir));
        cmd.arg("show-ref");
        let line = self.describe(&cmd);
        let output = self.output(cmd)?;
        match output.status.code() {
            Some(0) => Ok(parse_show_ref(&output.stdout)),
            // show-ref exits 1 when the repository has no refs at all
            Some(1) if output.stderr.is_empty() => Ok(BTreeMap::new()),
            _ => Err(command_error(line, &output)),
        }
    }
}
