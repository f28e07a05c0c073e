use crate::logs::LogSink;
use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// A fully described process launch: program, arguments and the explicit
/// environment it runs with. Nothing here touches the host's environment.
#[derive(Debug, Clone)]
pub struct WineCmd {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    output: LogSink,
}

impl WineCmd {
    pub(crate) fn new(program: PathBuf, output: LogSink) -> Self {
        Self {
            program,
            args: Vec::new(),
            envs: Vec::new(),
            output,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    /// Run this command through a wrapper: `launcher[1..] program args...`
    /// executed by the already-resolved `launcher_path`.
    pub fn wrap(mut self, launcher: &[String], launcher_path: PathBuf) -> Self {
        let mut args: Vec<OsString> = launcher.iter().skip(1).map(OsString::from).collect();
        args.push(self.program.into_os_string());
        args.append(&mut self.args);
        self.program = launcher_path;
        self.args = args;
        self
    }

    /// Start the process with its stdout/stderr pumped into the output sink.
    pub fn spawn(&self) -> Result<Child> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("start {}", self.program.display()))?;

        if let Some(out) = child.stdout.take() {
            pump(out, self.output.clone());
        }
        if let Some(err) = child.stderr.take() {
            pump(err, self.output.clone());
        }
        Ok(child)
    }

    /// Start the process and wait for it, failing on a non-zero exit.
    pub async fn run(&self) -> Result<()> {
        let mut child = self.spawn()?;
        let status = child
            .wait()
            .await
            .with_context(|| format!("wait for {}", self.program.display()))?;
        if !status.success() {
            bail!("{self}: {status}");
        }
        Ok(())
    }

    /// Run the process and capture its stdout instead of forwarding it.
    pub async fn output(&self) -> Result<String> {
        let out = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .with_context(|| format!("start {}", self.program.display()))?;
        if !out.status.success() {
            bail!("{self}: {}", out.status);
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

#[cfg(test)]
impl WineCmd {
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&OsStr> {
        self.envs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }
}

impl fmt::Display for WineCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {}", a.to_string_lossy())?;
        }
        Ok(())
    }
}

fn pump<R>(reader: R, sink: LogSink)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            sink.write_line(&line);
        }
    });
}
