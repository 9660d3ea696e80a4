//! `psql`-backed engine.

use std::{ffi::OsString, io::ErrorKind, process::Stdio, time::Duration};

use tokio::{
    io::AsyncWriteExt,
    process::{ChildStdin, Command},
    time::timeout
};
use tracing::{debug, trace};

use super::{EngineOutput, SqlEngine};
use crate::{
    config::DatabaseConfig,
    error::{AppResult, database_error}
};

/// Runs scripts through the `psql` command-line client.
///
/// The script is written to stdin so psql processes it as one session on one
/// connection. `-b` echoes each failed statement to stderr right after its
/// `ERROR:` line, since stderr is captured apart from stdout and would
/// otherwise lose the link to the statement. Output is captured verbatim;
/// psql exit codes are 0 (ran to the
/// end), 1 (fatal client error), 2 (connection lost or refused) and 3 (script
/// stopped on error with `ON_ERROR_STOP`).
#[derive(Debug, Clone)]
pub struct PsqlEngine {
    config: DatabaseConfig
}

impl PsqlEngine {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config
        }
    }

    /// Command-line arguments passed to psql.
    pub fn args(&self) -> Vec<OsString> {
        let port = self.config.port.to_string();
        let mut args: Vec<OsString> = Vec::with_capacity(12);
        for arg in [
            "-X",
            "-w",
            "-b",
            "-h",
            self.config.host.as_str(),
            "-p",
            port.as_str(),
            "-U",
            self.config.user.as_str(),
            "-d",
            self.config.dbname.as_str()
        ] {
            args.push(OsString::from(arg));
        }
        if self.config.stop_on_error {
            args.push(OsString::from("-v"));
            args.push(OsString::from("ON_ERROR_STOP=1"));
        }
        args
    }
}

impl SqlEngine for PsqlEngine {
    async fn run_script(&self, script: &str) -> AppResult<EngineOutput> {
        let mut cmd = Command::new(&self.config.psql_path);
        cmd.args(self.args())
            .env("PGAPPNAME", "sql-grader")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = &self.config.password {
            cmd.env("PGPASSWORD", password);
        }

        trace!(program = %self.config.psql_path, "spawning psql");
        let mut child = cmd.spawn().map_err(|e| {
            database_error(format!(
                "failed to start '{}': {}",
                self.config.psql_path, e
            ))
        })?;

        // stdin is fed while output is drained so neither pipe can fill up
        // and stall psql.
        let stdin = child.stdin.take();
        let run = async move {
            let (_, output) = tokio::join!(feed_stdin(stdin, script), child.wait_with_output());
            output
        };

        let deadline = Duration::from_secs(self.config.timeout_secs);
        let output = timeout(deadline, run)
            .await
            .map_err(|_| {
                database_error(format!(
                    "psql did not finish within {}s",
                    self.config.timeout_secs
                ))
            })?
            .map_err(|e| database_error(format!("failed to collect psql output: {}", e)))?;

        Ok(EngineOutput {
            exit_code: output.status.code(),
            stdout:    String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr:    String::from_utf8_lossy(&output.stderr).into_owned()
        })
    }
}

/// Write the script and close stdin. psql closing its end early (it died
/// or quit on a fatal error) is expected; the exit status reports why.
async fn feed_stdin(stdin: Option<ChildStdin>, script: &str) {
    let Some(mut stdin) = stdin else {
        return;
    };
    let result = match stdin.write_all(script.as_bytes()).await {
        Ok(()) => stdin.shutdown().await,
        Err(e) => Err(e)
    };
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            trace!("psql closed stdin before the script was fully written");
        }
        Err(e) => debug!(error = %e, "failed to write script to psql")
    }
}
