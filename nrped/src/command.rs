// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Command templates and their execution.
//!
//! A template comes from a `command[NAME]=…` config line. A query names a
//! template and supplies positional arguments that are substituted into the
//! template's `$ARGn$` slots, screened for forbidden characters, and handed
//! to the external check program.

use log::*;

use std::fmt;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use nrpe_protocol::{result_code_name, STATE_CRITICAL, STATE_UNKNOWN};

/// Response text when a substituted argument fails the screen.
pub const NASTY_CHARS_MESSAGE: &str = "nasty chars found";

/// A configured command: the program to run and its argument slots, which
/// may contain `$ARGn$` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub name: String,
    pub args: Vec<String>,
}

/// A command request as received on the wire: name and positional
/// arguments, split out of the `!`-delimited command buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl QueryCommand {
    /// Splits a received command line on `!`. The first field is the
    /// command name, the rest are positional arguments.
    pub fn parse(line: &str) -> QueryCommand {
        let mut fields = line.split('!');
        let name = fields.next().unwrap_or_default().to_string();
        QueryCommand {
            name,
            args: fields.map(str::to_string).collect(),
        }
    }
}

impl fmt::Display for QueryCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// If `slot` is exactly of the form `$ARGn$`, returns n.
fn placeholder_index(slot: &str) -> Option<usize> {
    let digits = slot.strip_prefix("$ARG")?.strip_suffix('$')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl CommandTemplate {
    /// Builds a template from a whitespace-separated command line. Returns
    /// None when the line holds no program at all.
    pub fn parse(line: &str) -> Option<CommandTemplate> {
        let mut fields = line.split_whitespace();
        let name = fields.next()?.to_string();
        Some(CommandTemplate {
            name,
            args: fields.map(str::to_string).collect(),
        })
    }

    /// Substitutes the query's positional arguments into the template's
    /// `$ARGn$` slots. A placeholder without a matching argument becomes
    /// the empty string. Every substituted slot is screened against
    /// `nasty_chars`; a hit aborts with an error carrying the offending
    /// slot index.
    fn substituted_args(&self, query: &QueryCommand, nasty_chars: &str) -> Result<Vec<String>, usize> {
        let mut args = Vec::with_capacity(self.args.len());

        for (index, slot) in self.args.iter().enumerate() {
            let value = match placeholder_index(slot) {
                Some(n) if n >= 1 && n <= query.args.len() => query.args[n - 1].clone(),
                Some(_) => String::new(),
                None => slot.clone(),
            };

            if value.chars().any(|c| nasty_chars.contains(c)) {
                return Err(index);
            }

            args.push(value);
        }

        Ok(args)
    }

    /// Runs the template against a received query and returns the response
    /// pair: the child's exit status and the first line of its stdout.
    ///
    /// The child never runs when a substituted argument contains a nasty
    /// character; that case reports STATE_CRITICAL immediately. A child
    /// that outlives `timeout` is killed and reported as STATE_UNKNOWN. A
    /// child that cannot be spawned at all reports status 2 with the
    /// spawn error as its output.
    pub fn execute(
        &self,
        query: &QueryCommand,
        nasty_chars: &str,
        timeout: Duration,
    ) -> (i16, Vec<u8>) {
        let args = match self.substituted_args(query, nasty_chars) {
            Ok(args) => args,
            Err(index) => {
                debug!("parameter {index} of {} contains nasty chars", self.name);
                return (STATE_CRITICAL, NASTY_CHARS_MESSAGE.as_bytes().to_vec());
            }
        };

        // A single slot may have expanded to several fields ("-w5% -c3%");
        // the child must see them as separate arguments, so flatten and
        // re-split.
        let joined = args.join(" ");
        let argv: Vec<&str> = joined.split_whitespace().collect();

        let mut child = match Command::new(&self.name)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return (2, e.to_string().into_bytes()),
        };
        debug!("launched {} {}", self.name, argv.join(" "));

        let watchdog = Watchdog::arm(child.id(), timeout);

        let mut first_line = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let _ = reader.read_until(b'\n', &mut first_line);
            while matches!(first_line.last(), Some(&b'\n') | Some(&b'\r')) {
                first_line.pop();
            }
            // drain the rest so the child never blocks on a full pipe
            let _ = std::io::copy(&mut reader, &mut std::io::sink());
        }

        let status = child.wait();
        let timed_out = watchdog.disarm();

        match status {
            Ok(_) if timed_out => {
                warn!("{} timed out after {}s", self.name, timeout.as_secs());
                (
                    STATE_UNKNOWN,
                    format!("command timed out after {} seconds", timeout.as_secs()).into_bytes(),
                )
            }
            Ok(status) => {
                let code = status.code().unwrap_or(i32::from(STATE_UNKNOWN));
                debug!(
                    "{} exited with {} ({})",
                    self.name,
                    code,
                    result_code_name(code as i16)
                );
                (code as i16, first_line)
            }
            Err(e) => (2, e.to_string().into_bytes()),
        }
    }
}

/// Kills a child process that runs past its deadline. Armed before the
/// first read from the child, disarmed after the child is reaped.
struct Watchdog {
    cancel: mpsc::Sender<()>,
    handle: thread::JoinHandle<bool>,
}

impl Watchdog {
    fn arm(pid: u32, timeout: Duration) -> Watchdog {
        let (cancel, armed) = mpsc::channel();

        let handle = thread::spawn(move || match armed.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => false,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                true
            }
        });

        Watchdog { cancel, handle }
    }

    /// Stops the watchdog; returns whether it already fired.
    fn disarm(self) -> bool {
        let _ = self.cancel.send(());
        self.handle.join().unwrap_or(false)
    }
}
