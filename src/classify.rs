//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Spamsweep.
//
// Spamsweep is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Spamsweep is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Spamsweep. If not, see <http://www.gnu.org/licenses/>.

//! Talking to the external spam classifier.
//!
//! Every message gets its own `spamc` invocation. The raw message goes in on
//! standard input; the verdict comes back as the exit status together with
//! whatever `spamc` prints on standard output.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{self, Stdio};

use log::warn;
use thiserror::Error;

use crate::support::sysexits::{EX_IOERR, EX_UNAVAILABLE};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to start '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Error communicating with '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' was killed by a signal")]
    Terminated { program: String },
}

/// The result of checking one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub is_spam: bool,
    /// Whatever the classifier printed, usually `score/threshold`. Only
    /// useful for diagnostics.
    pub score: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainOutcome {
    Learned,
    AlreadyLearned,
    /// The classifier could not reach its daemon.
    ConnectionError,
    NotLearned,
}

/// How `spamc --learntype=spam` reports what it did.
///
/// Anything not listed here is `NotLearned`.
pub const TRAIN_STATUS_TABLE: &[(i32, TrainOutcome)] = &[
    (5, TrainOutcome::Learned),
    (6, TrainOutcome::AlreadyLearned),
    (EX_UNAVAILABLE.0, TrainOutcome::ConnectionError),
    (EX_IOERR.0, TrainOutcome::ConnectionError),
];

/// spamd prints this instead of using the exit status when it is too old to
/// know about status 6.
const ALREADY_LEARNED_TEXT: &str = "Message was already un/learned";

impl TrainOutcome {
    pub fn from_status(status: i32) -> Self {
        TRAIN_STATUS_TABLE
            .iter()
            .find(|&&(s, _)| s == status)
            .map(|&(_, outcome)| outcome)
            .unwrap_or(TrainOutcome::NotLearned)
    }

    fn from_output(status: i32, stdout: &[u8]) -> Self {
        match TrainOutcome::from_status(status) {
            TrainOutcome::NotLearned
                if String::from_utf8_lossy(stdout).trim()
                    == ALREADY_LEARNED_TEXT =>
            {
                TrainOutcome::AlreadyLearned
            }
            outcome => outcome,
        }
    }
}

/// Decide whether `spamc -c` considers a message spam.
///
/// A score of `0/0` means spamc could not actually reach spamd, and it will
/// still exit non-zero in that case, so that is treated as not spam no matter
/// what the status says. Otherwise, any non-zero status is spam.
pub fn verdict_from(status: i32, stdout: &[u8]) -> Classification {
    let score = String::from_utf8_lossy(stdout).trim().to_owned();
    let is_spam = "0/0" != score && 0 != status;
    Classification { is_spam, score }
}

/// Something which can judge and learn messages.
///
/// Implementations are shared between worker threads.
pub trait Classifier: Sync {
    fn classify(&self, message: &[u8]) -> Result<Classification, Error>;
    fn train(&self, message: &[u8]) -> Result<TrainOutcome, Error>;
}

/// A `Classifier` which runs `spamc` (or something that behaves like it).
#[derive(Clone, Debug)]
pub struct Spamc {
    program: PathBuf,
    args: Vec<String>,
}

impl Spamc {
    /// `args` are passed before the mode argument on every invocation, e.g.
    /// `-d host` or `-u user`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Spamc {
            program: program.into(),
            args,
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Run the program once with `mode_arg`, feeding it `message`.
    ///
    /// Returns the exit status and everything written to standard output.
    /// Standard error is left attached to ours.
    fn invoke(
        &self,
        mode_arg: &str,
        message: &[u8],
    ) -> Result<(i32, Vec<u8>), Error> {
        let mut child = process::Command::new(&self.program)
            .args(&self.args)
            .arg(mode_arg)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| Error::Launch {
                program: self.program_name(),
                source,
            })?;

        let stdin = child.stdin.take();
        // The message has to be written on another thread while we drain
        // stdout here, or a large message can fill both pipes and deadlock.
        let output = crossbeam::scope(|scope| {
            let writer = scope.spawn(move |_| -> io::Result<()> {
                if let Some(mut stdin) = stdin {
                    match stdin.write_all(message) {
                        // The child is allowed to stop reading early
                        Err(e) if io::ErrorKind::BrokenPipe == e.kind() => (),
                        r => r?,
                    }
                }
                Ok(())
            });

            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|p| std::panic::resume_unwind(p));
            output.and_then(|output| written.map(|_| output))
        })
        .unwrap_or_else(|p| std::panic::resume_unwind(p))
        .map_err(|source| Error::Io {
            program: self.program_name(),
            source,
        })?;

        let status =
            output.status.code().ok_or_else(|| Error::Terminated {
                program: self.program_name(),
            })?;
        Ok((status, output.stdout))
    }
}

impl Classifier for Spamc {
    fn classify(&self, message: &[u8]) -> Result<Classification, Error> {
        let (status, stdout) = self.invoke("-c", message)?;
        Ok(verdict_from(status, &stdout))
    }

    fn train(&self, message: &[u8]) -> Result<TrainOutcome, Error> {
        let (status, stdout) = self.invoke("--learntype=spam", message)?;
        let outcome = TrainOutcome::from_output(status, &stdout);
        if TrainOutcome::NotLearned == outcome {
            warn!(
                "{} --learntype=spam exited with unexpected status {}",
                self.program_name(),
                status
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;

    /// Write a shell script standing in for spamc.
    fn script_with_args(dir: &TempDir, body: &str, args: &[&str]) -> Spamc {
        let path = dir.path().join("fake-spamc");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Spamc::new(path, args.iter().map(|&s| s.to_owned()).collect())
    }

    fn script(dir: &TempDir, body: &str) -> Spamc {
        script_with_args(dir, body, &[])
    }

    #[test]
    fn zero_over_zero_is_never_spam() {
        assert!(!verdict_from(1, b"0/0\n").is_spam);
        assert!(!verdict_from(0, b"0/0\n").is_spam);
        assert!(!verdict_from(74, b"0/0").is_spam);
    }

    #[test]
    fn nonzero_status_is_spam() {
        let verdict = verdict_from(1, b"12.3/5.0\n");
        assert!(verdict.is_spam);
        assert_eq!("12.3/5.0", verdict.score);

        let verdict = verdict_from(0, b"1.1/5.0\n");
        assert!(!verdict.is_spam);
        assert_eq!("1.1/5.0", verdict.score);
    }

    #[test]
    fn train_status_table() {
        assert_eq!(TrainOutcome::Learned, TrainOutcome::from_status(5));
        assert_eq!(TrainOutcome::AlreadyLearned, TrainOutcome::from_status(6));
        assert_eq!(
            TrainOutcome::ConnectionError,
            TrainOutcome::from_status(69)
        );
        assert_eq!(
            TrainOutcome::ConnectionError,
            TrainOutcome::from_status(74)
        );
        assert_eq!(TrainOutcome::NotLearned, TrainOutcome::from_status(0));
        assert_eq!(TrainOutcome::NotLearned, TrainOutcome::from_status(1));
        assert_eq!(TrainOutcome::NotLearned, TrainOutcome::from_status(70));
    }

    #[test]
    fn already_learned_text_overrides_status() {
        assert_eq!(
            TrainOutcome::AlreadyLearned,
            TrainOutcome::from_output(
                0,
                b"Message was already un/learned\n"
            )
        );
        assert_eq!(
            TrainOutcome::ConnectionError,
            TrainOutcome::from_output(
                69,
                b"Message was already un/learned\n"
            )
        );
    }

    #[test]
    fn classify_passes_message_and_mode() {
        let dir = TempDir::new().unwrap();
        let spamc = script(
            &dir,
            "[ \"$1\" = -c ] || exit 99\n\
             if grep -q VIAGRA; then echo 15.0/5.0; exit 1; fi\n\
             echo 0.5/5.0",
        );

        let verdict =
            spamc.classify(b"Subject: VIAGRA\r\n\r\nbuy\r\n").unwrap();
        assert!(verdict.is_spam);
        assert_eq!("15.0/5.0", verdict.score);

        let verdict =
            spamc.classify(b"Subject: hi\r\n\r\nlunch?\r\n").unwrap();
        assert!(!verdict.is_spam);
        assert_eq!("0.5/5.0", verdict.score);
    }

    #[test]
    fn extra_arguments_come_first() {
        let dir = TempDir::new().unwrap();
        let spamc = script_with_args(
            &dir,
            "cat >/dev/null\n\
             [ \"$1 $2 $3\" = \"-d spamhost -c\" ] && { echo 9/5; exit 1; }\n\
             echo 0/0; exit 1",
            &["-d", "spamhost"],
        );

        assert!(spamc.classify(b"x").unwrap().is_spam);
    }

    #[test]
    fn unreachable_daemon_is_not_spam() {
        let dir = TempDir::new().unwrap();
        let spamc = script(&dir, "cat >/dev/null; echo 0/0; exit 74");
        assert!(!spamc.classify(b"hello").unwrap().is_spam);
    }

    #[test]
    fn large_messages_do_not_deadlock() {
        let dir = TempDir::new().unwrap();
        // Echo everything back so both pipes fill at once
        let spamc = script(&dir, "cat; exit 1");
        let message = vec![b'x'; 4 * 1024 * 1024];
        let verdict = spamc.classify(&message).unwrap();
        assert!(verdict.is_spam);
        assert_eq!(message.len(), verdict.score.len());
    }

    #[test]
    fn child_may_ignore_stdin() {
        let dir = TempDir::new().unwrap();
        let spamc = script(&dir, "echo 0.0/5.0");
        let message = vec![b'x'; 1024 * 1024];
        assert!(!spamc.classify(&message).unwrap().is_spam);
    }

    #[test]
    fn train_uses_learntype() {
        let dir = TempDir::new().unwrap();
        let spamc = script(
            &dir,
            "cat >/dev/null\n\
             [ \"$1\" = --learntype=spam ] || exit 99\n\
             exit 5",
        );
        assert_eq!(TrainOutcome::Learned, spamc.train(b"spam").unwrap());
    }

    #[test]
    fn train_already_learned() {
        let dir = TempDir::new().unwrap();
        let spamc = script(&dir, "cat >/dev/null; exit 6");
        assert_eq!(
            TrainOutcome::AlreadyLearned,
            spamc.train(b"spam").unwrap()
        );
    }

    #[test]
    fn missing_program_is_launch_error() {
        let dir = TempDir::new().unwrap();
        let spamc = Spamc::new(dir.path().join("nonexistent"), vec![]);
        assert_matches!(Err(Error::Launch { .. }), spamc.classify(b"x"));
    }

    #[test]
    fn killed_child_is_terminated() {
        let dir = TempDir::new().unwrap();
        let spamc = script(&dir, "kill -9 $$");
        assert_matches!(Err(Error::Terminated { .. }), spamc.train(b"x"));
    }
}
