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


#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match &$actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

macro_rules! die {
    ($ex:ident, $($stuff:tt)*) => {{
        eprintln!($($stuff)*);
        crate::support::sysexits::$ex.exit()
    }}
}

mod classify;
mod cli;
mod imap;
mod support;
mod sweep;

fn main() {
    cli::main::main();
}

const CONSOLE_PATTERN: &str = "{d(%H:%M:%S%.3f)} [{l}] {m}{n}";

fn console_log_config(
    level: log::LevelFilter,
) -> Result<log4rs::config::Config, String> {
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| e.to_string())
}

/// Log to standard error at `level`.
fn init_simple_log(level: log::LevelFilter) {
    if let Err(e) = console_log_config(level).and_then(|config| {
        log4rs::init_config(config).map_err(|e| e.to_string())
    }) {
        die!(EX_FATAL, "Failed to initialise logging: {}", e);
    }
}

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        let config = console_log_config(log::LevelFilter::Debug).unwrap();
        log4rs::init_config(config).unwrap();
    })
}
