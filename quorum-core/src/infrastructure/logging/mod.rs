//! `log4rs` setup: console on stderr plus optional rolling files.
//!
//! Filters are comma separated. A bare level (`debug`) applies to our own crates, `<module>=<level>`
//! sets one module, and `root=<level>` opens up every other crate. Without `root=` third-party
//! crates are off.

mod consts;

pub use consts::*;

use crate::foundation::ThresholdError;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;
use log4rs::Config;
use std::io::IsTerminal;
use std::path::Path;

#[derive(Debug, PartialEq, Eq)]
struct LogFilters {
    own: LevelFilter,
    root: LevelFilter,
    modules: Vec<(String, LevelFilter)>,
}

impl LogFilters {
    fn parse(raw: &str) -> Self {
        let mut filters = Self { own: LevelFilter::Info, root: LevelFilter::Off, modules: Vec::new() };
        let mut own_set = false;
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                None => {
                    if let (false, Ok(level)) = (own_set, part.parse()) {
                        filters.own = level;
                        own_set = true;
                    }
                }
                Some((module, level)) => {
                    let (module, Ok(level)) = (module.trim(), level.trim().parse::<LevelFilter>()) else {
                        continue;
                    };
                    match module {
                        "" => {}
                        "root" => filters.root = level,
                        _ => filters.modules.push((module.to_string(), level)),
                    }
                }
            }
        }
        filters
    }

    fn names(&self, module: &str) -> bool {
        self.modules.iter().any(|(m, _)| m == module)
    }
}

/// Installs the global logger. Later calls keep the first configuration.
pub fn init_logger(log_dir: Option<&str>, filters: &str) -> Result<(), ThresholdError> {
    let filters = LogFilters::parse(filters);
    let console_pattern = if std::io::stderr().is_terminal() { CONSOLE_PATTERN_ANSI } else { LINE_PATTERN };
    let console = ConsoleAppender::builder().target(Target::Stderr).encoder(Box::new(PatternEncoder::new(console_pattern))).build();

    let mut builder = Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut appenders = vec!["console".to_string()];
    if let Some(dir) = log_dir.map(str::trim).filter(|d| !d.is_empty()) {
        let dir = Path::new(dir);
        builder = builder.appender(Appender::builder().build("file", Box::new(rolling_file(dir, LOG_FILE_NAME)?)));
        builder = builder.appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                .build("err_file", Box::new(rolling_file(dir, ERR_LOG_FILE_NAME)?)),
        );
        appenders.extend(["file".to_string(), "err_file".to_string()]);
    }

    let logger = |name: &str, level: LevelFilter| Logger::builder().appenders(appenders.clone()).additive(false).build(name, level);
    for name in OWN_CRATES.iter().filter(|name| !filters.names(name)) {
        builder = builder.logger(logger(name, filters.own));
    }
    for (module, level) in &filters.modules {
        builder = builder.logger(logger(module, *level));
    }

    let config = builder
        .build(Root::builder().appenders(appenders.clone()).build(filters.root))
        .map_err(|err| ThresholdError::ConfigError(format!("logger config: {}", err)))?;
    // A logger installed earlier (tests, embedding binaries) wins.
    let _ = log4rs::init_config(config);
    Ok(())
}

fn rolling_file(dir: &Path, file_name: &str) -> Result<RollingFileAppender, ThresholdError> {
    let archive = dir.join(format!("{}.{{}}.gz", file_name));
    let archive = archive.to_str().ok_or_else(|| ThresholdError::ConfigError(format!("log dir is not valid UTF-8: {}", dir.display())))?;
    let roller =
        FixedWindowRoller::builder().base(1).build(archive, ROLL_KEEP).map_err(|err| ThresholdError::ConfigError(format!("log roller: {}", err)))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE_BYTES)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LINE_PATTERN)))
        .build(dir.join(file_name), Box::new(policy))
        .map_err(|err| ThresholdError::ConfigError(format!("log file {}: {}", file_name, err)))
}
