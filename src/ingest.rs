use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::IngestConfig,
    error::IngestError,
    event_log::{EventLog, FileEventLog},
    fetch::{fetch_and_extract, HttpTransport, Transport},
    template::render,
};

/// One (year, month) to download.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchTarget {
    pub year: i64,
    pub month: i64,
    pub url: String,
    pub output_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ItemOutcome {
    Saved(PathBuf),
    NoCsv,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemReport {
    pub target: FetchTarget,
    pub outcome: ItemOutcome,
}

/// What happened to each target of a run, in the order they were processed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    pub items: Vec<ItemReport>,
}

pub struct Ingestor<T, L> {
    config: IngestConfig,
    transport: T,
    log: L,
}

impl<T: Transport, L: EventLog> Ingestor<T, L> {
    pub fn new(config: IngestConfig, transport: T, log: L) -> Self {
        Ingestor {
            config,
            transport,
            log,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// All the files to fetch, years in the outer loop and months in the
    /// inner loop, both in configuration order.
    pub fn targets(&self) -> Vec<FetchTarget> {
        let bts = &self.config.bts;
        let raw_dir = Path::new(&self.config.storage.local_raw_dir);
        let mut targets = Vec::with_capacity(bts.years.len() * bts.months.len());
        for &year in &bts.years {
            for &month in &bts.months {
                let filename = render(&self.config.storage.output_filename_template, year, month);
                targets.push(FetchTarget {
                    year,
                    month,
                    url: render(&bts.url_template, year, month),
                    output_path: raw_dir.join(filename),
                });
            }
        }
        targets
    }

    /// Download every target.  A failed target is logged and skipped, the only
    /// error returned is failing to create the raw data directory.
    pub fn run(&self) -> Result<IngestReport, IngestError> {
        fs::create_dir_all(&self.config.storage.local_raw_dir)?;

        let mut report = IngestReport::default();
        for target in self.targets() {
            let outcome = self.process(&target);
            report.items.push(ItemReport { target, outcome });
        }
        Ok(report)
    }

    fn process(&self, target: &FetchTarget) -> ItemOutcome {
        self.log.info(&format!("Downloading {}", target.url));
        match fetch_and_extract(&self.transport, &target.url, &target.output_path) {
            Ok(true) => {
                self.log
                    .info(&format!("Saved {}", target.output_path.display()));
                ItemOutcome::Saved(target.output_path.clone())
            }
            Ok(false) => {
                self.log.warn(&format!("No CSV found in {}", target.url));
                ItemOutcome::NoCsv
            }
            Err(e) => {
                self.log.error(&format!("Failed {} -> {}", target.url, e));
                ItemOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Load the configuration at `config_path` and download everything it lists,
/// logging to the configured log file.
pub fn run(config_path: impl AsRef<Path>) -> Result<IngestReport, IngestError> {
    let config = IngestConfig::load(config_path)?;
    let log = FileEventLog::open(&config.logging.log_file)?;
    let transport = HttpTransport::from_config(&config.bts)?;
    Ingestor::new(config, transport, log).run()
}
