//! Batch conversion on a bounded worker pool

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use super::{MigrationConfig, MigrationPipeline, PackageConversion};
use crate::error::{ErrorReport, MigrationResult, Reportable};
use crate::mapping::python::SlugAllocator;

/// Result for one package of a batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: MigrationResult<PackageConversion>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn conversion(&self) -> Option<&PackageConversion> {
        self.result.as_ref().ok()
    }
}

/// A connection manager name used by more than one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConnection {
    pub name: String,
    /// Names of the packages declaring it, in input order
    pub packages: Vec<String>,
}

/// Outcomes of a batch, in input order
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    /// Sorted by connection name
    pub shared_connections: Vec<SharedConnection>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Error reports of every package: fatal errors and diagnostics
    pub fn reports(&self) -> Vec<ErrorReport> {
        let mut reports = Vec::new();
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(conversion) => reports.extend(conversion.reports()),
                Err(e) => reports.push(e.report().in_file(Some(&outcome.path))),
            }
        }
        reports
    }
}

fn shared_connections(outcomes: &[BatchOutcome]) -> Vec<SharedConnection> {
    let mut users: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for conversion in outcomes.iter().filter_map(BatchOutcome::conversion) {
        for manager in &conversion.model.connection_managers {
            let packages = users.entry(manager.name.clone()).or_default();
            if !packages.contains(&conversion.model.name) {
                packages.push(conversion.model.name.clone());
            }
        }
    }
    users
        .into_iter()
        .filter(|(_, packages)| packages.len() > 1)
        .map(|(name, packages)| SharedConnection { name, packages })
        .collect()
}

/// Converts many packages; one package's failure never affects another
#[derive(Debug)]
pub struct BatchRunner {
    pipeline: MigrationPipeline,
}

impl BatchRunner {
    pub fn new(config: MigrationConfig) -> MigrationResult<Self> {
        Ok(Self {
            pipeline: MigrationPipeline::new(config)?,
        })
    }

    pub fn with_pipeline(pipeline: MigrationPipeline) -> Self {
        Self { pipeline }
    }

    /// Convert every package, at most `max_workers` at a time
    ///
    /// Output directories are named after the file stems and made unique
    /// in input order.
    pub fn run(&self, paths: &[PathBuf]) -> BatchReport {
        let _span = info_span!("convert_batch", packages = paths.len()).entered();
        let start = Instant::now();

        let mut slugs = SlugAllocator::new();
        let jobs: Vec<(PathBuf, String)> = paths
            .iter()
            .map(|path| {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (path.clone(), slugs.allocate(&stem))
            })
            .collect();

        let convert = |(path, dir_name): &(PathBuf, String)| {
            let result = self.pipeline.convert_file_into(path, dir_name);
            if let Err(e) = &result {
                error!(package = %path.display(), stage = e.stage_name(), error = %e, "Package failed");
            }
            BatchOutcome {
                path: path.clone(),
                result,
            }
        };

        let workers = self.pipeline.config().max_workers;
        let outcomes: Vec<BatchOutcome> = match ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| jobs.par_iter().map(convert).collect()),
            Err(e) => {
                warn!(error = %e, "Worker pool unavailable, converting sequentially");
                jobs.iter().map(convert).collect()
            }
        };

        let report = BatchReport {
            shared_connections: shared_connections(&outcomes),
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            packages = report.outcomes.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            shared_connections = report.shared_connections.len(),
            duration_ms = report.duration_ms,
            "Batch completed"
        );
        report
    }
}
