//! End-to-end run
//!
//! discover → limit → schedule → batch loop → project summary → finalize →
//! assemble → write. Every stage gets explicit inputs; the only mutable state
//! is the summary store owned by this function.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::TextGenerator;
use crate::config::{DEFAULT_OUTPUT_PATH, GenConfig};
use crate::controller::{IterationController, RunReport};
use crate::discovery::discover;
use crate::error::{PipelineError, Result};
use crate::processor::{BatchProcessor, ContentReader, FsReader};
use crate::remote::{repo_name, resolve_base_url};
use crate::scheduler::create_batches;
use crate::sitemap::{FinalDocument, assemble};
use crate::store::SummaryStore;
use crate::summarizer::Summarizer;
use crate::types::FileRef;

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub output_path: PathBuf,
    pub document: FinalDocument,
    pub report: RunReport,
    /// Files discovered
    pub corpus_size: usize,
    /// Files sent for summarization
    pub scheduled: usize,
    pub project_summary_found: bool,
}

pub struct Pipeline<G, R = FsReader> {
    config: GenConfig,
    generator: G,
    reader: R,
    halt: CancellationToken,
}

impl<G: TextGenerator> Pipeline<G, FsReader> {
    pub fn new(config: GenConfig, generator: G) -> Self {
        Self::with_reader(config, generator, FsReader)
    }
}

impl<G: TextGenerator, R: ContentReader> Pipeline<G, R> {
    pub fn with_reader(config: GenConfig, generator: G, reader: R) -> Self {
        Self {
            config,
            generator,
            reader,
            halt: CancellationToken::new(),
        }
    }

    /// Signal that stops the batch loop before the next batch is selected
    pub fn halt_handle(&self) -> CancellationToken {
        self.halt.clone()
    }

    /// Run against `repo_path`, writing to `output_path` or
    /// [`DEFAULT_OUTPUT_PATH`].
    pub async fn run(
        self,
        repo_path: &Path,
        output_path: Option<&Path>,
    ) -> Result<PipelineOutcome> {
        let Self {
            config,
            generator,
            reader,
            halt,
        } = self;
        config.validate()?;

        let root = std::fs::canonicalize(repo_path).map_err(|e| {
            PipelineError::discovery_with_source(repo_path, "cannot resolve repository path", e)
        })?;
        let corpus = discover(&root, &config.discovery)?;

        let scheduled: &[FileRef] = match config.max_files_to_process {
            0 => &corpus.files,
            limit => &corpus.files[..limit.min(corpus.len())],
        };
        if scheduled.len() < corpus.len() {
            info!(
                limit = config.max_files_to_process,
                skipped = corpus.len() - scheduled.len(),
                "File limit reached; remaining files render without summaries"
            );
        }

        let batches = create_batches(scheduled, config.batch_size)?;
        let summarizer = Summarizer::new(generator, config.retry.policy()).with_settings(
            config.generation.batch,
            config.generation.project,
        );
        let processor = BatchProcessor::with_reader(summarizer, reader);

        let mut store = SummaryStore::new();
        let mut controller =
            IterationController::new(batches, config.iteration_ceiling).with_halt(halt);
        let report = controller.run(&processor, &mut store).await?;

        let project = project_summary(&processor, &config, &root, &corpus.files, &store).await?;
        let finalized = store.finalize(project);
        let project_summary_found = finalized.project_found;

        let base_url = resolve_base_url(&root, &config.default_branch);
        let document = assemble(
            &repo_name(&root),
            &root,
            &corpus.files,
            &finalized,
            &base_url,
            config.max_section_depth,
        );

        let output_path = output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));
        document.write_to(&output_path)?;

        if !report.batches_with_warnings.is_empty() {
            warn!(
                batches = ?report.batches_with_warnings,
                "Some batches completed with warnings"
            );
        }
        info!(
            output = %output_path.display(),
            files = corpus.len(),
            summarized = finalized.files.len(),
            iterations = report.iterations,
            "Pipeline complete"
        );

        Ok(PipelineOutcome {
            output_path,
            document,
            report,
            corpus_size: corpus.len(),
            scheduled: scheduled.len(),
            project_summary_found,
        })
    }
}

/// Ask for the project summary, skipping the call when there is nothing to
/// summarize.
async fn project_summary<G: TextGenerator, R: ContentReader>(
    processor: &BatchProcessor<G, R>,
    config: &GenConfig,
    root: &Path,
    files: &[FileRef],
    store: &SummaryStore,
) -> Result<Option<String>> {
    let overview_ref = FileRef::new(root.join(&config.overview_file));
    let overview = if files.contains(&overview_ref) {
        match processor.reader().read(&overview_ref).await {
            Ok(content) => Some(content),
            Err(err) => {
                warn!(file = %overview_ref, error = %err, "Could not read overview file");
                None
            }
        }
    } else {
        None
    };

    if store.is_empty() && overview.is_none() {
        info!("Nothing to summarize; skipping project summary");
        return Ok(None);
    }

    let summaries: BTreeMap<String, String> = store
        .summaries()
        .iter()
        .map(|(file, summary)| (file.as_key(), summary.clone()))
        .collect();
    processor
        .summarizer()
        .summarize_project(&summaries, overview.as_deref())
        .await
        .map_err(|source| PipelineError::ProjectSummaryFailed {
            source: Box::new(source),
        })
}
