//! Merge resolution for one file.
//!
//! [`MergeResolver`] drives the whole algorithm: read and validate the
//! three versions, take a fast path when one side is unchanged, otherwise
//! split the file into hunks, ask the backend chain to resolve each
//! conflict region (several at a time), splice the answers back and write
//! the result atomically.

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::atomic::write_atomic;
use crate::backend::BackendChain;
use crate::config::{DriverConfig, UnresolvedPolicy};
use crate::conflict::{ConflictRegion, MarkerStyle, Merger, RegionOutcome, ThreeWayDiff};
use crate::errors::CoreError;
use crate::input::{MergeInputs, MergeInvocation};
use crate::prompt::PromptBuilder;

/// Outcome of resolving a whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    /// Every region resolved; the merged text.
    Resolved(String),
    /// At least one region stayed unresolved.
    Unresolved {
        /// Per-region failure reasons, joined.
        reason: String,
        /// The merge with markers around unresolved regions, unless the
        /// policy leaves the output alone.
        merged_with_markers: Option<String>,
    },
}

impl ResolutionResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Exit status reported to Git.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Resolved(_) => 0,
            Self::Unresolved { .. } => 1,
        }
    }

    /// The text that was (or, in a dry run, would have been) written.
    pub fn merged_text(&self) -> Option<&str> {
        match self {
            Self::Resolved(text) => Some(text),
            Self::Unresolved {
                merged_with_markers,
                ..
            } => merged_with_markers.as_deref(),
        }
    }
}

/// Resolves merge-driver invocations against a backend chain.
pub struct MergeResolver {
    config: DriverConfig,
    chain: BackendChain,
    dry_run: bool,
}

impl MergeResolver {
    /// `config` must already be validated; env vars are not consulted here.
    pub fn new(config: DriverConfig, chain: BackendChain) -> Self {
        Self {
            config,
            chain,
            dry_run: false,
        }
    }

    /// Compute the result without writing the output file.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Resolve one file.
    ///
    /// Content and I/O problems are errors and leave the output untouched.
    /// Backend failures only ever make regions unresolved.
    #[instrument(skip_all, fields(file = %invocation.display_name()))]
    pub async fn resolve(&self, invocation: &MergeInvocation) -> Result<ResolutionResult, CoreError> {
        let inputs = invocation.read_inputs()?;

        if let Some(merged) = Merger::trivial_merge(&inputs.base, &inputs.ours, &inputs.theirs) {
            info!("trivial merge, no backend needed");
            let merged = merged.to_string();
            self.commit(invocation, &merged)?;
            return Ok(ResolutionResult::Resolved(merged));
        }

        let diff = ThreeWayDiff::compute(&inputs.base, &inputs.ours, &inputs.theirs);
        let regions = diff.conflicts();
        info!(
            hunks = diff.hunks().len(),
            regions = regions.len(),
            "three-way diff computed"
        );

        let outcomes = self.resolve_regions(&diff, &regions, invocation).await;
        let result = self.assemble(&diff, &outcomes, invocation, &inputs);

        if !result.has_conflicts {
            info!(regions = regions.len(), "all regions resolved");
            self.commit(invocation, &result.merged_content)?;
            return Ok(ResolutionResult::Resolved(result.merged_content));
        }

        let reason = outcomes
            .iter()
            .enumerate()
            .filter_map(|(idx, outcome)| match outcome {
                RegionOutcome::Unresolved(why) => Some(format!("region {}: {}", idx + 1, why)),
                RegionOutcome::Resolved(_) => None,
            })
            .collect::<Vec<_>>()
            .join("; ");
        let unresolved = outcomes.iter().filter(|o| !o.is_resolved()).count();
        warn!(
            unresolved,
            total = outcomes.len(),
            policy = ?self.config.driver.on_unresolved,
            "conflicts remain"
        );
        for marker in &result.conflict_markers {
            debug!(
                start = marker.start_line,
                end = marker.end_line,
                "conflict markers written"
            );
        }

        match self.config.driver.on_unresolved {
            UnresolvedPolicy::Markers => {
                self.commit(invocation, &result.merged_content)?;
                Ok(ResolutionResult::Unresolved {
                    reason,
                    merged_with_markers: Some(result.merged_content),
                })
            }
            UnresolvedPolicy::Leave => Ok(ResolutionResult::Unresolved {
                reason,
                merged_with_markers: None,
            }),
        }
    }

    /// One outcome per region, in region order. At most
    /// `max_concurrent_requests` regions are in flight at once.
    async fn resolve_regions(
        &self,
        diff: &ThreeWayDiff<'_>,
        regions: &[ConflictRegion],
        invocation: &MergeInvocation,
    ) -> Vec<RegionOutcome> {
        let builder = PromptBuilder::new(&self.config.prompt, invocation.path_name.as_deref());
        let total = regions.len();
        let marker_size = invocation.marker_size;
        let chain = &self.chain;

        let prompts: Vec<_> = regions
            .iter()
            .map(|region| builder.build(diff, region, total))
            .collect();

        stream::iter(prompts.into_iter().enumerate())
            .map(|(idx, prompt)| async move {
                match prompt {
                    Some(prompt) => {
                        debug!(region = idx + 1, total, "resolving region");
                        chain.resolve(&prompt, marker_size).await
                    }
                    None => {
                        warn!(region = idx + 1, "region exceeds prompt budget");
                        RegionOutcome::Unresolved("region exceeds prompt budget".into())
                    }
                }
            })
            .buffered(self.config.driver.max_concurrent_requests.max(1))
            .collect()
            .await
    }

    fn assemble(
        &self,
        diff: &ThreeWayDiff<'_>,
        outcomes: &[RegionOutcome],
        invocation: &MergeInvocation,
        inputs: &MergeInputs,
    ) -> crate::conflict::MergeResult {
        let style = MarkerStyle {
            size: invocation.marker_size,
            labels: &invocation.labels,
            diff3: self.config.driver.diff3_markers,
            eol: inputs.line_ending(),
        };
        Merger::assemble(diff, outcomes, &style)
    }

    /// Write `merged` to the output unless it already holds exactly that.
    fn commit(&self, invocation: &MergeInvocation, merged: &str) -> Result<(), CoreError> {
        if self.dry_run {
            debug!("dry run, output not written");
            return Ok(());
        }
        if let Ok(current) = std::fs::read(&invocation.output) {
            if current == merged.as_bytes() {
                info!(output = %invocation.output.display(), "output already up to date, skipping write");
                return Ok(());
            }
        }
        write_atomic(&invocation.output, merged)?;
        info!(output = %invocation.output.display(), bytes = merged.len(), "merged output written");
        Ok(())
    }
}
