//! Hierarchical summarization with provenance.
//!
//! A pass over `N` nodes groups them (bounded both by item count and by
//! combined estimated tokens), asks the [`Summarizer`] to compress each
//! group with a level-specific instruction, and emits one summary node per
//! group whose [`ProvenanceRecord`] points at every member of the group.
//!
//! When the summarizer fails for a group, the group's input nodes are
//! passed through unchanged: content is never lost, and because those
//! nodes keep their own (lower) levels the DAG stays valid when the next
//! pass builds on them.
//!
//! The driver ([`HierarchicalSummarizer::build`]) runs level 1 over the
//! original chunks and keeps going while the previous level left at least
//! two nodes, up to `max_levels`.

use std::ops::Range;

use crate::models::{Chunk, ProvenanceRecord};
use crate::token::TokenEstimator;
use crate::traits::Summarizer;

/// Separator placed between group members in the summarizer input.
pub const GROUP_SEPARATOR: &str = "\n\n---\n\n";

/// Text plus lineage for one node of the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub text: String,
    pub record: ProvenanceRecord,
}

impl HierarchyNode {
    /// Level-0 node for an original chunk.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            text: chunk.content.clone(),
            record: ProvenanceRecord::original(chunk),
        }
    }
}

/// Prompt and compression target for one summarization level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelInstruction {
    pub level: u32,
    /// Fraction of the input length the summary should aim for.
    pub target_ratio: f64,
    pub instruction: String,
}

/// Instruction for `level`. Each level asks for a markedly smaller output.
pub fn level_instruction(level: u32) -> LevelInstruction {
    let (target_ratio, body) = match level {
        0 | 1 => (
            0.5,
            "Summarize the following passages into one condensed account. \
             Preserve key insights, events, and distinctive details; reduce \
             verbosity and repetition.",
        ),
        2 => (
            0.25,
            "Extract the essential themes running through the following \
             summaries. Merge overlapping points, drop supporting detail, and \
             keep only the narrative arc and its central ideas.",
        ),
        _ => (
            0.1,
            "Distill the following material to its absolute essence: a few \
             sentences naming the core ideas and nothing else.",
        ),
    };
    LevelInstruction {
        level,
        target_ratio,
        instruction: format!(
            "{} Aim for about {}% of the input length. Return only the result.",
            body,
            (target_ratio * 100.0).round() as u32
        ),
    }
}

/// Bounds applied when forming groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingPolicy {
    /// Maximum combined estimated tokens of a group's members.
    pub max_group_tokens: usize,
    /// Maximum members per group.
    pub group_size: usize,
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        Self {
            max_group_tokens: 4000,
            group_size: 3,
        }
    }
}

/// Outcome of one summarization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryLevel {
    pub level: u32,
    /// New summary nodes and passed-through fallback nodes, in order.
    pub nodes: Vec<HierarchyNode>,
    pub summarized_groups: usize,
    pub failed_groups: usize,
}

impl SummaryLevel {
    /// Nodes created by this pass (excludes fallback pass-through).
    pub fn created(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.iter().filter(move |n| n.record.level == self.level)
    }
}

/// Full result of [`HierarchicalSummarizer::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    pub leaves: Vec<HierarchyNode>,
    pub levels: Vec<SummaryLevel>,
}

impl Hierarchy {
    /// Records created by the summarization passes, in creation order.
    pub fn summary_records(&self) -> Vec<&ProvenanceRecord> {
        self.levels
            .iter()
            .flat_map(|l| l.created().map(|n| &n.record))
            .collect()
    }

    /// Nodes of the last pass (or the leaves when no pass ran).
    pub fn top(&self) -> &[HierarchyNode] {
        match self.levels.last() {
            Some(level) => &level.nodes,
            None => &self.leaves,
        }
    }

    pub fn failed_groups(&self) -> usize {
        self.levels.iter().map(|l| l.failed_groups).sum()
    }
}

/// Drives level passes against a [`Summarizer`].
pub struct HierarchicalSummarizer<'a> {
    summarizer: &'a dyn Summarizer,
    estimator: TokenEstimator,
    max_group_tokens: usize,
    run_id: String,
}

impl<'a> HierarchicalSummarizer<'a> {
    pub fn new(
        summarizer: &'a dyn Summarizer,
        estimator: TokenEstimator,
        max_group_tokens: usize,
        run_id: &str,
    ) -> Self {
        Self {
            summarizer,
            estimator,
            max_group_tokens,
            run_id: run_id.to_string(),
        }
    }

    /// Summarize `items` into level `target_level`.
    pub async fn summarize_level(
        &self,
        items: &[HierarchyNode],
        target_level: u32,
        group_size: usize,
    ) -> SummaryLevel {
        let policy = GroupingPolicy {
            max_group_tokens: self.max_group_tokens,
            group_size,
        };
        let instruction = level_instruction(target_level);
        let mut nodes = Vec::new();
        let mut summarized_groups = 0;
        let mut failed_groups = 0;

        for (ordinal, range) in group_ranges(items, &policy, &self.estimator)
            .into_iter()
            .enumerate()
        {
            let group = &items[range];
            match self.summarize_group(group, target_level, ordinal, &instruction).await {
                Ok(node) => {
                    summarized_groups += 1;
                    nodes.push(node);
                }
                Err(e) => {
                    tracing::warn!(
                        level = target_level,
                        group = ordinal,
                        error = %e,
                        "summarization failed; keeping group unsummarized"
                    );
                    failed_groups += 1;
                    nodes.extend(group.iter().cloned());
                }
            }
        }

        tracing::debug!(
            level = target_level,
            inputs = items.len(),
            outputs = nodes.len(),
            failed_groups,
            "summary level complete"
        );

        SummaryLevel {
            level: target_level,
            nodes,
            summarized_groups,
            failed_groups,
        }
    }

    async fn summarize_group(
        &self,
        group: &[HierarchyNode],
        level: u32,
        ordinal: usize,
        instruction: &LevelInstruction,
    ) -> anyhow::Result<HierarchyNode> {
        let combined = group
            .iter()
            .map(|n| n.text.as_str())
            .collect::<Vec<_>>()
            .join(GROUP_SEPARATOR);

        let summary = self
            .summarizer
            .summarize(&combined, &instruction.instruction)
            .await?;
        let summary = summary.trim();
        if summary.is_empty() {
            anyhow::bail!("summarizer returned an empty summary");
        }

        let parents: Vec<&ProvenanceRecord> = group.iter().map(|n| &n.record).collect();
        let record = ProvenanceRecord::summary(
            &summary_id(&self.run_id, level, ordinal),
            &self.run_id,
            level,
            &parents,
            self.estimator.estimate(summary),
        )?;

        Ok(HierarchyNode {
            text: summary.to_string(),
            record,
        })
    }

    /// Run level 1 over `chunks`, then further levels while at least two
    /// nodes remain, stopping after `max_levels`.
    pub async fn build_hierarchy(
        &self,
        chunks: &[Chunk],
        group_size: usize,
        max_levels: u32,
    ) -> Hierarchy {
        let leaves: Vec<HierarchyNode> = chunks.iter().map(HierarchyNode::from_chunk).collect();
        let mut levels = Vec::new();
        if leaves.is_empty() {
            return Hierarchy { leaves, levels };
        }

        let mut current = leaves.clone();
        for level in 1..=max_levels {
            let pass = self.summarize_level(&current, level, group_size).await;
            let remaining = pass.nodes.len();
            current = pass.nodes.clone();
            levels.push(pass);
            if remaining <= 1 {
                break;
            }
        }

        Hierarchy { leaves, levels }
    }
}

/// `"{run_id}:L{level}:{ordinal:04}"`
pub fn summary_id(run_id: &str, level: u32, ordinal: usize) -> String {
    format!("{}:L{}:{:04}", run_id, level, ordinal)
}

/// Consecutive index ranges honouring both group bounds. An item that alone
/// exceeds `max_group_tokens` forms its own group.
fn group_ranges(
    items: &[HierarchyNode],
    policy: &GroupingPolicy,
    estimator: &TokenEstimator,
) -> Vec<Range<usize>> {
    let group_size = policy.group_size.max(1);
    let mut groups = Vec::new();
    let mut start = 0usize;
    let mut tokens = 0usize;

    for (i, item) in items.iter().enumerate() {
        let item_tokens = estimator.estimate(&item.text);
        let members = i - start;
        if members > 0
            && (members + 1 > group_size || tokens + item_tokens > policy.max_group_tokens)
        {
            groups.push(start..i);
            start = i;
            tokens = 0;
        }
        tokens += item_tokens;
    }
    if start < items.len() {
        groups.push(start..items.len());
    }

    groups
}
