//! Building the document that seeds a fresh context.
//!
//! Content is gathered in priority order (long-term memory, recent exchanges,
//! today's log, yesterday's log, rotation metadata) and then cut down by a
//! fixed escalation until its estimated size fits the budget:
//!
//! 1. drop yesterday's log
//! 2. keep at most 3 exchanges
//! 3. keep the first 70% and last 20% of long-term memory lines
//! 4. drop today's log and keep at most 1 exchange
//!
//! Metadata is never dropped. A payload still over budget after step 4 is
//! delivered as-is and flagged.

use chrono::{Duration, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::estimate::estimate_tokens;
use super::memory::MemorySource;
use super::transcript::{ExchangePair, extract_exchange_pairs, read_lossy};
use crate::config::RotationConfig;

/// Exchanges kept after step 2.
pub const TRIMMED_EXCHANGES: usize = 3;
/// Exchanges kept after step 4.
pub const MINIMAL_EXCHANGES: usize = 1;
/// Share of long-term memory lines kept from the top, in percent (rounded up).
pub const MEMORY_HEAD_PERCENT: usize = 70;
/// Share of long-term memory lines kept from the bottom, in percent (rounded down).
pub const MEMORY_TAIL_PERCENT: usize = 20;

const CLOSING_LINE: &str = "Continue the conversation from here. The archived transcript holds \
full history if you need details that are missing above.";

/// One truncation step, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationStep {
    DropYesterday,
    TrimExchanges,
    TrimLongTermMemory,
    DropTodayAndTrimExchanges,
}

impl TruncationStep {
    pub const ORDER: [TruncationStep; 4] = [
        TruncationStep::DropYesterday,
        TruncationStep::TrimExchanges,
        TruncationStep::TrimLongTermMemory,
        TruncationStep::DropTodayAndTrimExchanges,
    ];
}

/// Facts about the rotation that produced the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationMetadata {
    pub ordinal: usize,
    pub reason: String,
    pub previous_context_id: Option<String>,
    pub archive_path: Option<PathBuf>,
    pub trigger_count: u64,
}

/// A daily log and the date it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLog {
    pub date: NaiveDate,
    pub text: String,
}

/// Content injected into a fresh context.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionPayload {
    pub long_term_memory: String,
    pub today: DailyLog,
    pub yesterday: DailyLog,
    pub exchanges: Vec<ExchangePair>,
    pub metadata: RotationMetadata,
    /// Budget the payload was truncated against.
    pub budget: usize,
    /// Estimated size of the rendered document.
    pub estimated_tokens: usize,
    pub steps_applied: Vec<TruncationStep>,
    /// Set when even the minimal payload exceeds the budget.
    pub over_budget: bool,
}

impl InjectionPayload {
    pub fn new(
        long_term_memory: String,
        today: DailyLog,
        yesterday: DailyLog,
        exchanges: Vec<ExchangePair>,
        metadata: RotationMetadata,
    ) -> Self {
        let mut payload = Self {
            long_term_memory,
            today,
            yesterday,
            exchanges,
            metadata,
            budget: 0,
            estimated_tokens: 0,
            steps_applied: Vec::new(),
            over_budget: false,
        };
        payload.estimated_tokens = payload.estimate();
        payload
    }

    /// Estimated token cost of the rendered document.
    pub fn estimate(&self) -> usize {
        estimate_tokens(&self.render())
    }

    /// Apply a single truncation step.
    pub fn apply_step(&mut self, step: TruncationStep) {
        match step {
            TruncationStep::DropYesterday => self.yesterday.text.clear(),
            TruncationStep::TrimExchanges => keep_last(&mut self.exchanges, TRIMMED_EXCHANGES),
            TruncationStep::TrimLongTermMemory => {
                self.long_term_memory = truncate_long_term_memory(&self.long_term_memory);
            }
            TruncationStep::DropTodayAndTrimExchanges => {
                self.today.text.clear();
                keep_last(&mut self.exchanges, MINIMAL_EXCHANGES);
            }
        }
        self.steps_applied.push(step);
    }

    /// Apply steps in order until the estimate fits `budget`.
    pub fn truncate_to_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self.estimated_tokens = self.estimate();
        for step in TruncationStep::ORDER {
            if self.estimated_tokens <= budget {
                break;
            }
            self.apply_step(step);
            self.estimated_tokens = self.estimate();
        }

        self.over_budget = self.estimated_tokens > budget;
        if self.over_budget {
            warn!(
                estimated = self.estimated_tokens,
                budget, "minimal injection payload still exceeds budget; delivering as-is"
            );
        }
        self
    }

    /// Render the injection document. Empty subsections are omitted.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "[SYSTEM] Context rotated after {} compactions. The previous context was archived and this context starts fresh with inherited memory.\n\n",
            self.metadata.trigger_count
        ));
        out.push_str("## Inherited Memory\n\n");

        if !self.long_term_memory.is_empty() {
            out.push_str("### Long-Term Memory\n\n");
            out.push_str(&self.long_term_memory);
            out.push_str("\n\n");
        }

        if !self.today.text.is_empty() {
            out.push_str(&format!("### Today's Log ({})\n\n", self.today.date));
            out.push_str(&self.today.text);
            out.push_str("\n\n");
        }

        if !self.yesterday.text.is_empty() {
            out.push_str(&format!("### Yesterday's Log ({})\n\n", self.yesterday.date));
            out.push_str(&self.yesterday.text);
            out.push_str("\n\n");
        }

        if !self.exchanges.is_empty() {
            out.push_str("### Recent Conversation\n\n");
            for pair in &self.exchanges {
                out.push_str(&format!("**User:** {}\n", pair.user));
                out.push_str(&format!("**Assistant:** {}\n\n", pair.assistant));
            }
        }

        out.push_str("### Rotation Context\n\n");
        out.push_str(&format!("- Rotation: #{}\n", self.metadata.ordinal));
        out.push_str(&format!("- Reason: {}\n", self.metadata.reason));
        out.push_str(&format!(
            "- Previous context: {}\n",
            self.metadata
                .previous_context_id
                .as_deref()
                .unwrap_or("unknown")
        ));
        out.push_str(&format!(
            "- Archive: {}\n\n",
            self.metadata
                .archive_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        ));
        out.push_str(CLOSING_LINE);
        out.push('\n');
        out
    }
}

/// Injection budget for the given backoff multiplier.
pub fn budget_for(config: &RotationConfig, backoff: f64) -> usize {
    (config.base_budget() * backoff).floor() as usize
}

/// Keep the head and tail of `text` by line count, joined by a marker.
///
/// Text too short to lose a whole line is returned unchanged.
pub fn truncate_long_term_memory(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let head = (total * MEMORY_HEAD_PERCENT).div_ceil(100);
    let tail = total * MEMORY_TAIL_PERCENT / 100;
    if head + tail >= total {
        return text.to_string();
    }

    let dropped = total - head - tail;
    let mut out = lines[..head].join("\n");
    out.push_str(&format!("\n\n[... {} lines truncated ...]\n\n", dropped));
    out.push_str(&lines[total - tail..].join("\n"));
    out
}

fn keep_last<T>(items: &mut Vec<T>, n: usize) {
    if items.len() > n {
        items.drain(..items.len() - n);
    }
}

/// Gathers memory artifacts and recent exchanges into a budgeted payload.
#[derive(Debug)]
pub struct PayloadAssembler<'a> {
    config: &'a RotationConfig,
    memory: &'a MemorySource,
}

impl<'a> PayloadAssembler<'a> {
    pub fn new(config: &'a RotationConfig, memory: &'a MemorySource) -> Self {
        Self { config, memory }
    }

    /// Build and truncate a payload.
    ///
    /// `transcript` is the archived copy of the old context; a missing file
    /// contributes no exchanges.
    pub fn assemble(
        &self,
        transcript: &Path,
        metadata: RotationMetadata,
        backoff: f64,
        today: NaiveDate,
    ) -> InjectionPayload {
        let yesterday = today - Duration::days(1);
        let content = read_lossy(transcript).unwrap_or_default();
        let exchanges = extract_exchange_pairs(content.lines(), self.config.recent_pairs);

        let payload = InjectionPayload::new(
            self.memory.long_term(),
            DailyLog {
                date: today,
                text: self.memory.daily(today),
            },
            DailyLog {
                date: yesterday,
                text: self.memory.daily(yesterday),
            },
            exchanges,
            metadata,
        );
        payload.truncate_to_budget(budget_for(self.config, backoff))
    }
}
