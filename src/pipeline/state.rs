//! Turn phases, ordinal bookkeeping, and the per-turn report.
//!
//! [`TurnPhase`] drives the coordinator's log lines.  [`OrdinalCheck`] is
//! how each stage verifies it receives units in the order they were
//! produced.  [`TurnReport`] is what the conversation loop gets back when a
//! turn has fully drained.

use std::fmt;

// ---------------------------------------------------------------------------
// TurnPhase
// ---------------------------------------------------------------------------

/// Phases of one speaking turn.
///
/// ```text
/// Running ──generator joined──▶ Draining ──player joined──▶ Done
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnPhase {
    /// All three stages are alive.
    #[default]
    Running,

    /// The reply is fully generated; synthesis and playback catch up.
    Draining,

    /// Every stage has been joined.
    Done,
}

impl TurnPhase {
    /// Returns `true` until the player has been joined.
    ///
    /// ```
    /// use talkback::pipeline::TurnPhase;
    ///
    /// assert!(TurnPhase::Running.is_active());
    /// assert!(TurnPhase::Draining.is_active());
    /// assert!(!TurnPhase::Done.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        !matches!(self, TurnPhase::Done)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TurnPhase::Running => "Running",
            TurnPhase::Draining => "Draining",
            TurnPhase::Done => "Done",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// OrdinalCheck
// ---------------------------------------------------------------------------

/// Verifies the ordinals a stage receives.
///
/// Text chunks must arrive gap-free (`0, 1, 2, …`).  Audio units may skip
/// ordinals whose synthesis failed, but must still strictly increase.
/// A violation is logged as an error and counted; the stage carries on.
#[derive(Debug)]
pub struct OrdinalCheck {
    stage: &'static str,
    contiguous: bool,
    next: usize,
    violations: usize,
}

impl OrdinalCheck {
    /// Expect exactly `0, 1, 2, …`.
    pub fn contiguous(stage: &'static str) -> Self {
        Self {
            stage,
            contiguous: true,
            next: 0,
            violations: 0,
        }
    }

    /// Expect a strictly increasing sequence, gaps allowed.
    pub fn increasing(stage: &'static str) -> Self {
        Self {
            contiguous: false,
            ..Self::contiguous(stage)
        }
    }

    /// Record `ordinal`; returns `false` if it is out of order.
    pub fn observe(&mut self, ordinal: usize) -> bool {
        let in_order = if self.contiguous {
            ordinal == self.next
        } else {
            ordinal >= self.next
        };

        if !in_order {
            self.violations += 1;
            log::error!(
                "{}: ordinal {ordinal} out of order (expected {}{})",
                self.stage,
                if self.contiguous { "" } else { ">= " },
                self.next
            );
        }
        self.next = self.next.max(ordinal + 1);
        in_order
    }

    pub fn violations(&self) -> usize {
        self.violations
    }
}

// ---------------------------------------------------------------------------
// TurnReport
// ---------------------------------------------------------------------------

/// Everything the coordinator learned about one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    /// Full assistant reply (with the apology appended on model failure).
    pub reply: String,

    /// Text chunks the generator emitted.
    pub chunks_generated: usize,

    /// Chunks whose synthesis failed and were skipped.
    pub chunks_skipped: Vec<usize>,

    /// Ordinals actually played, in playback order.
    pub units_played: Vec<usize>,

    /// Ordinals whose playback failed.
    pub units_failed: Vec<usize>,

    /// The model failed and the apology was spoken instead.
    pub model_failed: bool,

    /// The turn was cut short by cancellation.
    pub cancelled: bool,

    /// Out-of-order ordinals seen by any stage.
    pub order_violations: usize,

    /// A stage panicked or had to be aborted.
    pub stage_lost: bool,

    pub phase: TurnPhase,
}

impl TurnReport {
    /// `true` when the turn completed without cancellation or lost stages.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && !self.stage_lost && self.order_violations == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_running() {
        assert_eq!(TurnPhase::default(), TurnPhase::Running);
    }

    #[test]
    fn phase_labels() {
        assert_eq!(TurnPhase::Running.to_string(), "Running");
        assert_eq!(TurnPhase::Draining.to_string(), "Draining");
        assert_eq!(TurnPhase::Done.to_string(), "Done");
    }

    #[test]
    fn contiguous_accepts_exact_sequence() {
        let mut check = OrdinalCheck::contiguous("test");
        assert!((0..5).all(|i| check.observe(i)));
        assert_eq!(check.violations(), 0);
    }

    #[test]
    fn contiguous_rejects_gap() {
        let mut check = OrdinalCheck::contiguous("test");
        assert!(check.observe(0));
        assert!(!check.observe(2));
        assert!(check.observe(3));
        assert_eq!(check.violations(), 1);
    }

    #[test]
    fn increasing_allows_gaps_but_not_repeats() {
        let mut check = OrdinalCheck::increasing("test");
        assert!(check.observe(0));
        assert!(check.observe(3));
        assert!(!check.observe(3));
        assert!(!check.observe(1));
        assert!(check.observe(4));
        assert_eq!(check.violations(), 2);
    }

    #[test]
    fn default_report_is_clean() {
        let report = TurnReport::default();
        assert!(report.is_clean());
        assert!(report.reply.is_empty());
    }

    #[test]
    fn cancelled_report_is_not_clean() {
        let report = TurnReport {
            cancelled: true,
            ..TurnReport::default()
        };
        assert!(!report.is_clean());
    }
}
