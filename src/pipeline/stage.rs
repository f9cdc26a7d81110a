use indexmap::IndexMap;
use std::fmt;
use std::time::Duration;

/// The stages of one iteration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Capture,
    Caption,
    Persist,
    Display,
    Narrate,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Capture => "Capture",
            PipelineStage::Caption => "Caption",
            PipelineStage::Persist => "Persist",
            PipelineStage::Display => "Display",
            PipelineStage::Narrate => "Narrate",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage hands to the controller.
#[derive(Debug)]
pub enum StageResult<T> {
    /// The stage produced its real output.
    Continue(T),
    /// The stage failed; `T` is the documented stand-in.
    Degraded(T),
    /// Later stages cannot run this iteration.
    Abort,
}

impl<T> StageResult<T> {
    /// Contains a stage failure, substituting `fallback` for the lost output.
    pub fn from_result<E: fmt::Display>(
        stage: PipelineStage,
        iteration: u64,
        result: Result<T, E>,
        fallback: T,
    ) -> Self {
        match result {
            Ok(value) => StageResult::Continue(value),
            Err(e) => {
                tracing::warn!(iteration, stage = %stage, "stage failed: {}", e);
                StageResult::Degraded(fallback)
            }
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            StageResult::Continue(value) | StageResult::Degraded(value) => Some(value),
            StageResult::Abort => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageResult::Degraded(_))
    }
}

/// Wall time per stage for one iteration, in execution order.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    durations: IndexMap<PipelineStage, Duration>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: PipelineStage, duration: Duration) {
        *self.durations.entry(stage).or_default() += duration;
    }

    pub fn get(&self, stage: PipelineStage) -> Option<Duration> {
        self.durations.get(&stage).copied()
    }

    pub fn stages(&self) -> impl Iterator<Item = PipelineStage> + '_ {
        self.durations.keys().copied()
    }

    pub fn total(&self) -> Duration {
        self.durations.values().sum()
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (stage, duration) in &self.durations {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}ms", stage, duration.as_millis())?;
            first = false;
        }
        Ok(())
    }
}
