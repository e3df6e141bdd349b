//! Per-step outcome: a step either completes or degrades with a reason.
//! Degraded steps still carry a usable value, so a run never unwinds.

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    Completed(T),
    Degraded { value: T, reason: String },
}

impl<T> StepOutcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        StepOutcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn into_parts(self) -> (T, Option<String>) {
        match self {
            StepOutcome::Completed(v) => (v, None),
            StepOutcome::Degraded { value, reason } => (value, Some(reason)),
        }
    }
}
