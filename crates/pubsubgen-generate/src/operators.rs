use pubsubgen_core::Operator;
use pubsubgen_plan::{EqualityTarget, FieldTarget, percent_of};
use rand::Rng;
use rand::seq::IndexedRandom;

/// Per-field counters read by the operator policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldProgress {
    /// Occurrences emitted so far, excluding the one being decided.
    pub occurrences: u64,
    /// Occurrences so far that used `=`.
    pub equalities: u64,
}

/// Pick the operator for the next occurrence of a field.
///
/// A fixed equality target is met exactly: `=` is forced once the remaining
/// occurrences are all needed for it, and never drawn once it is met. A live
/// target keeps the equality count at `round_half_up(p * occurrences / 100)`.
pub fn choose_operator<R: Rng + ?Sized>(
    target: &FieldTarget,
    progress: FieldProgress,
    rng: &mut R,
) -> Operator {
    match target.equality {
        EqualityTarget::None => uniform(&Operator::ALL, rng),
        EqualityTarget::Fixed(equalities) => {
            let remaining_equal = equalities.saturating_sub(progress.equalities);
            let remaining_slots = target
                .occurrence
                .map(|occurrence| occurrence.saturating_sub(progress.occurrences));

            if remaining_equal == 0 {
                uniform(&Operator::NON_EQUALITY, rng)
            } else if remaining_slots == Some(remaining_equal) {
                Operator::Equal
            } else {
                uniform(&Operator::ALL, rng)
            }
        }
        // Live targets follow the occurrences so far: `=` is drawn only while
        // below the live target, never above it.
        EqualityTarget::Live(percentage) => {
            let live_target = percent_of(percentage, progress.occurrences + 1);
            if progress.equalities < live_target {
                Operator::Equal
            } else {
                uniform(&Operator::NON_EQUALITY, rng)
            }
        }
    }
}

fn uniform<R: Rng + ?Sized>(operators: &[Operator], rng: &mut R) -> Operator {
    operators.choose(rng).copied().unwrap_or(Operator::Equal)
}
