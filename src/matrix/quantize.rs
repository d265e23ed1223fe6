//! Step resolution for a line.
//!
//! `quantization = ceil(1 / shortest) × numerator`, where `shortest` is the
//! shortest positive duration in quarter notes. The formula ties the grid to
//! both the finest rhythmic value and the number of beats per measure; its
//! behaviour on mixed meters and pickup measures is undefined.

use crate::score::TimeSignature;

/// Compute the quantization for a line whose shortest positive duration is
/// `shortest_ticks` at `divisions` ticks per quarter note.
///
/// Returns `None` when there is no positive duration or no time signature;
/// such a line is skipped rather than built.
pub fn quantization(
    shortest_ticks: Option<u64>,
    divisions: u64,
    time_signature: Option<TimeSignature>,
) -> Option<usize> {
    let shortest = shortest_ticks.filter(|s| *s > 0)?;
    let time_signature = time_signature?;
    if divisions == 0 || time_signature.beats == 0 {
        return None;
    }
    // ceil(1 / (shortest / divisions)) == ceil(divisions / shortest)
    let per_quarter = divisions.div_ceil(shortest);
    usize::try_from(per_quarter * time_signature.beats as u64).ok()
}

/// Convert a tick position to a step index on a grid of `quantization`
/// steps per quarter note, rounding up.
pub fn ticks_to_step(ticks: u64, divisions: u64, quantization: usize) -> usize {
    (ticks * quantization as u64).div_ceil(divisions) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_four() -> Option<TimeSignature> {
        Some(TimeSignature { beats: 4, beat_type: 4 })
    }

    #[test]
    fn test_eighths_in_four_four() {
        // divisions 2: an eighth is 1 tick, ceil(2/1) * 4 = 8
        assert_eq!(quantization(Some(1), 2, four_four()), Some(8));
    }

    #[test]
    fn test_triplet_rounds_up() {
        // a triplet eighth at 3 divisions is 1 tick: ceil(3) * 3 beats
        let three_four = Some(TimeSignature { beats: 3, beat_type: 4 });
        assert_eq!(quantization(Some(1), 3, three_four), Some(9));
        // a dotted quarter (1.5 quarters): ceil(1/1.5) = 1
        assert_eq!(quantization(Some(3), 2, four_four()), Some(4));
    }

    #[test]
    fn test_undefined_without_notes_or_meter() {
        assert_eq!(quantization(None, 4, four_four()), None);
        assert_eq!(quantization(Some(0), 4, four_four()), None);
        assert_eq!(quantization(Some(1), 4, None), None);
    }

    #[test]
    fn test_ticks_to_step_rounds_up() {
        assert_eq!(ticks_to_step(3, 2, 8), 12);
        assert_eq!(ticks_to_step(1, 3, 4), 2);
        assert_eq!(ticks_to_step(0, 3, 4), 0);
    }
}
