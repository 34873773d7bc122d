use crate::model::*;

/// True when `candidate`, widened by `buffer` on both sides, touches `blocked`:
/// either a direct overlap or a gap smaller than `buffer` to either edge.
pub fn collides(candidate: &Span, blocked: &BlockedInterval, buffer: Minutes) -> bool {
    candidate.expanded(buffer).overlaps(blocked)
}

/// First blocked interval the buffered candidate collides with.
/// `blocked` must be sorted by start; the scan stops once intervals begin
/// past the buffered candidate's end.
pub fn first_collision<'a>(
    blocked: &'a [BlockedInterval],
    candidate: &Span,
    buffer: Minutes,
) -> Option<&'a BlockedInterval> {
    let search = candidate.expanded(buffer);
    blocked
        .iter()
        .take_while(|b| b.start < search.end)
        .find(|b| b.end > search.start)
}
