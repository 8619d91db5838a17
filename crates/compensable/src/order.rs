use std::cell::Cell;
use std::rc::Rc;

/// Monotonically increasing counter assigned at execution time.
///
/// Rollback undoes activities in descending order of their execution
/// sequence. A counter rather than a wall-clock timestamp avoids
/// clock-resolution ties between activities executed back to back.
#[derive(Clone, Default)]
pub(crate) struct ExecutionOrder(Rc<Cell<u64>>);

impl ExecutionOrder {
    pub(crate) fn next(&self) -> u64 {
        let seq = self.0.get() + 1;
        self.0.set(seq);
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_strictly_increasing() {
        let order = ExecutionOrder::default();
        assert_eq!(order.next(), 1);
        assert_eq!(order.next(), 2);
        assert_eq!(order.next(), 3);
    }

    #[test]
    fn clones_share_the_same_counter() {
        let order = ExecutionOrder::default();
        let clone = order.clone();
        assert_eq!(order.next(), 1);
        assert_eq!(clone.next(), 2);
        assert_eq!(order.next(), 3);
    }
}
