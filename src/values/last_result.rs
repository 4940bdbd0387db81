use crate::values::counters::HeapCounters;
use crate::values::value::Value;
use std::collections::VecDeque;

pub const MAX_LAST_RESULT_DEPTH: usize = 10;

/// Bounded ring of the most recent top-level results, addressable by the
/// built-in `r`. Newest first.
#[derive(Debug, Default)]
pub struct LastResultFifo {
    entries: VecDeque<Value>,
}

impl LastResultFifo {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pushes a new most-recent result, evicting the oldest when full.
    pub fn push(&mut self, value: Value, counters: &mut HeapCounters) {
        if self.entries.len() == MAX_LAST_RESULT_DEPTH {
            if let Some(Value::Str(Some(_))) = self.entries.pop_back() {
                counters.last_value_strings -= 1;
            }
        }
        if matches!(value, Value::Str(Some(_))) {
            counters.last_value_strings += 1;
        }
        self.entries.push_front(value);
    }

    /// Replaces the newest entry (several results within one command line
    /// collapse into one FIFO slot).
    pub fn replace_newest(&mut self, value: Value, counters: &mut HeapCounters) {
        if let Some(Value::Str(Some(_))) = self.entries.pop_front() {
            counters.last_value_strings -= 1;
        }
        if matches!(value, Value::Str(Some(_))) {
            counters.last_value_strings += 1;
        }
        self.entries.push_front(value);
    }

    /// Entry `n` (1 = newest).
    pub fn get(&self, n: usize) -> Option<&Value> {
        if n == 0 { None } else { self.entries.get(n - 1) }
    }

    pub fn clear(&mut self, counters: &mut HeapCounters) {
        for entry in self.entries.drain(..) {
            if matches!(entry, Value::Str(Some(_))) {
                counters.last_value_strings -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_keeps_string_count_balanced() {
        let mut fifo = LastResultFifo::default();
        let mut counters = HeapCounters::default();
        for i in 0..(MAX_LAST_RESULT_DEPTH + 3) {
            fifo.push(Value::from(format!("s{i}").as_str()), &mut counters);
        }
        assert_eq!(fifo.len(), MAX_LAST_RESULT_DEPTH);
        assert_eq!(counters.last_value_strings, MAX_LAST_RESULT_DEPTH as i32);
        fifo.clear(&mut counters);
        assert!(counters.all_zero());
    }

    #[test]
    fn newest_first() {
        let mut fifo = LastResultFifo::default();
        let mut counters = HeapCounters::default();
        fifo.push(Value::Long(1), &mut counters);
        fifo.push(Value::Long(2), &mut counters);
        assert_eq!(fifo.get(1), Some(&Value::Long(2)));
        assert_eq!(fifo.get(2), Some(&Value::Long(1)));
        assert_eq!(fifo.get(3), None);
    }
}
