use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

/// Sliding window over the most recent question/answer pairs.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    exchanges: VecDeque<Exchange>,
    max_history: usize,
    context_exchanges: usize,
}

impl ConversationMemory {
    pub fn new(max_history: usize, context_exchanges: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_history),
            max_history,
            context_exchanges,
        }
    }

    pub fn add_exchange(&mut self, question: &str, answer: &str) {
        if self.max_history == 0 {
            return;
        }
        while self.exchanges.len() >= self.max_history {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// The last few exchanges flattened for a prompt, oldest first.
    pub fn context(&self) -> String {
        let skip = self.exchanges.len().saturating_sub(self.context_exchanges);
        self.exchanges
            .iter()
            .skip(skip)
            .map(|exchange| format!("Question: {}\nAnswer: {}", exchange.question, exchange.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn history(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(5, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_exchanges_are_evicted() {
        let mut memory = ConversationMemory::default();
        for i in 0..8 {
            memory.add_exchange(&format!("q{}", i), &format!("a{}", i));
        }
        let questions: Vec<String> = memory.history().into_iter().map(|e| e.question).collect();
        assert_eq!(questions, vec!["q3", "q4", "q5", "q6", "q7"]);
    }

    #[test]
    fn context_uses_most_recent_exchanges() {
        let mut memory = ConversationMemory::new(5, 2);
        assert_eq!(memory.context(), "");

        memory.add_exchange("What is Rust?", "A language.");
        memory.add_exchange("Who makes it?", "The community.");
        memory.add_exchange("Is it fast?", "Yes.");
        assert_eq!(
            memory.context(),
            "Question: Who makes it?\nAnswer: The community.\nQuestion: Is it fast?\nAnswer: Yes."
        );
    }

    #[test]
    fn clear_empties_history() {
        let mut memory = ConversationMemory::default();
        memory.add_exchange("q", "a");
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.context(), "");
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut memory = ConversationMemory::new(0, 3);
        memory.add_exchange("q", "a");
        assert!(memory.is_empty());
    }
}
