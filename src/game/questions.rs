//! Question bank: three fixed difficulty tiers, shuffled once per match start

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ws::protocol::Tier;

/// A single quiz question. Immutable once drawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub answer: String,
    /// Exactly four options, one of which is the answer
    pub options: [String; 4],
}

impl Question {
    fn new(prompt: &str, answer: &str, options: [&str; 4]) -> Self {
        Self {
            prompt: prompt.to_string(),
            answer: answer.to_string(),
            options: options.map(str::to_string),
        }
    }
}

/// Question lists per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    easy: Vec<Question>,
    medium: Vec<Question>,
    hard: Vec<Question>,
}

impl QuestionBank {
    /// Questions for one tier
    pub fn tier(&self, tier: Tier) -> &[Question] {
        match tier {
            Tier::Easy => &self.easy,
            Tier::Medium => &self.medium,
            Tier::Hard => &self.hard,
        }
    }

    /// Fisher-Yates shuffle of each tier's list, independently
    pub fn shuffle_all<R: Rng>(&mut self, rng: &mut R) {
        self.easy.shuffle(rng);
        self.medium.shuffle(rng);
        self.hard.shuffle(rng);
    }

    /// Load a bank from a JSON file, falling back to the built-in bank when
    /// no path is configured
    pub fn load(path: Option<&str>) -> Result<Self, QuestionBankError> {
        let bank = match path {
            Some(path) => Self::from_json_file(Path::new(path))?,
            None => Self::default(),
        };
        bank.validate()?;
        Ok(bank)
    }

    fn from_json_file(path: &Path) -> Result<Self, QuestionBankError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QuestionBankError::Io(path.display().to_string(), e))?;
        serde_json::from_str(&raw).map_err(QuestionBankError::Parse)
    }

    /// Every tier must have at least one question and every question must
    /// include its own answer among the options
    pub fn validate(&self) -> Result<(), QuestionBankError> {
        for tier in [Tier::Easy, Tier::Medium, Tier::Hard] {
            let list = self.tier(tier);
            if list.is_empty() {
                return Err(QuestionBankError::EmptyTier(tier));
            }
            for q in list {
                if !q.options.contains(&q.answer) {
                    return Err(QuestionBankError::AnswerNotInOptions(q.prompt.clone()));
                }
            }
        }
        Ok(())
    }
}

impl Default for QuestionBank {
    fn default() -> Self {
        Self {
            easy: vec![
                Question::new("2 + 2 = ?", "4", ["3", "4", "5", "6"]),
                Question::new("5 - 3 = ?", "2", ["1", "2", "3", "4"]),
                Question::new("10 - 7 = ?", "3", ["2", "3", "4", "5"]),
                Question::new("1 + 1 = ?", "2", ["1", "2", "3", "4"]),
            ],
            medium: vec![
                Question::new(
                    "Which sport is played with a bat?",
                    "Cricket",
                    ["Hockey", "Cricket", "Football", "Tennis"],
                ),
                Question::new(
                    "How many players in a cricket team?",
                    "11",
                    ["9", "10", "11", "12"],
                ),
                Question::new(
                    "What is the capital of France?",
                    "Paris",
                    ["London", "Berlin", "Paris", "Madrid"],
                ),
                Question::new("What is 7 \u{d7} 8?", "56", ["48", "54", "56", "64"]),
                Question::new(
                    "Who won the ICC Cricket World Cup 2011?",
                    "India",
                    ["Australia", "India", "Sri Lanka", "England"],
                ),
            ],
            hard: vec![
                Question::new("What is H2O?", "Water", ["Oxygen", "Hydrogen", "Water", "Helium"]),
                Question::new(
                    "What planet is closest to the sun?",
                    "Mercury",
                    ["Venus", "Earth", "Mars", "Mercury"],
                ),
                Question::new(
                    "Who wrote 'Romeo and Juliet'?",
                    "Shakespeare",
                    ["Dickens", "Shakespeare", "Hemingway", "Austen"],
                ),
                Question::new(
                    "What is the square root of 144?",
                    "12",
                    ["10", "12", "14", "16"],
                ),
                Question::new(
                    "What is the term for 3 wickets in 3 balls?",
                    "Hat-trick",
                    ["Hat-trick", "Century", "Maiden", "Six"],
                ),
                Question::new(
                    "Who is known as the 'Master Blaster'?",
                    "Sachin Tendulkar",
                    ["Virat Kohli", "Ricky Ponting", "Sachin Tendulkar", "AB de Villiers"],
                ),
            ],
        }
    }
}

/// Question bank loading/validation errors
#[derive(Debug, thiserror::Error)]
pub enum QuestionBankError {
    #[error("Failed to read question file {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse question file: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("No questions for tier {0:?}")]
    EmptyTier(Tier),

    #[error("Answer is not among the options for question: {0}")]
    AnswerNotInOptions(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn default_bank_is_valid() {
        QuestionBank::default().validate().unwrap();
    }

    #[test]
    fn shuffle_preserves_questions() {
        let mut bank = QuestionBank::default();
        let mut before: Vec<String> = bank
            .tier(Tier::Medium)
            .iter()
            .map(|q| q.prompt.clone())
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        bank.shuffle_all(&mut rng);

        let mut after: Vec<String> = bank
            .tier(Tier::Medium)
            .iter()
            .map(|q| q.prompt.clone())
            .collect();

        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn validate_rejects_answer_missing_from_options() {
        let mut bank = QuestionBank::default();
        bank.easy[0].answer = "not an option".to_string();
        assert!(matches!(
            bank.validate(),
            Err(QuestionBankError::AnswerNotInOptions(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_tier() {
        let mut bank = QuestionBank::default();
        bank.hard.clear();
        assert!(matches!(
            bank.validate(),
            Err(QuestionBankError::EmptyTier(Tier::Hard))
        ));
    }
}
