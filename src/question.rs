//! Questions and the question bank provider
//!
//! Questions are owned by an external provider and copied into the session
//! when shown. The host loads the bank, drops malformed entries, filters by
//! the configured category and difficulty and picks the questions it will
//! ask.

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{config::GameConfig, constants};

/// How hard a question is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    /// Warm-up questions
    Easy,
    /// Regular questions
    Medium,
    /// Questions for the experts
    Hard,
}

/// A single answer option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// The text shown on the answer button
    #[garde(length(max = constants::question::MAX_ANSWER_LENGTH))]
    pub text: String,
    /// Whether this option is the correct one
    #[garde(skip)]
    pub is_correct: bool,
}

impl Answer {
    /// Creates an answer option
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            text: text.into(),
            is_correct,
        }
    }
}

type ValidationResult = garde::Result;

/// Checks that exactly one answer is marked correct
#[allow(clippy::ptr_arg)]
fn validate_single_correct(answers: &Vec<Answer>, _ctx: &()) -> ValidationResult {
    match answers.iter().filter(|a| a.is_correct).count() {
        1 => Ok(()),
        n => Err(garde::Error::new(format!(
            "expected exactly one correct answer, found {n}"
        ))),
    }
}

/// An immutable multiple choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Provider-assigned identifier
    #[garde(skip)]
    pub id: String,
    /// The question text
    #[garde(length(min = 1, max = constants::question::MAX_PROMPT_LENGTH))]
    pub prompt: String,
    /// Category used for filtering
    #[garde(skip)]
    pub category: String,
    /// Difficulty used for filtering
    #[garde(skip)]
    pub difficulty: Difficulty,
    /// The answer options in display order
    #[garde(
        length(min = constants::question::MIN_ANSWER_COUNT, max = constants::question::MAX_ANSWER_COUNT),
        custom(validate_single_correct),
        dive
    )]
    pub answers: Vec<Answer>,
}

impl Question {
    /// Index of the correct answer option
    pub fn correct_index(&self) -> Option<usize> {
        self.answers.iter().position(|a| a.is_correct)
    }

    /// Whether this question passes the configured category and difficulty filters
    pub fn matches(&self, config: &GameConfig) -> bool {
        let category_matches = config
            .category
            .as_deref()
            .is_none_or(|c| c.eq_ignore_ascii_case(&self.category));
        let difficulty_matches = config.difficulty.is_none_or(|d| d == self.difficulty);
        category_matches && difficulty_matches
    }
}

/// Errors reported while loading a question bank
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The provider could not be reached
    #[error("question bank unavailable: {0}")]
    Unavailable(String),
    /// The provider returned data that could not be understood
    #[error("question bank malformed: {0}")]
    Malformed(String),
    /// No usable question matched the configuration
    #[error("no questions available")]
    Empty,
}

/// External provider of questions
pub trait QuestionBank {
    /// Loads the ordered question list
    ///
    /// # Errors
    ///
    /// Returns a `LoadError` if the bank is unavailable or malformed.
    fn load(&self) -> Result<Vec<Question>, LoadError>;
}

/// A bank backed by an in-memory list
#[derive(Debug, Clone, Default)]
pub struct StaticBank(pub Vec<Question>);

impl QuestionBank for StaticBank {
    fn load(&self) -> Result<Vec<Question>, LoadError> {
        Ok(self.0.clone())
    }
}

/// A bank backed by a JSON document holding an array of questions
#[derive(Debug, Clone)]
pub struct JsonBank {
    source: String,
}

impl JsonBank {
    /// Wraps a JSON document
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl QuestionBank for JsonBank {
    fn load(&self) -> Result<Vec<Question>, LoadError> {
        serde_json::from_str(&self.source).map_err(|e| LoadError::Malformed(e.to_string()))
    }
}

/// Picks the questions a session will ask from a loaded bank
///
/// Malformed questions are dropped, the rest are filtered by the configured
/// category and difficulty, optionally shuffled, and truncated to the
/// configured count.
///
/// # Errors
///
/// Returns `LoadError::Empty` if nothing usable remains.
pub fn select(
    questions: Vec<Question>,
    config: &GameConfig,
    shuffle: Option<&mut fastrand::Rng>,
) -> Result<Vec<Question>, LoadError> {
    let mut usable = questions
        .into_iter()
        .filter(|q| match q.validate() {
            Ok(()) => true,
            Err(report) => {
                warn!(question = %q.id, %report, "dropping malformed question");
                false
            }
        })
        .filter(|q| q.matches(config))
        .collect_vec();

    if let Some(rng) = shuffle {
        rng.shuffle(&mut usable);
    }

    usable.truncate(config.number_of_questions);

    if usable.is_empty() {
        Err(LoadError::Empty)
    } else {
        Ok(usable)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_question(id: &str, correct: usize) -> Question {
        Question {
            id: id.to_owned(),
            prompt: format!("Question {id}?"),
            category: "general".to_owned(),
            difficulty: Difficulty::Easy,
            answers: (0..4)
                .map(|i| Answer::new(format!("Option {i}"), i == correct))
                .collect(),
        }
    }

    #[test]
    fn test_question_validation() {
        assert!(sample_question("q1", 0).validate().is_ok());
    }

    #[test]
    fn test_question_requires_single_correct_answer() {
        let mut question = sample_question("q1", 0);
        question.answers[1].is_correct = true;
        assert!(question.validate().is_err());

        question.answers.iter_mut().for_each(|a| a.is_correct = false);
        assert!(question.validate().is_err());
    }

    #[test]
    fn test_question_answer_count_bounds() {
        let mut question = sample_question("q1", 0);
        question.answers.truncate(1);
        assert!(question.validate().is_err());

        let mut question = sample_question("q1", 0);
        question.answers.push(Answer::new("Extra", false));
        assert!(question.validate().is_err());
    }

    #[test]
    fn test_correct_index() {
        assert_eq!(sample_question("q", 2).correct_index(), Some(2));
    }

    #[test]
    fn test_select_filters_and_truncates() {
        let mut hard = sample_question("hard", 1);
        hard.difficulty = Difficulty::Hard;
        let mut history = sample_question("history", 1);
        history.category = "History".to_owned();
        let questions = vec![
            sample_question("a", 0),
            hard,
            history,
            sample_question("b", 3),
        ];

        let config = GameConfig {
            number_of_questions: 1,
            difficulty: Some(Difficulty::Easy),
            ..GameConfig::default()
        };
        let picked = select(questions.clone(), &config, None).unwrap();
        assert_eq!(picked.iter().map(|q| q.id.as_str()).collect_vec(), ["a"]);

        let config = GameConfig {
            category: Some("history".into()),
            ..GameConfig::default()
        };
        let picked = select(questions, &config, None).unwrap();
        assert_eq!(picked.iter().map(|q| q.id.as_str()).collect_vec(), ["history"]);
    }

    #[test]
    fn test_select_drops_malformed_questions() {
        let mut broken = sample_question("broken", 0);
        broken.answers.clear();
        let picked = select(
            vec![broken, sample_question("ok", 0)],
            &GameConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "ok");
    }

    #[test]
    fn test_select_empty_bank() {
        assert_eq!(
            select(Vec::new(), &GameConfig::default(), None),
            Err(LoadError::Empty)
        );
    }

    #[test]
    fn test_select_shuffle_keeps_all_questions() {
        let questions = (0..10)
            .map(|i| sample_question(&i.to_string(), 0))
            .collect_vec();
        let mut rng = fastrand::Rng::with_seed(7);
        let picked = select(questions, &GameConfig::default(), Some(&mut rng)).unwrap();
        assert_eq!(picked.len(), 10);
        assert_eq!(
            picked.iter().map(|q| q.id.clone()).sorted().collect_vec(),
            (0..10).map(|i| i.to_string()).sorted().collect_vec()
        );
    }

    #[test]
    fn test_json_bank() {
        let json = serde_json::to_string(&vec![sample_question("q1", 1)]).unwrap();
        let loaded = JsonBank::new(json).load().unwrap();
        assert_eq!(loaded[0].correct_index(), Some(1));

        assert!(matches!(
            JsonBank::new("{not json").load(),
            Err(LoadError::Malformed(_))
        ));
    }
}
