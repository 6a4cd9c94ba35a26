//! The visitor's answers, merged page by page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::{AnswerValue, Question, UnknownQuestion};

/// Why an untyped answer payload could not be accepted.
#[derive(Debug, thiserror::Error)]
pub enum AnswerParseError {
    #[error("Answers must be a JSON object")]
    NotAnObject,

    #[error(transparent)]
    UnknownQuestion(#[from] UnknownQuestion),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Mapping of question to answer. Insertion order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<Question, AnswerValue>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an untyped JSON object, rejecting keys that are not questions.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, AnswerParseError> {
        let obj = value.as_object().ok_or(AnswerParseError::NotAnObject)?;
        let mut answers = Self::new();
        for (key, raw) in obj {
            let question: Question = key.parse()?;
            let value: AnswerValue =
                serde_json::from_value(raw.clone()).map_err(|e| AnswerParseError::InvalidValue {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            answers.insert(question, value);
        }
        Ok(answers)
    }

    pub fn insert(&mut self, question: Question, value: AnswerValue) -> Option<AnswerValue> {
        self.0.insert(question, value)
    }

    /// Builder-style insert, handy when assembling a page's answers.
    pub fn with(mut self, question: Question, value: AnswerValue) -> Self {
        self.insert(question, value);
        self
    }

    pub fn get(&self, question: Question) -> Option<&AnswerValue> {
        self.0.get(&question)
    }

    /// Whether the question has an answer that carries information.
    pub fn is_answered(&self, question: Question) -> bool {
        self.get(question).is_some_and(|v| !v.is_blank())
    }

    /// Shallow last-write-wins merge: keys in `partial` overwrite, others stay.
    pub fn merge(&mut self, partial: Answers) {
        self.0.extend(partial.0);
    }

    /// The subset of answers introduced by `step`.
    pub fn for_step(&self, step: u8) -> Answers {
        Answers(
            self.0
                .iter()
                .filter(|(q, _)| q.step() == step)
                .map(|(q, v)| (*q, v.clone()))
                .collect(),
        )
    }

    pub fn keys(&self) -> impl Iterator<Item = Question> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Question, AnswerValue)> for Answers {
    fn from_iter<I: IntoIterator<Item = (Question, AnswerValue)>>(iter: I) -> Self {
        Answers(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_adds_overwrites_and_keeps() {
        let mut answers = Answers::new()
            .with(Question::YearsExperience, AnswerValue::text("1-3"))
            .with(Question::Frameworks, AnswerValue::text("axum"));

        answers.merge(
            Answers::new()
                .with(Question::YearsExperience, AnswerValue::text("3-5"))
                .with(Question::Motivations, AnswerValue::text("career")),
        );

        assert_eq!(answers.len(), 3);
        assert_eq!(answers.get(Question::YearsExperience), Some(&AnswerValue::text("3-5")));
        assert_eq!(answers.get(Question::Frameworks), Some(&AnswerValue::text("axum")));
        assert_eq!(answers.get(Question::Motivations), Some(&AnswerValue::text("career")));
    }

    #[test]
    fn last_write_wins_regardless_of_step_order() {
        let writes = [
            (2, Question::Motivations, "career"),
            (1, Question::YearsExperience, "0-1"),
            (2, Question::Motivations, "curiosity"),
            (1, Question::YearsExperience, "10+"),
        ];

        let mut answers = Answers::new();
        for (_, question, value) in writes {
            answers.merge(Answers::new().with(question, AnswerValue::text(value)));
        }

        assert_eq!(answers.get(Question::Motivations), Some(&AnswerValue::text("curiosity")));
        assert_eq!(answers.get(Question::YearsExperience), Some(&AnswerValue::text("10+")));
    }

    #[test]
    fn for_step_filters_by_owning_step() {
        let answers = Answers::new()
            .with(Question::YearsExperience, AnswerValue::text("3-5"))
            .with(Question::Strengths, AnswerValue::choices(["focus"]))
            .with(Question::ReceiveUpdates, AnswerValue::Flag(true));

        let step2 = answers.for_step(2);
        assert_eq!(step2.len(), 1);
        assert!(step2.is_answered(Question::Strengths));
        assert!(answers.for_step(4).is_empty());
    }

    #[test]
    fn from_json_accepts_known_keys() {
        let answers = Answers::from_json(&json!({
            "yearsExperience": "3-5",
            "cloudPlatforms": ["aws", "azure"],
            "receiveUpdates": true
        }))
        .unwrap();

        assert_eq!(answers.len(), 3);
        assert_eq!(
            answers.get(Question::CloudPlatforms),
            Some(&AnswerValue::choices(["aws", "azure"]))
        );
    }

    #[test]
    fn from_json_rejects_typos_and_bad_shapes() {
        let err = Answers::from_json(&json!({"yearsExperiance": "3-5"})).unwrap_err();
        assert!(matches!(err, AnswerParseError::UnknownQuestion(_)));

        let err = Answers::from_json(&json!({"yearsExperience": 5})).unwrap_err();
        assert!(matches!(err, AnswerParseError::InvalidValue { .. }));

        let err = Answers::from_json(&json!(["yearsExperience"])).unwrap_err();
        assert!(matches!(err, AnswerParseError::NotAnObject));
    }

    #[test]
    fn serializes_as_plain_object() {
        let answers = Answers::new().with(Question::YearsExperience, AnswerValue::text("3-5"));
        let json = serde_json::to_value(&answers).unwrap();
        assert_eq!(json, json!({"yearsExperience": "3-5"}));

        let parsed: Answers = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, answers);
    }
}
