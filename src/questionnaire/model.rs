//! Questionnaire data model: typed question keys, answer values, and
//! contact details.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Number of pages in the questionnaire.
pub const TOTAL_STEPS: u8 = 4;

/// The page that collects contact details rather than answers.
pub const CONTACT_STEP: u8 = 4;

/// Short name of a step, used in logs and status payloads.
pub fn step_name(step: u8) -> &'static str {
    match step {
        1 => "professional",
        2 => "personal",
        3 => "value_add",
        CONTACT_STEP => "contact",
        _ => "unknown",
    }
}

macro_rules! questions {
    ($( $step:literal => { $( $variant:ident = $key:literal ),+ $(,)? } )+) => {
        /// Every question the funnel asks, keyed by its wire name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum Question {
            $($( #[serde(rename = $key)] $variant, )+)+
        }

        impl Question {
            /// All questions in page order.
            pub const ALL: &'static [Question] = &[$($( Question::$variant, )+)+];

            /// The wire key, e.g. `"yearsExperience"`.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($( Self::$variant => $key, )+)+
                }
            }

            /// The step that introduces this question.
            pub fn step(&self) -> u8 {
                match self {
                    $($( Self::$variant => $step, )+)+
                }
            }
        }
    };
}

questions! {
    1 => {
        YearsExperience = "yearsExperience",
        ProgrammingLanguages = "programmingLanguages",
        AiExperience = "aiExperience",
        PreferredLearningMethod = "preferredLearningMethod",
        ProjectGoals = "projectGoals",
        EducationLevel = "educationLevel",
        SoftwareDevelopmentRoles = "softwareDevelopmentRoles",
        CompanySize = "companySize",
        IndustryExperience = "industryExperience",
        DataScience = "dataScience",
        Frameworks = "frameworks",
        CloudPlatforms = "cloudPlatforms",
        AiModelsUsed = "aiModelsUsed",
    }
    2 => {
        Motivations = "motivations",
        WorkStyle = "workStyle",
        LearningChallenges = "learningChallenges",
        TimeCommitment = "timeCommitment",
        Strengths = "strengths",
        LearningEnvironment = "learningEnvironment",
        LearningGoals = "learningGoals",
        PreviousAiCourses = "previousAiCourses",
        CareerAspirations = "careerAspirations",
        LearningObstacles = "learningObstacles",
        CommunicationPreference = "communicationPreference",
        FeedbackPreference = "feedbackPreference",
    }
    3 => {
        IndustryInterests = "industryInterests",
        AiEthics = "aiEthics",
        FuturePlans = "futurePlans",
        ContactEmail = "contactEmail",
        ReceiveUpdates = "receiveUpdates",
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when an answer payload names a question that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown question key: {0}")]
pub struct UnknownQuestion(pub String);

impl std::str::FromStr for Question {
    type Err = UnknownQuestion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Question::ALL
            .iter()
            .copied()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| UnknownQuestion(s.to_string()))
    }
}

/// A single answer: free text / single choice, a multi-select, or a checkbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(BTreeSet<String>),
    Flag(bool),
}

impl AnswerValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn choices<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choices(items.into_iter().map(Into::into).collect())
    }

    /// Whether the answer carries no information (empty text or no choices).
    ///
    /// An unchecked box is still an answer.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Choices(set) => set.is_empty(),
            Self::Flag(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Contact details gathered on the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_contact_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    pub agree_to_terms: bool,
    pub wants_updates: bool,
}

impl ContactInfo {
    /// Email, trimmed, if one was entered.
    pub fn email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    /// Phone, trimmed, if one was entered.
    pub fn phone(&self) -> Option<&str> {
        non_blank(self.phone.as_deref())
    }

    pub fn full_name(&self) -> Option<&str> {
        non_blank(self.full_name.as_deref())
    }

    /// Whether the visitor has left any way to reach them.
    pub fn has_contact_method(&self) -> bool {
        self.email().is_some() || self.phone().is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
