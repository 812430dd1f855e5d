//! Client for the Open Trivia Database (<https://opentdb.com>).

use rand::Rng;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::quiz::shuffle::shuffled_question;
use crate::quiz::{Category, CategoryChoice, Difficulty, Question};

pub const DEFAULT_BASE_URL: &str = "https://opentdb.com";

/// Incorrect answers every multiple-choice record carries.
const INCORRECT_ANSWERS: usize = 3;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("trivia service rate limit reached")]
    RateLimited,

    #[error("trivia service answered with code {0}")]
    Api(u8),
}

#[derive(Debug, Deserialize)]
struct CategoriesPayload {
    trivia_categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct QuestionsPayload {
    #[serde(default)]
    response_code: u8,
    #[serde(default)]
    results: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    correct_answer: String,
    incorrect_answers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OpenTdb {
    client: reqwest::Client,
    base_url: Url,
}

impl OpenTdb {
    pub fn new(base_url: Url) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trivia-tgbot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub async fn fetch_categories(&self) -> Result<Vec<Category>, SourceError> {
        let url = self.endpoint("api_category.php");
        log::debug!("Fetching categories from {}", url);

        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_categories(&body)
    }

    /// Fetches up to `amount` multiple-choice questions. An empty list means
    /// nothing matched the filters.
    pub async fn fetch_questions(
        &self,
        category: &CategoryChoice,
        difficulty: Difficulty,
        amount: u32,
    ) -> Result<Vec<Question>, SourceError> {
        let url = self.endpoint("api.php");
        let query = question_query(category, difficulty, amount);
        log::debug!("Fetching questions from {} with {:?}", url, query);

        let body = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_questions(&body, &mut rand::thread_rng())
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map(|mut segments| {
                segments.pop_if_empty().push(path);
            })
            .ok();
        url
    }
}

pub fn question_query(
    category: &CategoryChoice,
    difficulty: Difficulty,
    amount: u32,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("amount", amount.to_string()),
        ("type", "multiple".to_string()),
    ];
    if let Some(id) = category.id() {
        query.push(("category", id.to_string()));
    }
    if let Some(difficulty) = difficulty.as_query() {
        query.push(("difficulty", difficulty.to_string()));
    }
    query
}

pub fn parse_categories(body: &str) -> Result<Vec<Category>, SourceError> {
    let payload: CategoriesPayload = serde_json::from_str(body)?;
    Ok(payload
        .trivia_categories
        .into_iter()
        .map(|category| Category {
            id: category.id,
            name: decode(&category.name),
        })
        .collect())
}

pub fn parse_questions<R: Rng + ?Sized>(
    body: &str,
    rng: &mut R,
) -> Result<Vec<Question>, SourceError> {
    let payload: QuestionsPayload = serde_json::from_str(body)?;
    match payload.response_code {
        0 | 1 => {}
        5 => return Err(SourceError::RateLimited),
        code => return Err(SourceError::Api(code)),
    }

    Ok(payload
        .results
        .into_iter()
        .filter_map(|raw| {
            if raw.incorrect_answers.len() != INCORRECT_ANSWERS {
                log::warn!(
                    "Skipping question with {} incorrect answers: {:?}",
                    raw.incorrect_answers.len(),
                    raw.question
                );
                return None;
            }
            Some(shuffled_question(
                decode(&raw.question),
                decode(&raw.correct_answer),
                raw.incorrect_answers.iter().map(|a| decode(a)).collect(),
                rng,
            ))
        })
        .collect())
}

fn decode(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
