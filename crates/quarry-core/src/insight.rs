//! Prompt contract with the analysis service and parsing of its answers.
//!
//! The service is asked for a strict JSON object with three keys:
//! `Generate_SQL`, `Result_in_csv` and `Key_insight`. Responses are relayed
//! verbatim by the backend; clients use [`Insight`] to render them.

use serde::{Deserialize, Serialize};

/// Appended to every user prompt sent for an insight.
pub const INSIGHT_INSTRUCTIONS: &str = " You are a helpful AI assistant for a data analysis \
application. I need you to analyze a dataset based on a user's query and return the results \
in a strict JSON format. The JSON object must contain the following three keys: \
Generate_SQL: A string containing the SQL query that would be used to produce the requested \
data. Result_in_csv: A string containing the data in comma-separated values (CSV) format. The \
first line should be the column headers. Key_insight: (Should be detailed, at least one \
paragraph) A string containing a detailed summary of the key findings from the data returned \
by that particular query or prompt, such as trends or interesting observations. For example: \
JSON { \"Generate_SQL\": \"SELECT category, COUNT(*) FROM sales GROUP BY category;\", \
\"Result_in_csv\": \"category,count\\nElectronics,15000\\nClothing,8000\", \"Key_insight\": \
\"Electronics is the top-performing category by sales volume.\" } Please provide a response \
in this exact format. If you cannot generate one of the fields, return an empty string for \
that field.";

/// Fixed prompt asking for eight suggested questions.
pub const SUGGESTION_PROMPT: &str = "You are a helpful AI assistant for a data analysis \
application. I need you to suggest 8 smart and meaningful questions that I can ask about the \
uploaded database. Your response must be a strict JSON object with exactly one key: \
{ \"Suggested_Questions\": [\"Question 1\",\"Question 2\",\"Question 3\",\"Question 4\",\
\"Question 5\",\"Question 6\",\"Question 7\",\"Question 8\"] } Only return valid JSON. \
Do not include explanations or extra text outside the JSON.";

/// Build the full prompt forwarded for an insight request.
#[must_use]
pub fn insight_prompt(user_prompt: &str) -> String {
    format!("{user_prompt}{INSIGHT_INSTRUCTIONS}")
}

/// The three-field answer shape requested by [`INSIGHT_INSTRUCTIONS`].
///
/// Missing fields deserialize as empty strings, matching the instruction to
/// return an empty string for anything the model could not produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "Generate_SQL", default)]
    pub generate_sql: String,
    #[serde(rename = "Result_in_csv", default)]
    pub result_csv: String,
    #[serde(rename = "Key_insight", default)]
    pub key_insight: String,
}

impl Insight {
    /// Interpret a raw upstream response. Returns `None` if it carries none of
    /// the three keys (e.g. the service's `raw_response` fallback).
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !["Generate_SQL", "Result_in_csv", "Key_insight"]
            .iter()
            .any(|k| obj.contains_key(*k))
        {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    #[must_use]
    pub fn table(&self) -> CsvTable {
        CsvTable::parse(&self.result_csv)
    }

    /// Non-empty lines of `Key_insight`.
    #[must_use]
    pub fn insight_lines(&self) -> Vec<String> {
        self.key_insight
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Columns and rows parsed from an embedded CSV string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parse CSV text: first line is the header, blank lines are skipped.
    /// Double-quoted fields may contain commas and `""` escapes.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut lines = text
            .trim()
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty());

        let Some(header) = lines.next() else {
            return Self::default();
        };
        Self {
            columns: split_record(header),
            rows: lines.map(split_record).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Coarse category of a prompt, used by clients to pick icons and charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Visualization,
    Trend,
    Comparison,
    Prediction,
    Anomaly,
    Segmentation,
    Correlation,
    General,
}

impl AnalysisType {
    /// Keyword match in priority order; the first matching category wins.
    #[must_use]
    pub fn detect(prompt: &str) -> Self {
        const RULES: &[(AnalysisType, &[&str])] = &[
            (
                AnalysisType::Visualization,
                &["visualize", "chart", "graph", "plot"],
            ),
            (
                AnalysisType::Trend,
                &["trend", "over time", "monthly", "yearly"],
            ),
            (AnalysisType::Comparison, &["compare", "vs", "difference"]),
            (AnalysisType::Prediction, &["predict", "forecast", "future"]),
            (AnalysisType::Anomaly, &["anomaly", "outlier", "unusual"]),
            (AnalysisType::Segmentation, &["cluster", "segment", "group"]),
            (
                AnalysisType::Correlation,
                &["correlation", "relationship", "impact"],
            ),
        ];

        let q = prompt.to_lowercase();
        RULES
            .iter()
            .find(|(_, words)| words.iter().any(|w| q.contains(w)))
            .map_or(Self::General, |(kind, _)| *kind)
    }
}
