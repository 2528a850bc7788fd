//! Core data models for the filing agent

use crate::error::AgentError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Year =================
//

const MIN_YEAR: u16 = 1900;
const MAX_YEAR: u16 = 2100;

/// Fiscal year of a filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Year(u16);

impl Year {
    pub fn new(value: u16) -> Result<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&value) {
            return Err(AgentError::InvalidConfig(format!(
                "year {} outside {}..={}",
                value, MIN_YEAR, MAX_YEAR
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Year {
    type Error = AgentError;

    fn try_from(value: u16) -> Result<Self> {
        Year::new(value)
    }
}

impl From<Year> for u16 {
    fn from(year: Year) -> u16 {
        year.0
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ================= YearMap =================
//

/// Association from year to a per-year entity, kept in insertion order.
///
/// Lookups of a year that was never inserted fail with
/// [`AgentError::UnknownYear`] instead of returning `None`.
#[derive(Debug, Clone)]
pub struct YearMap<T> {
    entries: Vec<(Year, T)>,
}

impl<T> YearMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace the entry for `year`. Replacing keeps the original position.
    pub fn insert(&mut self, year: Year, value: T) {
        match self.entries.iter_mut().find(|(y, _)| *y == year) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((year, value)),
        }
    }

    pub fn get(&self, year: Year) -> Result<&T> {
        self.entries
            .iter()
            .find(|(y, _)| *y == year)
            .map(|(_, v)| v)
            .ok_or(AgentError::UnknownYear(year))
    }

    pub fn remove(&mut self, year: Year) -> Option<T> {
        let pos = self.entries.iter().position(|(y, _)| *y == year)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains(&self, year: Year) -> bool {
        self.entries.iter().any(|(y, _)| *y == year)
    }

    pub fn years(&self) -> Vec<Year> {
        self.entries.iter().map(|(y, _)| *y).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, &T)> {
        self.entries.iter().map(|(y, v)| (*y, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for YearMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(Year, T)> for YearMap<T> {
    fn from_iter<I: IntoIterator<Item = (Year, T)>>(iter: I) -> Self {
        let mut map = YearMap::new();
        for (year, value) in iter {
            map.insert(year, value);
        }
        map
    }
}

impl<T> IntoIterator for YearMap<T> {
    type Item = (Year, T);
    type IntoIter = std::vec::IntoIter<(Year, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

//
// ================= Documents =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub year: Year,
}

/// Text of one year's filing plus its year tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingDocument {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

//
// ================= Retrieval =================
//

/// A retrieved chunk together with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    pub node_id: String,
    pub year: Year,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub source_nodes: Vec<SourceNode>,
}

//
// ================= Sub-questions =================
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub sub_question: String,
    pub tool_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuestionAnswer {
    pub sub_question: SubQuestion,
    pub answer: String,
    pub execution_time_ms: u64,
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

impl ToolInput {
    pub fn query(tool_name: &str, query: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            parameters: serde_json::json!({ "input": query }),
        }
    }

    /// Natural-language query carried by the input (`input`, falling back to `query`)
    pub fn query_text(&self) -> Result<&str> {
        self.parameters
            .get("input")
            .and_then(|v| v.as_str())
            .or_else(|| self.parameters.get("query").and_then(|v| v.as_str()))
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                AgentError::InvalidToolInput(format!(
                    "Expected non-empty 'input' for tool {}",
                    self.tool_name
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_name: String,
    pub content: String,
    pub source_nodes: Vec<SourceNode>,
}
