// src/model.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Constants ---

/// Planned workload given to a teacher when nothing else is known.
pub const DEFAULT_PLANNED_HOURS: Decimal = dec!(24);

/// Placeholder used when a context component is missing.
pub const MISSING_CONTEXT_LABEL: &str = "N/A";

pub type TeacherId = u64;
pub type SessionId = u64;

// --- Key normalization ---

/// Trims, collapses inner whitespace and case-folds a key component.
pub fn normalize_key_part(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_opt_part(value: Option<&str>) -> Option<String> {
    value.map(normalize_key_part).filter(|v| !v.is_empty())
}

/// Blank strings are stored as absent values.
pub fn clean_field(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// --- Teaching context ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachingContext {
    pub mention: Option<String>,
    pub parcours: Option<String>,
    pub niveau: Option<String>,
    pub ue: Option<String>,
    pub ec: Option<String>,
}

impl TeachingContext {
    pub fn new(mention: &str, parcours: &str, niveau: &str, ue: &str, ec: &str) -> Self {
        Self {
            mention: clean_field(mention),
            parcours: clean_field(parcours),
            niveau: clean_field(niveau),
            ue: clean_field(ue),
            ec: clean_field(ec),
        }
    }

    /// Same context restricted to mention/parcours/niveau.
    pub fn program_only(&self) -> Self {
        Self {
            mention: self.mention.clone(),
            parcours: self.parcours.clone(),
            niveau: self.niveau.clone(),
            ue: None,
            ec: None,
        }
    }

    pub fn triple(&self) -> ContextTriple {
        ContextTriple {
            mention: self.mention.clone(),
            parcours: self.parcours.clone(),
            niveau: self.niveau.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mention.is_none()
            && self.parcours.is_none()
            && self.niveau.is_none()
            && self.ue.is_none()
            && self.ec.is_none()
    }
}

/// The (mention, parcours, niveau) grouping key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTriple {
    pub mention: Option<String>,
    pub parcours: Option<String>,
    pub niveau: Option<String>,
}

impl ContextTriple {
    /// Normalized form used to compare triples coming from different sources.
    pub fn match_key(&self) -> (Option<String>, Option<String>, Option<String>) {
        (
            normalize_opt_part(self.mention.as_deref()),
            normalize_opt_part(self.parcours.as_deref()),
            normalize_opt_part(self.niveau.as_deref()),
        )
    }

    pub fn same_as(&self, other: &ContextTriple) -> bool {
        self.match_key() == other.match_key()
    }

    /// True when no component carries a value once normalized.
    pub fn is_empty(&self) -> bool {
        self.match_key() == (None, None, None)
    }

    /// Display label with a placeholder for every missing component.
    pub fn label(&self) -> String {
        let part = |v: &Option<String>| v.as_deref().unwrap_or(MISSING_CONTEXT_LABEL).to_string();
        format!(
            "{} / {} / {}",
            part(&self.mention),
            part(&self.parcours),
            part(&self.niveau)
        )
    }
}

impl fmt::Display for ContextTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// --- Identity ---

/// Normalized (name, mention, parcours, niveau, ue, ec) tuple identifying a
/// teacher record for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    name: String,
    context: [Option<String>; 5],
}

impl IdentityKey {
    pub fn new(name: &str, context: &TeachingContext) -> Self {
        Self {
            name: normalize_key_part(name),
            context: [
                normalize_opt_part(context.mention.as_deref()),
                normalize_opt_part(context.parcours.as_deref()),
                normalize_opt_part(context.niveau.as_deref()),
                normalize_opt_part(context.ue.as_deref()),
                normalize_opt_part(context.ec.as_deref()),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// --- Teacher ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    #[serde(flatten)]
    pub context: TeachingContext,
    pub planned_hours: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Teacher {
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(&self.name, &self.context)
    }

    pub fn name_key(&self) -> String {
        normalize_key_part(&self.name)
    }
}

/// Teacher fields before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub name: String,
    #[serde(flatten)]
    pub context: TeachingContext,
    pub planned_hours: Decimal,
}

impl NewTeacher {
    pub fn new(name: &str, context: TeachingContext, planned_hours: Decimal) -> Self {
        Self {
            name: name.trim().to_string(),
            context,
            planned_hours,
        }
    }
}

// --- Session tags ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionType {
    Normales,
    Suppl,
    Cours,
    Td,
    Tp,
    Et,
    Other(String),
}

impl SessionType {
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "normales" | "normale" => SessionType::Normales,
            "suppl" | "supplementaires" | "supplémentaires" => SessionType::Suppl,
            "cours" | "cm" => SessionType::Cours,
            "td" => SessionType::Td,
            "tp" => SessionType::Tp,
            "et" => SessionType::Et,
            _ => SessionType::Other(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SessionType::Normales => "Normales",
            SessionType::Suppl => "Suppl",
            SessionType::Cours => "Cours",
            SessionType::Td => "TD",
            SessionType::Tp => "TP",
            SessionType::Et => "ET",
            SessionType::Other(label) => label,
        }
    }
}

impl Default for SessionType {
    fn default() -> Self {
        SessionType::Normales
    }
}

impl From<String> for SessionType {
    fn from(value: String) -> Self {
        SessionType::parse(&value)
    }
}

impl From<SessionType> for String {
    fn from(value: SessionType) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryStatus {
    Entered,
    Pending,
    Other(String),
}

impl EntryStatus {
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "saisie" | "entered" => EntryStatus::Entered,
            "non saisie" | "non saisi" | "pending" => EntryStatus::Pending,
            _ => EntryStatus::Other(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EntryStatus::Entered => "Saisie",
            EntryStatus::Pending => "Non saisie",
            EntryStatus::Other(label) => label,
        }
    }
}

impl Default for EntryStatus {
    fn default() -> Self {
        EntryStatus::Entered
    }
}

impl From<String> for EntryStatus {
    fn from(value: String) -> Self {
        EntryStatus::parse(&value)
    }
}

impl From<EntryStatus> for String {
    fn from(value: EntryStatus) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// --- Session ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub session_type: SessionType,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Decimal,
    #[serde(flatten)]
    pub context: TeachingContext,
    pub teacher_id: TeacherId,
    /// Copy of the owner's name taken when the session was recorded.
    pub teacher_name: String,
    pub entry_status: EntryStatus,
}

impl Session {
    /// Duration usable for sums; anything below zero counts as nothing.
    pub fn counted_hours(&self) -> Decimal {
        self.duration.max(Decimal::ZERO)
    }
}

/// Session fields before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_type: SessionType,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Decimal,
    #[serde(flatten)]
    pub context: TeachingContext,
    pub teacher_id: TeacherId,
    pub teacher_name: String,
    pub entry_status: EntryStatus,
}
