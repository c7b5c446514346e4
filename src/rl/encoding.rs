// src/rl/encoding.rs
//! Discretization of raw application inputs into the lookup keys used by the
//! follow-up scheduler (states) and the style bandit (contexts).
//!
//! Every function here is pure. Keys are structured and hashed directly; the
//! canonical string forms (`3-5_startup_True`, `recruiter_casual_False`) only
//! appear in persisted snapshots.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn bool_key(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn parse_bool_key(s: &str) -> Result<bool> {
    match s {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        other => bail!("Invalid connection flag '{}' in key", other),
    }
}

// ============================================================
// SCHEDULER STATE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayBucket {
    #[serde(rename = "0-2")]
    ZeroToTwo,
    #[serde(rename = "3-5")]
    ThreeToFive,
    #[serde(rename = "6-10")]
    SixToTen,
    #[serde(rename = "11+")]
    ElevenPlus,
}

impl DayBucket {
    pub fn from_days(days_since_applied: u32) -> Self {
        match days_since_applied {
            0..=2 => DayBucket::ZeroToTwo,
            3..=5 => DayBucket::ThreeToFive,
            6..=10 => DayBucket::SixToTen,
            _ => DayBucket::ElevenPlus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayBucket::ZeroToTwo => "0-2",
            DayBucket::ThreeToFive => "3-5",
            DayBucket::SixToTen => "6-10",
            DayBucket::ElevenPlus => "11+",
        }
    }
}

impl FromStr for DayBucket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0-2" => Ok(DayBucket::ZeroToTwo),
            "3-5" => Ok(DayBucket::ThreeToFive),
            "6-10" => Ok(DayBucket::SixToTen),
            "11+" => Ok(DayBucket::ElevenPlus),
            other => bail!("Unknown day bucket '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyType {
    Startup,
    Midsize,
    Enterprise,
}

impl CompanyType {
    pub const ALL: [CompanyType; 3] = [
        CompanyType::Startup,
        CompanyType::Midsize,
        CompanyType::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyType::Startup => "startup",
            CompanyType::Midsize => "midsize",
            CompanyType::Enterprise => "enterprise",
        }
    }
}

impl FromStr for CompanyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "startup" => Ok(CompanyType::Startup),
            "midsize" => Ok(CompanyType::Midsize),
            "enterprise" => Ok(CompanyType::Enterprise),
            other => bail!("Unknown company type '{}'", other),
        }
    }
}

/// Raw scheduler input as supplied by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpState {
    pub days_since_applied: u32,
    pub company_type: CompanyType,
    pub has_connection: bool,
}

impl FollowUpState {
    pub fn new(days_since_applied: u32, company_type: CompanyType, has_connection: bool) -> Self {
        Self {
            days_since_applied,
            company_type,
            has_connection,
        }
    }

    pub fn key(&self) -> StateKey {
        StateKey::encode(self.days_since_applied, self.company_type, self.has_connection)
    }
}

/// Discretized scheduler state. Two states with the same bucket, company type
/// and connection flag are the same row of the value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub day_bucket: DayBucket,
    pub company_type: CompanyType,
    pub has_connection: bool,
}

impl StateKey {
    pub fn encode(days_since_applied: u32, company_type: CompanyType, has_connection: bool) -> Self {
        Self {
            day_bucket: DayBucket::from_days(days_since_applied),
            company_type,
            has_connection,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.day_bucket.as_str(),
            self.company_type.as_str(),
            bool_key(self.has_connection)
        )
    }
}

impl FromStr for StateKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '_');
        let (Some(bucket), Some(company), Some(connection)) =
            (parts.next(), parts.next(), parts.next())
        else {
            bail!("Malformed state key '{}'", s);
        };
        Ok(Self {
            day_bucket: bucket.parse()?,
            company_type: company.parse()?,
            has_connection: parse_bool_key(connection)?,
        })
    }
}

// ============================================================
// SCHEDULER ACTIONS
// ============================================================

/// How long to wait before following up. The set is fixed and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FollowUpAction {
    #[serde(rename = "wait_1d")]
    Wait1d,
    #[serde(rename = "wait_3d")]
    Wait3d,
    #[serde(rename = "wait_5d")]
    Wait5d,
    #[serde(rename = "wait_7d")]
    Wait7d,
    #[serde(rename = "wait_10d")]
    Wait10d,
    #[serde(rename = "wait_14d")]
    Wait14d,
}

impl FollowUpAction {
    pub const COUNT: usize = 6;

    pub const ALL: [FollowUpAction; Self::COUNT] = [
        FollowUpAction::Wait1d,
        FollowUpAction::Wait3d,
        FollowUpAction::Wait5d,
        FollowUpAction::Wait7d,
        FollowUpAction::Wait10d,
        FollowUpAction::Wait14d,
    ];

    pub fn wait_days(&self) -> u32 {
        match self {
            FollowUpAction::Wait1d => 1,
            FollowUpAction::Wait3d => 3,
            FollowUpAction::Wait5d => 5,
            FollowUpAction::Wait7d => 7,
            FollowUpAction::Wait10d => 10,
            FollowUpAction::Wait14d => 14,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpAction::Wait1d => "wait_1d",
            FollowUpAction::Wait3d => "wait_3d",
            FollowUpAction::Wait5d => "wait_5d",
            FollowUpAction::Wait7d => "wait_7d",
            FollowUpAction::Wait10d => "wait_10d",
            FollowUpAction::Wait14d => "wait_14d",
        }
    }

    /// Position in the fixed action order, used to index value-table rows.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_wait_days(days: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.wait_days() == days)
    }
}

impl fmt::Display for FollowUpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FollowUpAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown follow-up action '{}'", s))
    }
}

// ============================================================
// BANDIT CONTEXT
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleCategory {
    Recruiter,
    Executive,
    Director,
    Manager,
}

/// Keyword groups checked in order; the first group with a substring hit wins.
/// A title such as "VP of Talent Acquisition" matches both the recruiter and
/// the executive group and is classified as a recruiter.
pub const TITLE_KEYWORD_GROUPS: &[(TitleCategory, &[&str])] = &[
    (TitleCategory::Recruiter, &["recruit", "talent", "hr"]),
    (
        TitleCategory::Executive,
        &["vp", "vice president", "chief", "head"],
    ),
    (TitleCategory::Director, &["director", "lead"]),
];

impl TitleCategory {
    pub fn classify(contact_title: &str) -> Self {
        let title = contact_title.to_lowercase();
        TITLE_KEYWORD_GROUPS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| title.contains(kw)))
            .map(|(category, _)| *category)
            .unwrap_or(TitleCategory::Manager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TitleCategory::Recruiter => "recruiter",
            TitleCategory::Executive => "executive",
            TitleCategory::Director => "director",
            TitleCategory::Manager => "manager",
        }
    }
}

impl FromStr for TitleCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "recruiter" => Ok(TitleCategory::Recruiter),
            "executive" => Ok(TitleCategory::Executive),
            "director" => Ok(TitleCategory::Director),
            "manager" => Ok(TitleCategory::Manager),
            other => bail!("Unknown title category '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyCulture {
    Casual,
    Formal,
    Mixed,
}

impl CompanyCulture {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyCulture::Casual => "casual",
            CompanyCulture::Formal => "formal",
            CompanyCulture::Mixed => "mixed",
        }
    }
}

impl FromStr for CompanyCulture {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "casual" => Ok(CompanyCulture::Casual),
            "formal" => Ok(CompanyCulture::Formal),
            "mixed" => Ok(CompanyCulture::Mixed),
            other => bail!("Unknown company culture '{}'", other),
        }
    }
}

/// Raw bandit input: the contact's free-text title plus company culture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub contact_title: String,
    pub company_culture: CompanyCulture,
    pub has_connection: bool,
}

impl MessageContext {
    pub fn new(contact_title: &str, company_culture: CompanyCulture, has_connection: bool) -> Self {
        Self {
            contact_title: contact_title.to_string(),
            company_culture,
            has_connection,
        }
    }

    pub fn key(&self) -> ContextKey {
        ContextKey::encode(&self.contact_title, self.company_culture, self.has_connection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey {
    pub title_category: TitleCategory,
    pub company_culture: CompanyCulture,
    pub has_connection: bool,
}

impl ContextKey {
    pub fn encode(contact_title: &str, company_culture: CompanyCulture, has_connection: bool) -> Self {
        Self {
            title_category: TitleCategory::classify(contact_title),
            company_culture,
            has_connection,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.title_category.as_str(),
            self.company_culture.as_str(),
            bool_key(self.has_connection)
        )
    }
}

impl FromStr for ContextKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '_');
        let (Some(category), Some(culture), Some(connection)) =
            (parts.next(), parts.next(), parts.next())
        else {
            bail!("Malformed context key '{}'", s);
        };
        Ok(Self {
            title_category: category.parse()?,
            company_culture: culture.parse()?,
            has_connection: parse_bool_key(connection)?,
        })
    }
}

// ============================================================
// BANDIT ARMS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStyle {
    Formal,
    Casual,
    ConnectionFocused,
}

impl MessageStyle {
    pub const COUNT: usize = 3;

    pub const ALL: [MessageStyle; Self::COUNT] = [
        MessageStyle::Formal,
        MessageStyle::Casual,
        MessageStyle::ConnectionFocused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStyle::Formal => "formal",
            MessageStyle::Casual => "casual",
            MessageStyle::ConnectionFocused => "connection_focused",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for MessageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown message style '{}'", s))
    }
}
