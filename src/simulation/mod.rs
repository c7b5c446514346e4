// src/simulation/mod.rs
//! Synthetic job search used to evaluate the agents offline.
//!
//! The ground-truth response model (optimal timing windows per company type,
//! preferred styles per contact and culture) is hidden from the agents; they
//! only see whether a follow-up got a response or an interview.

pub mod experiment;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::rl::encoding::{CompanyCulture, CompanyType, MessageStyle, TitleCategory};

pub use experiment::{
    EpisodeRecord, ExperimentResults, ExperimentRunner, ExperimentSummary, TrainedAgents,
};

pub const DEFAULT_SEED: u64 = 42;

const BASE_RESPONSE_RATE: f64 = 0.25;
const MAX_RESPONSE_RATE: f64 = 0.8;
const INTERVIEW_RATE_GIVEN_RESPONSE: f64 = 0.3;
const CONNECTION_BOOST: f64 = 1.3;
const OPTIMAL_TIMING_MULTIPLIER: f64 = 1.5;
const MIN_TIMING_MULTIPLIER: f64 = 0.5;
const CONNECTION_FOCUSED_BOOST: f64 = 1.2;

const COMPANIES: &[(&str, CompanyType, CompanyCulture)] = &[
    ("Google", CompanyType::Enterprise, CompanyCulture::Mixed),
    ("Meta", CompanyType::Enterprise, CompanyCulture::Casual),
    ("Amazon", CompanyType::Enterprise, CompanyCulture::Mixed),
    ("Microsoft", CompanyType::Enterprise, CompanyCulture::Formal),
    ("Apple", CompanyType::Enterprise, CompanyCulture::Formal),
    ("Stripe", CompanyType::Midsize, CompanyCulture::Casual),
    ("Databricks", CompanyType::Midsize, CompanyCulture::Casual),
    ("Snowflake", CompanyType::Midsize, CompanyCulture::Mixed),
    ("Airbnb", CompanyType::Midsize, CompanyCulture::Casual),
    ("Uber", CompanyType::Midsize, CompanyCulture::Mixed),
    ("TechStartup Inc", CompanyType::Startup, CompanyCulture::Casual),
    ("AI Ventures", CompanyType::Startup, CompanyCulture::Casual),
    ("DataFlow Co", CompanyType::Startup, CompanyCulture::Casual),
    ("CloudNine", CompanyType::Startup, CompanyCulture::Casual),
    ("NextGen Analytics", CompanyType::Startup, CompanyCulture::Mixed),
];

const ROLES: &[(&str, Seniority)] = &[
    ("Data Analyst", Seniority::Mid),
    ("Business Intelligence Analyst", Seniority::Mid),
    ("Data Scientist", Seniority::Mid),
    ("Junior Data Analyst", Seniority::Junior),
    ("Senior Data Analyst", Seniority::Senior),
];

const CONTACT_TYPES: &[(TitleCategory, &str)] = &[
    (TitleCategory::Recruiter, "Recruiting Manager"),
    (TitleCategory::Manager, "Hiring Manager"),
    (TitleCategory::Director, "Director of Analytics"),
    (TitleCategory::Executive, "VP of Data"),
];

// Combinations not listed respond at the neutral multiplier of 1.0.
const STYLE_SCORES: &[(TitleCategory, CompanyCulture, MessageStyle, f64)] = &[
    (TitleCategory::Recruiter, CompanyCulture::Casual, MessageStyle::Casual, 1.4),
    (TitleCategory::Recruiter, CompanyCulture::Casual, MessageStyle::ConnectionFocused, 1.5),
    (TitleCategory::Recruiter, CompanyCulture::Formal, MessageStyle::Formal, 1.3),
    (TitleCategory::Recruiter, CompanyCulture::Mixed, MessageStyle::Casual, 1.2),
    (TitleCategory::Manager, CompanyCulture::Casual, MessageStyle::Casual, 1.3),
    (TitleCategory::Manager, CompanyCulture::Formal, MessageStyle::Formal, 1.3),
    (TitleCategory::Manager, CompanyCulture::Mixed, MessageStyle::ConnectionFocused, 1.4),
    (TitleCategory::Director, CompanyCulture::Casual, MessageStyle::Casual, 1.2),
    (TitleCategory::Director, CompanyCulture::Formal, MessageStyle::Formal, 1.4),
    (TitleCategory::Director, CompanyCulture::Mixed, MessageStyle::Formal, 1.3),
    (TitleCategory::Executive, CompanyCulture::Casual, MessageStyle::ConnectionFocused, 1.3),
    (TitleCategory::Executive, CompanyCulture::Formal, MessageStyle::Formal, 1.5),
    (TitleCategory::Executive, CompanyCulture::Mixed, MessageStyle::Formal, 1.4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Seniority {
    Junior,
    Mid,
    Senior,
}

/// Share of applications where the candidate has a connection at the company.
pub fn connection_probability(company_type: CompanyType) -> f64 {
    match company_type {
        CompanyType::Startup => 0.2,
        CompanyType::Midsize => 0.15,
        CompanyType::Enterprise => 0.1,
    }
}

/// Inclusive range of follow-up delays (days) that get the best response.
pub fn optimal_timing_window(company_type: CompanyType, has_connection: bool) -> (u32, u32) {
    let (min, max): (u32, u32) = match company_type {
        CompanyType::Startup => (1, 5),
        CompanyType::Midsize => (3, 7),
        CompanyType::Enterprise => (5, 10),
    };
    if has_connection {
        (min.saturating_sub(2).max(1), max + 3)
    } else {
        (min, max)
    }
}

pub fn timing_multiplier(company_type: CompanyType, days: u32, has_connection: bool) -> f64 {
    let (opt_min, opt_max) = optimal_timing_window(company_type, has_connection);
    if (opt_min..=opt_max).contains(&days) {
        OPTIMAL_TIMING_MULTIPLIER
    } else if days < opt_min {
        let penalty = f64::from(opt_min - days) * 0.1;
        (1.0 - penalty).max(MIN_TIMING_MULTIPLIER)
    } else {
        let penalty = f64::from(days - opt_max) * 0.05;
        (1.0 - penalty).max(MIN_TIMING_MULTIPLIER)
    }
}

pub fn style_multiplier(
    contact_category: TitleCategory,
    culture: CompanyCulture,
    style: MessageStyle,
    has_connection: bool,
) -> f64 {
    let base = STYLE_SCORES
        .iter()
        .find(|(category, c, s, _)| *category == contact_category && *c == culture && *s == style)
        .map(|(_, _, _, score)| *score)
        .unwrap_or(1.0);
    if style == MessageStyle::ConnectionFocused && has_connection {
        base * CONNECTION_FOCUSED_BOOST
    } else {
        base
    }
}

/// Probability that a follow-up sent after `follow_up_days` in `style` gets a reply.
pub fn response_probability(
    app: &SimulatedApplication,
    follow_up_days: u32,
    style: MessageStyle,
) -> f64 {
    let connection_boost = if app.has_connection { CONNECTION_BOOST } else { 1.0 };
    let p = BASE_RESPONSE_RATE
        * timing_multiplier(app.company_type, follow_up_days, app.has_connection)
        * style_multiplier(app.contact_category, app.company_culture, style, app.has_connection)
        * connection_boost;
    p.min(MAX_RESPONSE_RATE)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedApplication {
    pub app_number: usize,
    pub company: &'static str,
    pub role: &'static str,
    pub company_type: CompanyType,
    pub company_culture: CompanyCulture,
    pub seniority: Seniority,
    pub has_connection: bool,
    pub contact_category: TitleCategory,
    pub contact_title: &'static str,
}

/// Generates synthetic applications and samples their outcomes.
pub struct JobSearchSimulator {
    rng: StdRng,
}

impl JobSearchSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate_application(&mut self, app_number: usize) -> SimulatedApplication {
        let (company, company_type, company_culture) = COMPANIES[self.rng.gen_range(0..COMPANIES.len())];
        let (role, seniority) = ROLES[self.rng.gen_range(0..ROLES.len())];
        let has_connection = self.rng.gen::<f64>() < connection_probability(company_type);
        let (contact_category, contact_title) = CONTACT_TYPES[self.rng.gen_range(0..CONTACT_TYPES.len())];

        SimulatedApplication {
            app_number,
            company,
            role,
            company_type,
            company_culture,
            seniority,
            has_connection,
            contact_category,
            contact_title,
        }
    }

    /// Samples `(got_response, got_interview)`. An interview requires a response.
    pub fn simulate_outcome(
        &mut self,
        app: &SimulatedApplication,
        follow_up_days: u32,
        style: MessageStyle,
    ) -> (bool, bool) {
        let p = response_probability(app, follow_up_days, style);
        let got_response = self.rng.gen::<f64>() < p;
        let got_interview = got_response && self.rng.gen::<f64>() < INTERVIEW_RATE_GIVEN_RESPONSE;
        debug!(
            "Simulator: app {} ({}) wait {}d style '{}' -> p={:.3}, response={}, interview={}",
            app.app_number, app.company, follow_up_days, style, p, got_response, got_interview
        );
        (got_response, got_interview)
    }
}

impl Default for JobSearchSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
