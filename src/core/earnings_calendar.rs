//! Earnings reports scheduled from EDGAR filings.

use crate::core::sector::{self, Sector};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Filing that carries quarterly results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportForm {
    /// 8-K furnishing results of operations (Item 2.02).
    EarningsRelease,
    Quarterly,
    Annual,
}

impl ReportForm {
    pub const SEARCH_FORMS: &'static str = "8-K,10-Q,10-K";

    /// 8-Ks count only when they report Item 2.02; other current reports
    /// and amendments are not earnings.
    pub fn from_filing<S: AsRef<str>>(form: &str, items: &[S]) -> Option<Self> {
        match form.trim() {
            "8-K" => items
                .iter()
                .any(|item| item.as_ref().trim() == "2.02")
                .then_some(ReportForm::EarningsRelease),
            "10-Q" => Some(ReportForm::Quarterly),
            "10-K" => Some(ReportForm::Annual),
            _ => None,
        }
    }

    pub fn form(&self) -> &'static str {
        match self {
            ReportForm::EarningsRelease => "8-K",
            ReportForm::Quarterly => "10-Q",
            ReportForm::Annual => "10-K",
        }
    }
}

impl Display for ReportForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReportForm::EarningsRelease => "8-K 2.02",
            other => other.form(),
        })
    }
}

/// When a report reached EDGAR relative to the regular US session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportTiming {
    BeforeOpen,
    DuringMarket,
    AfterClose,
    Unknown,
}

impl ReportTiming {
    /// Classifies an Eastern acceptance time against 09:30-16:00.
    pub fn from_acceptance(accepted: Option<NaiveDateTime>) -> Self {
        let Some(accepted) = accepted else {
            return ReportTiming::Unknown;
        };
        let (open, close) = market_hours();
        let time = accepted.time();
        if time < open {
            ReportTiming::BeforeOpen
        } else if time >= close {
            ReportTiming::AfterClose
        } else {
            ReportTiming::DuringMarket
        }
    }
}

fn market_hours() -> (NaiveTime, NaiveTime) {
    (
        NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
        NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
    )
}

impl Display for ReportTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReportTiming::BeforeOpen => "Pre-market",
            ReportTiming::DuringMarket => "Market hours",
            ReportTiming::AfterClose => "Post-market",
            ReportTiming::Unknown => "-",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsReport {
    pub accession: String,
    pub cik: String,
    pub company: String,
    pub ticker: Option<String>,
    pub form: ReportForm,
    pub filed: NaiveDate,
    /// EDGAR acceptance time, Eastern.
    pub accepted: Option<NaiveDateTime>,
    pub period: Option<NaiveDate>,
    pub sic: Option<String>,
}

impl EarningsReport {
    pub fn timing(&self) -> ReportTiming {
        ReportTiming::from_acceptance(self.accepted)
    }

    pub fn sector(&self) -> Option<Sector> {
        sector::sector_of(self.sic.as_deref())
    }
}

#[async_trait]
pub trait EarningsReportSource: Send + Sync {
    /// Reports filed between `from` and `to`, inclusive.
    async fn fetch_reports(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<EarningsReport>>;
}

/// Resolves a sector name or prefix, e.g. `info` or `health`.
pub fn parse_sector(query: &str) -> Result<Sector> {
    let matches: Vec<Sector> = SECTORS.into_iter().filter(|s| s.matches(query)).collect();
    match matches.as_slice() {
        [sector] => Ok(*sector),
        [] => bail!("Unknown sector: {}", query),
        _ => bail!(
            "Ambiguous sector {}: {}",
            query,
            matches.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        ),
    }
}

const SECTORS: [Sector; 11] = [
    Sector::CommunicationServices,
    Sector::ConsumerDiscretionary,
    Sector::ConsumerStaples,
    Sector::Energy,
    Sector::Financials,
    Sector::HealthCare,
    Sector::Industrials,
    Sector::InformationTechnology,
    Sector::Materials,
    Sector::RealEstate,
    Sector::Utilities,
];

/// One row per company and filing date, ordered by date, timing and ticker.
/// A results 8-K and the 10-Q filed the same day collapse into the 8-K.
pub fn schedule(mut reports: Vec<EarningsReport>, sector: Option<Sector>) -> Vec<EarningsReport> {
    reports.retain(|r| sector.is_none_or(|s| r.sector() == Some(s)));
    reports.sort_by(|a, b| {
        (a.filed, &a.cik, a.form, a.accepted).cmp(&(b.filed, &b.cik, b.form, b.accepted))
    });
    reports.dedup_by(|later, first| later.filed == first.filed && later.cik == first.cik);
    reports.sort_by(|a, b| {
        (a.filed, a.timing(), &a.ticker, &a.company).cmp(&(b.filed, b.timing(), &b.ticker, &b.company))
    });
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").ok()
    }

    fn report(cik: &str, ticker: &str, form: ReportForm, filed: &str, time: &str, sic: &str) -> EarningsReport {
        EarningsReport {
            accession: format!("{cik}-{filed}-{}", form.form()),
            cik: cik.to_string(),
            company: format!("{ticker} Inc"),
            ticker: Some(ticker.to_string()),
            form,
            filed: filed.parse().unwrap(),
            accepted: at(filed, time),
            period: None,
            sic: Some(sic.to_string()),
        }
    }

    #[test]
    fn test_report_form_from_filing() {
        assert_eq!(
            ReportForm::from_filing("8-K", &["2.02", "9.01"]),
            Some(ReportForm::EarningsRelease)
        );
        assert_eq!(ReportForm::from_filing("8-K", &["5.02"]), None);
        assert_eq!(ReportForm::from_filing::<&str>("8-K", &[]), None);
        assert_eq!(ReportForm::from_filing::<&str>("10-Q", &[]), Some(ReportForm::Quarterly));
        assert_eq!(ReportForm::from_filing::<&str>("10-K", &[]), Some(ReportForm::Annual));
        assert_eq!(ReportForm::from_filing::<&str>("10-K/A", &[]), None);
    }

    #[test]
    fn test_timing_boundaries() {
        let timing = |t: &str| ReportTiming::from_acceptance(at("2024-05-02", t));
        assert_eq!(timing("06:45:00"), ReportTiming::BeforeOpen);
        assert_eq!(timing("09:29:59"), ReportTiming::BeforeOpen);
        assert_eq!(timing("09:30:00"), ReportTiming::DuringMarket);
        assert_eq!(timing("15:59:59"), ReportTiming::DuringMarket);
        assert_eq!(timing("16:00:00"), ReportTiming::AfterClose);
        assert_eq!(timing("17:05:00"), ReportTiming::AfterClose);
        assert_eq!(ReportTiming::from_acceptance(None), ReportTiming::Unknown);
    }

    #[test]
    fn test_schedule_collapses_and_filters() {
        let reports = vec![
            report("2", "SOFT", ReportForm::Quarterly, "2024-05-02", "16:20:00", "7372"),
            report("2", "SOFT", ReportForm::EarningsRelease, "2024-05-02", "16:05:00", "7372"),
            report("1", "BANK", ReportForm::EarningsRelease, "2024-05-02", "07:00:00", "6022"),
            report("3", "CHIP", ReportForm::Annual, "2024-05-01", "12:00:00", "3674"),
        ];

        let all = schedule(reports.clone(), None);
        let rows: Vec<(&str, ReportForm)> = all
            .iter()
            .map(|r| (r.ticker.as_deref().unwrap_or_default(), r.form))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("CHIP", ReportForm::Annual),
                ("BANK", ReportForm::EarningsRelease),
                ("SOFT", ReportForm::EarningsRelease),
            ]
        );
        assert_eq!(all[2].timing(), ReportTiming::AfterClose);

        let tech = schedule(reports, Some(Sector::InformationTechnology));
        assert_eq!(tech.len(), 2);
        assert!(tech.iter().all(|r| r.sector() == Some(Sector::InformationTechnology)));
    }

    #[test]
    fn test_parse_sector() {
        assert_eq!(parse_sector("tech").ok(), None);
        assert_eq!(parse_sector("info").unwrap(), Sector::InformationTechnology);
        assert_eq!(parse_sector("Health Care").unwrap(), Sector::HealthCare);
        let err = parse_sector("consumer").unwrap_err().to_string();
        assert!(err.contains("Consumer Discretionary"));
        assert!(err.contains("Consumer Staples"));
        assert!(parse_sector("crypto").is_err());
    }
}
