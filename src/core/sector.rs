//! Sector and industry classification from SEC SIC codes.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sector {
    CommunicationServices,
    ConsumerDiscretionary,
    ConsumerStaples,
    Energy,
    Financials,
    HealthCare,
    Industrials,
    InformationTechnology,
    Materials,
    RealEstate,
    Utilities,
}

impl Sector {
    pub fn name(&self) -> &'static str {
        match self {
            Sector::CommunicationServices => "Communication Services",
            Sector::ConsumerDiscretionary => "Consumer Discretionary",
            Sector::ConsumerStaples => "Consumer Staples",
            Sector::Energy => "Energy",
            Sector::Financials => "Financials",
            Sector::HealthCare => "Health Care",
            Sector::Industrials => "Industrials",
            Sector::InformationTechnology => "Information Technology",
            Sector::Materials => "Materials",
            Sector::RealEstate => "Real Estate",
            Sector::Utilities => "Utilities",
        }
    }

    /// Case-insensitive word-prefix match, so `info`, `health` and
    /// `real estate` all select a sector.
    pub fn matches(&self, query: &str) -> bool {
        let name = self.name().to_lowercase();
        let query = query.trim().to_lowercase();
        let words: Vec<&str> = name.split_whitespace().collect();
        let terms: Vec<&str> = query.split_whitespace().collect();
        !terms.is_empty()
            && terms.len() <= words.len()
            && words.iter().zip(&terms).all(|(word, term)| word.starts_with(term))
    }
}

impl Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub sector: Sector,
    pub industry: &'static str,
}

impl Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.sector, self.industry)
    }
}

use Sector::*;

// Inclusive SIC ranges, sorted and non-overlapping.
const SIC_RANGES: &[(u32, u32, Sector, &str)] = &[
    (100, 999, ConsumerStaples, "Agriculture & Fishing"),
    (1000, 1099, Materials, "Metal Mining"),
    (1200, 1299, Energy, "Coal Mining"),
    (1300, 1399, Energy, "Oil & Gas Extraction"),
    (1400, 1499, Materials, "Nonmetallic Minerals"),
    (1500, 1799, Industrials, "Construction"),
    (2000, 2199, ConsumerStaples, "Food, Beverages & Tobacco"),
    (2200, 2399, ConsumerDiscretionary, "Textiles & Apparel"),
    (2400, 2499, Materials, "Lumber & Wood Products"),
    (2500, 2599, ConsumerDiscretionary, "Furniture & Fixtures"),
    (2600, 2699, Materials, "Paper & Packaging"),
    (2700, 2799, CommunicationServices, "Printing & Publishing"),
    (2800, 2829, Materials, "Chemicals"),
    (2830, 2836, HealthCare, "Pharmaceuticals & Biotechnology"),
    (2837, 2899, Materials, "Chemicals"),
    (2900, 2999, Energy, "Petroleum Refining"),
    (3000, 3299, Materials, "Rubber, Plastics, Glass & Stone"),
    (3300, 3399, Materials, "Primary Metals"),
    (3400, 3569, Industrials, "Machinery & Metal Products"),
    (3570, 3579, InformationTechnology, "Computer Hardware"),
    (3580, 3599, Industrials, "Machinery & Metal Products"),
    (3600, 3669, InformationTechnology, "Electronic Equipment"),
    (3670, 3679, InformationTechnology, "Semiconductors & Components"),
    (3680, 3699, InformationTechnology, "Electronic Equipment"),
    (3700, 3719, ConsumerDiscretionary, "Motor Vehicles & Parts"),
    (3720, 3799, Industrials, "Aerospace & Transportation Equipment"),
    (3800, 3839, InformationTechnology, "Scientific Instruments"),
    (3840, 3859, HealthCare, "Medical Devices"),
    (3860, 3999, ConsumerDiscretionary, "Miscellaneous Manufacturing"),
    (4000, 4799, Industrials, "Transportation"),
    (4800, 4899, CommunicationServices, "Telecommunications"),
    (4900, 4999, Utilities, "Electric, Gas & Water"),
    (5000, 5199, Industrials, "Wholesale Trade"),
    (5200, 5399, ConsumerDiscretionary, "Retail"),
    (5400, 5499, ConsumerStaples, "Food Retail"),
    (5500, 5999, ConsumerDiscretionary, "Retail"),
    (6000, 6199, Financials, "Banks & Credit"),
    (6200, 6299, Financials, "Capital Markets"),
    (6300, 6499, Financials, "Insurance"),
    (6500, 6599, RealEstate, "Real Estate"),
    (6700, 6797, Financials, "Holding & Investment Offices"),
    (6798, 6798, RealEstate, "Real Estate Investment Trusts"),
    (6799, 6799, Financials, "Holding & Investment Offices"),
    (7000, 7299, ConsumerDiscretionary, "Hotels & Personal Services"),
    (7300, 7369, Industrials, "Business Services"),
    (7370, 7379, InformationTechnology, "Software & IT Services"),
    (7380, 7399, Industrials, "Business Services"),
    (7500, 7599, ConsumerDiscretionary, "Automotive Services"),
    (7800, 7899, CommunicationServices, "Motion Pictures"),
    (7900, 7999, ConsumerDiscretionary, "Amusement & Recreation"),
    (8000, 8099, HealthCare, "Health Services"),
    (8100, 8199, Industrials, "Legal Services"),
    (8200, 8299, ConsumerDiscretionary, "Educational Services"),
    (8700, 8799, Industrials, "Engineering & Management Services"),
];

/// Maps a four-digit SIC code onto a sector and industry. Codes outside the
/// table (public administration, non-operating shells) have none.
pub fn classify(sic: Option<&str>) -> Option<Classification> {
    let code: u32 = sic?.trim().parse().ok()?;
    SIC_RANGES
        .iter()
        .find(|(low, high, _, _)| (*low..=*high).contains(&code))
        .map(|&(_, _, sector, industry)| Classification { sector, industry })
}

pub fn sector_of(sic: Option<&str>) -> Option<Sector> {
    classify(sic).map(|c| c.sector)
}

/// Issuer details shown next to company-level views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub cik: String,
    pub name: String,
    pub ticker: Option<String>,
    pub exchange: Option<String>,
    pub sic: Option<String>,
}

impl Company {
    pub fn classification(&self) -> Option<Classification> {
        classify(self.sic.as_deref())
    }
}
