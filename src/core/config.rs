use crate::core::calendar::CalendarConfig;
use crate::core::tax::TaxConfig;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

/// A dated cash flow into (positive) or out of (negative) a holding, in the
/// holding's currency.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Purchase {
    pub date: NaiveDate,
    pub amount: f64,
    pub units: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MarketHolding {
    pub symbol: String,
    pub units: f64,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Property {
    pub name: String,
    pub value: f64,
    pub loan_balance: Option<f64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CashKind {
    Checking,
    Savings,
    #[default]
    Other,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CashAccount {
    pub name: String,
    pub balance: f64,
    pub currency: Option<String>,
    #[serde(default)]
    pub kind: CashKind,
    pub opened: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Valuable {
    pub name: String,
    pub value: f64,
    pub currency: Option<String>,
    pub acquired: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Expense {
    pub category: String,
    pub monthly: f64,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Assets {
    #[serde(default)]
    pub crypto: Vec<MarketHolding>,
    #[serde(default)]
    pub stocks: Vec<MarketHolding>,
    #[serde(default)]
    pub real_estate: Vec<Property>,
    #[serde(default)]
    pub cash: Vec<CashAccount>,
    #[serde(default)]
    pub valuables: Vec<Valuable>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BaseUrlConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecProviderConfig {
    pub search_url: String,
    /// Host of the submissions and XBRL company-facts APIs.
    pub submissions_url: String,
    /// Host of the filing archives and the ticker map.
    #[serde(default = "default_sec_archives_url")]
    pub archives_url: String,
    /// SEC asks automated clients to identify themselves with a contact.
    pub user_agent: String,
}

fn default_sec_archives_url() -> String {
    "https://www.sec.gov".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<BaseUrlConfig>,
    pub exchange_rates: Option<BaseUrlConfig>,
    pub sec: Option<SecProviderConfig>,
    pub lda: Option<BaseUrlConfig>,
    pub usaspending: Option<BaseUrlConfig>,
}

impl ProvidersConfig {
    pub fn yahoo_url(&self) -> &str {
        self.yahoo
            .as_ref()
            .map_or("https://query1.finance.yahoo.com", |p| &p.base_url)
    }

    pub fn exchange_rates_url(&self) -> &str {
        self.exchange_rates
            .as_ref()
            .map_or("https://open.er-api.com", |p| &p.base_url)
    }

    pub fn lda_url(&self) -> &str {
        self.lda
            .as_ref()
            .map_or("https://lda.senate.gov", |p| &p.base_url)
    }

    pub fn usaspending_url(&self) -> &str {
        self.usaspending
            .as_ref()
            .map_or("https://api.usaspending.gov", |p| &p.base_url)
    }

    pub fn sec(&self) -> SecProviderConfig {
        self.sec.clone().unwrap_or_else(|| SecProviderConfig {
            search_url: "https://efts.sec.gov".to_string(),
            submissions_url: "https://data.sec.gov".to_string(),
            archives_url: default_sec_archives_url(),
            user_agent: "omnifolio/0.1 admin@example.com".to_string(),
        })
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(BaseUrlConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
            exchange_rates: Some(BaseUrlConfig {
                base_url: "https://open.er-api.com".to_string(),
            }),
            sec: None,
            lda: None,
            usaspending: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub currency: String,
    #[serde(default)]
    pub assets: Assets,
    #[serde(default)]
    pub tax: Option<TaxConfig>,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("app", "omnifolio", "omnifolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("app", "omnifolio", "omnifolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
