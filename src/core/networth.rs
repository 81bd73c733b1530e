//! Net worth aggregation across every asset category, normalized to one currency.
use crate::core::config::{Assets, Expense};
use crate::core::currency::{self, CurrencyRateProvider};
use crate::core::price::PriceResult;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AssetCategory {
    Crypto,
    Stocks,
    RealEstate,
    Cash,
    Valuables,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 5] = [
        AssetCategory::Crypto,
        AssetCategory::Stocks,
        AssetCategory::RealEstate,
        AssetCategory::Cash,
        AssetCategory::Valuables,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AssetCategory::Crypto => "Crypto",
            AssetCategory::Stocks => "Stocks",
            AssetCategory::RealEstate => "Real Estate",
            AssetCategory::Cash => "Cash",
            AssetCategory::Valuables => "Valuables",
        }
    }
}

/// Calculated value and weight of a single holding.
#[derive(Debug, Clone)]
pub struct HoldingValue {
    pub identifier: String,
    pub short_name: Option<String>,
    pub units: Option<f64>,
    pub price: Option<f64>,
    pub value: Option<f64>,
    pub value_currency: Option<String>,
    pub converted_value: Option<f64>,
    pub weight: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct CategoryValue {
    pub category: AssetCategory,
    pub holdings: Vec<HoldingValue>,
    pub total: Option<f64>,
    pub weight: Option<f64>,
}

#[derive(Debug)]
pub struct NetWorth {
    pub categories: Vec<CategoryValue>,
    pub total: Option<f64>,
    pub target_currency: String,
}

#[derive(Debug, Clone)]
pub struct ExpenseLine {
    pub category: String,
    pub monthly: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ExpenseSummary {
    pub lines: Vec<ExpenseLine>,
    pub monthly_total: Option<f64>,
    pub annual_total: Option<f64>,
    pub target_currency: String,
}

/// Where a holding's value comes from before conversion.
enum Source {
    Market { symbol: String, units: f64 },
    Fixed { name: String, value: f64, currency: String },
}

/// Symbols that need a market price, deduplicated and in config order.
pub fn market_symbols(assets: &Assets) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for holding in assets.crypto.iter().chain(assets.stocks.iter()) {
        if !symbols.contains(&holding.symbol) {
            symbols.push(holding.symbol.clone());
        }
    }
    symbols
}

fn sources(assets: &Assets, category: AssetCategory, target_currency: &str) -> Vec<Source> {
    let currency_or_target =
        |c: &Option<String>| c.clone().unwrap_or_else(|| target_currency.to_string());
    match category {
        AssetCategory::Crypto => assets
            .crypto
            .iter()
            .map(|h| Source::Market {
                symbol: h.symbol.clone(),
                units: h.units,
            })
            .collect(),
        AssetCategory::Stocks => assets
            .stocks
            .iter()
            .map(|h| Source::Market {
                symbol: h.symbol.clone(),
                units: h.units,
            })
            .collect(),
        AssetCategory::RealEstate => assets
            .real_estate
            .iter()
            .map(|p| Source::Fixed {
                name: p.name.clone(),
                value: p.value - p.loan_balance.unwrap_or(0.0),
                currency: currency_or_target(&p.currency),
            })
            .collect(),
        AssetCategory::Cash => assets
            .cash
            .iter()
            .map(|a| Source::Fixed {
                name: a.name.clone(),
                value: a.balance,
                currency: currency_or_target(&a.currency),
            })
            .collect(),
        AssetCategory::Valuables => assets
            .valuables
            .iter()
            .map(|v| Source::Fixed {
                name: v.name.clone(),
                value: v.value,
                currency: currency_or_target(&v.currency),
            })
            .collect(),
    }
}

/// Values every holding, converts it into `target_currency` and aggregates
/// per category. Totals are only reported when every contributing holding
/// could be valued. Progress updates can be reported via `update_callback`.
pub async fn calculate_net_worth(
    assets: &Assets,
    price_results: &HashMap<String, Result<PriceResult>>,
    currency_provider: &(dyn CurrencyRateProvider + Send + Sync),
    target_currency: &str,
    update_callback: &(dyn Fn()),
) -> NetWorth {
    let mut categories = Vec::new();
    let mut grand_total = 0.0;
    let mut all_valid = true;

    for category in AssetCategory::ALL {
        let mut holdings = Vec::new();
        let mut category_total = 0.0;
        let mut category_valid = true;

        for source in sources(assets, category, target_currency) {
            let holding = value_holding(source, price_results, currency_provider, target_currency)
                .await;
            match holding.converted_value {
                Some(v) => category_total += v,
                None => category_valid = false,
            }
            holdings.push(holding);
            update_callback();
        }

        if holdings.is_empty() {
            continue;
        }
        if category_valid {
            grand_total += category_total;
        } else {
            all_valid = false;
        }
        categories.push(CategoryValue {
            category,
            holdings,
            total: category_valid.then_some(category_total),
            weight: None,
        });
    }

    let total = all_valid.then_some(grand_total);
    if let Some(total) = total
        && total > 0.0
    {
        for category in &mut categories {
            category.weight = category.total.map(|v| v / total * 100.0);
            for holding in &mut category.holdings {
                holding.weight = holding.converted_value.map(|v| v / total * 100.0);
            }
        }
    }

    NetWorth {
        categories,
        total,
        target_currency: target_currency.to_string(),
    }
}

async fn value_holding(
    source: Source,
    price_results: &HashMap<String, Result<PriceResult>>,
    currency_provider: &(dyn CurrencyRateProvider + Send + Sync),
    target_currency: &str,
) -> HoldingValue {
    let mut holding = match source {
        Source::Fixed {
            name,
            value,
            currency,
        } => HoldingValue {
            identifier: name,
            short_name: None,
            units: None,
            price: None,
            value: Some(value),
            value_currency: Some(currency),
            converted_value: None,
            weight: None,
            error: None,
        },
        Source::Market { symbol, units } => {
            let mut holding = HoldingValue {
                identifier: symbol.clone(),
                short_name: None,
                units: Some(units),
                price: None,
                value: None,
                value_currency: None,
                converted_value: None,
                weight: None,
                error: None,
            };
            match price_results.get(&symbol) {
                Some(Ok(price_data)) => {
                    holding.price = Some(price_data.price);
                    holding.value = Some(units * price_data.price);
                    holding.value_currency = Some(price_data.currency.clone());
                    holding.short_name = price_data.short_name.clone();
                }
                Some(Err(e)) => {
                    debug!("Price fetch error for {}: {}", symbol, e);
                    holding.error = Some(e.to_string());
                }
                None => {
                    debug!("Price data not found for {} in pre-fetched results", symbol);
                    holding.error = Some(format!("Price data not available for {symbol}"));
                }
            }
            holding
        }
    };

    if let (Some(value), Some(value_currency)) = (holding.value, holding.value_currency.clone()) {
        match currency::convert(currency_provider, value, &value_currency, target_currency).await
        {
            Ok(converted) => holding.converted_value = Some(converted),
            Err(e) => holding.error = Some(e.to_string()),
        }
    }
    holding
}

/// Converts monthly expenses into `target_currency`. Expenses are reported
/// alongside net worth and never deducted from it.
pub async fn summarize_expenses(
    expenses: &[Expense],
    currency_provider: &(dyn CurrencyRateProvider + Send + Sync),
    target_currency: &str,
) -> ExpenseSummary {
    let mut lines = Vec::new();
    let mut monthly_total = 0.0;
    let mut all_valid = true;

    for expense in expenses {
        let from = expense.currency.as_deref().unwrap_or(target_currency);
        let line = match currency::convert(currency_provider, expense.monthly, from, target_currency)
            .await
        {
            Ok(monthly) => {
                monthly_total += monthly;
                ExpenseLine {
                    category: expense.category.clone(),
                    monthly: Some(monthly),
                    error: None,
                }
            }
            Err(e) => {
                all_valid = false;
                ExpenseLine {
                    category: expense.category.clone(),
                    monthly: None,
                    error: Some(e.to_string()),
                }
            }
        };
        lines.push(line);
    }

    lines.sort_by(|a, b| {
        b.monthly
            .unwrap_or(f64::MIN)
            .total_cmp(&a.monthly.unwrap_or(f64::MIN))
    });

    let monthly_total = all_valid.then_some(monthly_total);
    ExpenseSummary {
        lines,
        monthly_total,
        annual_total: monthly_total.map(|m| m * 12.0),
        target_currency: target_currency.to_string(),
    }
}
