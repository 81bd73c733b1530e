use super::ui;
use crate::core::KeyValueCollection;
use crate::core::cache;
use crate::core::ipo::{DealTerms, IpoBook, IpoFiling, IpoFilingSource, IpoStatus};
use crate::core::sector;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use comfy_table::{Cell, Color};
use tracing::{debug, warn};

const BOOK_KEY: &str = "book";

fn status_cell(status: IpoStatus) -> Cell {
    let color = match status {
        IpoStatus::Filed => Color::Cyan,
        IpoStatus::Expected => Color::Yellow,
        IpoStatus::Priced => Color::Green,
        IpoStatus::Withdrawn => Color::DarkGrey,
    };
    Cell::new(status).fg(color)
}

fn price_range(filing: &IpoFiling) -> Option<String> {
    match (filing.final_price, filing.price_low, filing.price_high) {
        (Some(price), _, _) => Some(format!("{price:.2}")),
        (None, Some(low), Some(high)) => Some(format!("{low:.2} - {high:.2}")),
        _ => None,
    }
}

fn sector_label(filing: &IpoFiling) -> String {
    sector::classify(filing.sic.as_deref())
        .map(|c| c.to_string())
        .unwrap_or_default()
}

/// Loads the stored book, merges filings from `source` for `[from, to]` and
/// any offering terms, then stores it again. A failed fetch leaves the stored
/// book in use.
pub async fn refresh_book(
    source: &dyn IpoFilingSource,
    collection: &dyn KeyValueCollection,
    from: NaiveDate,
    to: NaiveDate,
    terms: &[DealTerms],
) -> Result<IpoBook> {
    let mut book: IpoBook = cache::read_json(collection, BOOK_KEY)
        .await
        .unwrap_or_default();

    match source.fetch_filings(from, to).await {
        Ok(filings) => {
            let (inserted, updated) = book.merge(filings);
            debug!("IPO book: {} new, {} updated", inserted, updated);
        }
        Err(e) if !book.is_empty() => {
            warn!("Showing stored IPO filings: {:#}", e);
        }
        Err(e) => return Err(e),
    }

    for deal in terms {
        if !book.apply_terms(deal) {
            warn!("No filing with accession number {}", deal.accession);
        }
    }

    cache::write_json(collection, BOOK_KEY, &book, None).await?;
    Ok(book)
}

pub async fn run(
    source: &dyn IpoFilingSource,
    collection: &dyn KeyValueCollection,
    days: u32,
    terms: &[DealTerms],
) -> Result<()> {
    let to = Utc::now().date_naive();
    let from = super::offset_date(to, -i64::from(days))?;

    let pb = ui::new_spinner("Searching registration filings...");
    let book = refresh_book(source, collection, from, to, terms).await;
    pb.finish_and_clear();
    let book = book?;

    let rows = book.calendar(Some(from));
    if rows.is_empty() {
        println!("No IPO filings in the last {days} days.");
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Filed"),
        ui::header_cell("Company"),
        ui::header_cell("Ticker"),
        ui::header_cell("Exchange"),
        ui::header_cell("Sector"),
        ui::header_cell("Form"),
        ui::header_cell("Status"),
        ui::header_cell("Shares"),
        ui::header_cell("Price (USD)"),
        ui::header_cell("Deal size (USD)"),
    ]);
    for filing in &rows {
        table.add_row(vec![
            Cell::new(filing.filed),
            Cell::new(&filing.company),
            Cell::new(filing.ticker.as_deref().unwrap_or("")),
            Cell::new(filing.exchange.as_deref().unwrap_or("")),
            Cell::new(sector_label(filing)),
            Cell::new(filing.form),
            status_cell(filing.status()),
            ui::format_optional_cell(filing.shares, ui::format_compact),
            ui::format_optional_cell(price_range(filing), |p| p),
            ui::format_optional_cell(filing.deal_size(), ui::format_compact),
        ]);
    }

    println!(
        "{} {} to {}\n",
        ui::style_text("IPO calendar", ui::StyleType::Title),
        from,
        to
    );
    println!("{table}");

    let priced = rows
        .iter()
        .filter(|f| f.status() == IpoStatus::Priced)
        .count();
    let total_size: f64 = rows.iter().filter_map(|f| f.deal_size()).sum();
    println!(
        "\n{} companies, {} priced. Known deal volume: {}",
        rows.len(),
        priced,
        ui::style_text(&ui::format_compact(total_size), ui::StyleType::TotalValue)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ipo::FilingType;
    use crate::store::memory::MemoryCollection;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct FixedSource(Option<Vec<IpoFiling>>);

    #[async_trait]
    impl IpoFilingSource for FixedSource {
        async fn fetch_filings(&self, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<IpoFiling>> {
            self.0.clone().ok_or_else(|| anyhow!("search unavailable"))
        }
    }

    fn filing(accession: &str, form: FilingType, filed: &str) -> IpoFiling {
        IpoFiling {
            accession: accession.to_string(),
            cik: "0001234567".to_string(),
            company: "Rocket Labs Inc".to_string(),
            form,
            filed: filed.parse().unwrap(),
            ticker: Some("RKT".to_string()),
            exchange: Some("Nasdaq".to_string()),
            sic: Some("3760".to_string()),
            shares: None,
            price_low: None,
            price_high: None,
            final_price: None,
        }
    }

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_refresh_merges_and_applies_terms() {
        let collection = MemoryCollection::new();
        let (from, to) = window();
        let source = FixedSource(Some(vec![
            filing("0001-24-000001", FilingType::S1, "2024-01-10"),
            filing("0001-24-000002", FilingType::S1A, "2024-02-20"),
        ]));
        let terms = vec![DealTerms {
            accession: "0001-24-000002".to_string(),
            shares: Some(10_000_000.0),
            price_low: Some(14.0),
            price_high: Some(16.0),
            final_price: None,
        }];

        let book = refresh_book(&source, &collection, from, to, &terms)
            .await
            .unwrap();
        assert_eq!(book.len(), 2);

        let rows = book.calendar(None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status(), IpoStatus::Expected);
        assert_eq!(rows[0].deal_size(), Some(150_000_000.0));
        assert_eq!(price_range(rows[0]).as_deref(), Some("14.00 - 16.00"));
        assert_eq!(
            sector_label(rows[0]),
            "Industrials / Aerospace & Transportation Equipment"
        );

        let stored: IpoBook = cache::read_json(&collection, BOOK_KEY).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_uses_stored_book() {
        let collection = MemoryCollection::new();
        let (from, to) = window();
        let seeded = FixedSource(Some(vec![filing("0001-24-000001", FilingType::S1, "2024-01-10")]));
        refresh_book(&seeded, &collection, from, to, &[]).await.unwrap();

        let book = refresh_book(&FixedSource(None), &collection, from, to, &[])
            .await
            .unwrap();
        assert_eq!(book.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_stored_book_is_an_error() {
        let collection = MemoryCollection::new();
        let (from, to) = window();
        let result = refresh_book(&FixedSource(None), &collection, from, to, &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_days_past_the_date_range_fail() {
        let collection = MemoryCollection::new();
        let source = FixedSource(Some(vec![]));
        let err = run(&source, &collection, u32::MAX, &[]).await.unwrap_err();
        assert!(err.to_string().contains("outside the supported date range"));
    }

    #[tokio::test]
    async fn test_unsaved_book_is_an_error() {
        let (from, to) = window();
        let source = FixedSource(Some(vec![filing("0001-24-000001", FilingType::S1, "2024-01-10")]));
        let result =
            refresh_book(&source, &crate::store::testing::ReadOnlyCollection, from, to, &[]).await;
        assert!(result.unwrap_err().to_string().contains("Failed to store book"));
    }
}
