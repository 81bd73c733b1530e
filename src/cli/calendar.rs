use super::ui;
use crate::core::KeyValueCollection;
use crate::core::calendar::{self, CalendarConfig, Impact, ReleaseValues, ScheduledEvent};
use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use comfy_table::{Cell, Color, Table};

fn impact_cell(impact: Impact) -> Cell {
    let color = match impact {
        Impact::High => Color::Red,
        Impact::Medium => Color::Yellow,
        Impact::Low => Color::DarkGrey,
    };
    Cell::new(impact).fg(color)
}

fn value_cell(value: Option<f64>) -> Cell {
    ui::format_optional_cell(value, |v| format!("{v:.2}"))
}

fn surprise_cell(surprise: Option<f64>) -> Cell {
    match surprise {
        Some(s) if s > 0.0 => Cell::new(format!("{s:+.2}")).fg(Color::Green),
        Some(s) if s < 0.0 => Cell::new(format!("{s:+.2}")).fg(Color::Red),
        Some(s) => Cell::new(format!("{s:.2}")),
        None => ui::na_cell(false),
    }
}

fn change_cell(change: Option<f64>) -> Cell {
    match change {
        Some(c) => ui::change_cell(c),
        None => ui::na_cell(false),
    }
}

fn schedule_table(rows: &[(&ScheduledEvent<'_>, ReleaseValues)]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Time"),
        ui::header_cell("Event"),
        ui::header_cell("Country"),
        ui::header_cell("Impact"),
        ui::header_cell("Forecast"),
        ui::header_cell("Actual"),
        ui::header_cell("Previous"),
        ui::header_cell("Surprise"),
        ui::header_cell("Change"),
    ]);
    for (scheduled, values) in rows {
        table.add_row(vec![
            Cell::new(scheduled.date.format("%a %Y-%m-%d")),
            Cell::new(scheduled.event.time.as_deref().unwrap_or("")),
            Cell::new(&scheduled.event.name),
            Cell::new(format!(
                "{} ({})",
                scheduled.event.country, scheduled.event.authority
            )),
            impact_cell(scheduled.event.impact),
            value_cell(values.forecast),
            value_cell(values.actual),
            value_cell(values.previous),
            surprise_cell(values.surprise()),
            change_cell(values.change_pct()),
        ]);
    }
    table
}

pub async fn run(
    calendar_config: &CalendarConfig,
    releases: &dyn KeyValueCollection,
    days: u32,
    country: Option<&str>,
) -> Result<()> {
    let events: Vec<_> = calendar_config
        .events()
        .into_iter()
        .filter(|e| country.is_none_or(|c| e.country.eq_ignore_ascii_case(c)))
        .collect();
    if events.is_empty() {
        println!("No economic events match the selection.");
        return Ok(());
    }

    let from = Utc::now().date_naive();
    let to = super::offset_date(from, days.into())?;
    let schedule = calendar::upcoming(&events, from, to, &calendar_config.holidays)?;

    let mut rows = Vec::with_capacity(schedule.len());
    for scheduled in &schedule {
        let values = calendar::release_values(releases, &scheduled.event.id, scheduled.date)
            .await
            .unwrap_or_default();
        rows.push((scheduled, values));
    }
    let table = schedule_table(&rows);

    println!(
        "{} {} to {}\n",
        ui::style_text("Economic calendar", ui::StyleType::Title),
        from,
        to
    );
    if schedule.is_empty() {
        println!("No releases scheduled in the next {days} days.");
    } else {
        println!("{table}");
        let high = schedule
            .iter()
            .filter(|s| s.event.impact == Impact::High)
            .count();
        println!(
            "\n{}",
            ui::style_text(
                &format!("{} releases, {} high impact", schedule.len(), high),
                ui::StyleType::Subtle
            )
        );
    }
    Ok(())
}

pub async fn record_release(
    calendar_config: &CalendarConfig,
    releases: &dyn KeyValueCollection,
    event_id: &str,
    date: NaiveDate,
    values: ReleaseValues,
) -> Result<()> {
    let events = calendar_config.events();
    let Some(event) = events.iter().find(|e| e.id == event_id) else {
        bail!("Unknown economic event: {event_id}");
    };
    if values.actual.is_none() && values.forecast.is_none() && values.previous.is_none() {
        bail!("Nothing to record: pass at least one of --actual, --forecast or --previous");
    }

    let stored = calendar::record_release(releases, event_id, date, values).await?;
    println!(
        "Recorded {} for {}",
        ui::style_text(&event.name, ui::StyleType::TotalLabel),
        date
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Forecast"),
        ui::header_cell("Actual"),
        ui::header_cell("Previous"),
        ui::header_cell("Surprise"),
        ui::header_cell("Change vs previous"),
    ]);
    table.add_row(vec![
        value_cell(stored.forecast),
        value_cell(stored.actual),
        value_cell(stored.previous),
        surprise_cell(stored.surprise()),
        change_cell(stored.change_pct()),
    ]);
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;

    #[test]
    fn test_schedule_table_shows_change_vs_previous() {
        let events = CalendarConfig::default().events();
        let event = events.iter().find(|e| e.id == "us-cpi").unwrap();
        let scheduled = ScheduledEvent {
            date: NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
            event,
        };
        let recorded = ReleaseValues {
            forecast: Some(3.4),
            actual: Some(3.3),
            previous: Some(3.0),
        };
        let text = schedule_table(&[(&scheduled, recorded), (&scheduled, ReleaseValues::default())])
            .to_string();
        assert!(text.contains("Change"));
        assert!(text.contains("10.00%"));
        assert!(text.contains("-0.10"));
    }

    #[tokio::test]
    async fn test_days_past_the_date_range_fail() {
        let collection = MemoryCollection::new();
        let err = run(&CalendarConfig::default(), &collection, u32::MAX, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the supported date range"));
    }

    #[tokio::test]
    async fn test_record_release_with_failed_write_is_an_error() {
        let collection = crate::store::testing::ReadOnlyCollection;
        let result = record_release(
            &CalendarConfig::default(),
            &collection,
            "us-cpi",
            NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
            ReleaseValues {
                actual: Some(3.3),
                ..Default::default()
            },
        )
        .await;
        assert!(result.is_err());
    }
}
