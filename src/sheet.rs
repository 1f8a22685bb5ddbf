//! Fixed-layout weekly spreadsheet built from daily reports.
//!
//! Every column is [`ROWS`] cells tall and follows [`LAYOUT`]. Week total and
//! grand total columns carry `SUM(INDIRECT(..))` formulas with relative
//! `R[0]C[-n]` references, so their text depends on where they are emitted.

use std::fmt;
use std::io;

use anyhow::Context as _;
use chrono::{Datelike as _, NaiveDate, Weekday};
use serde::{Serialize, Serializer};

use crate::model::{
    AudienceCode, LanguageCode, STATUS_CHECKED_OUT, STATUS_NEW_PATRON, STATUS_RENEWED,
    STATUS_RETURNED, TopicCode,
};
use crate::report::DayReport;

pub const ROWS: usize = 35;

pub const WEEK_TOTAL_TITLE: &str = "Week total";
pub const TOTAL_TITLE: &str = "Total";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Number(u64),
    Text(String),
    Formula(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(text) | Cell::Formula(text) => f.write_str(text),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_str(""),
            Cell::Number(n) => serializer.serialize_u64(*n),
            Cell::Text(text) | Cell::Formula(text) => serializer.serialize_str(text),
        }
    }
}

pub type Column = [Cell; ROWS];

/// Meaning of each row of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Date,
    DayName,
    Status(&'static str),
    Language(LanguageCode),
    Audience(AudienceCode),
    Topic(TopicCode),
    Blank,
}

impl Slot {
    /// Rows holding counts; only these carry formulas in total columns.
    pub fn is_counter(self) -> bool {
        matches!(
            self,
            Slot::Status(_) | Slot::Language(_) | Slot::Audience(_) | Slot::Topic(_)
        )
    }
}

pub const LAYOUT: [Slot; ROWS] = [
    Slot::Date,
    Slot::DayName,
    Slot::Status(STATUS_CHECKED_OUT),
    Slot::Blank,
    Slot::Blank,
    Slot::Status(STATUS_RETURNED),
    Slot::Blank,
    Slot::Status(STATUS_RENEWED),
    Slot::Blank,
    Slot::Status(STATUS_NEW_PATRON),
    Slot::Blank,
    Slot::Blank,
    Slot::Blank,
    Slot::Language(LanguageCode::Farsi),
    Slot::Language(LanguageCode::Arabic),
    Slot::Language(LanguageCode::Somali),
    Slot::Language(LanguageCode::French),
    Slot::Language(LanguageCode::English),
    Slot::Language(LanguageCode::German),
    Slot::Language(LanguageCode::Greek),
    Slot::Language(LanguageCode::Amharic),
    Slot::Language(LanguageCode::Other),
    Slot::Blank,
    Slot::Blank,
    Slot::Blank,
    Slot::Audience(AudienceCode::Kids),
    Slot::Audience(AudienceCode::Adults),
    Slot::Blank,
    Slot::Blank,
    Slot::Blank,
    Slot::Topic(TopicCode::Fiction),
    Slot::Topic(TopicCode::NonFiction),
    Slot::Topic(TopicCode::EducationalSciences),
    Slot::Topic(TopicCode::Languages),
    Slot::Topic(TopicCode::Other),
];

/// ISO weekday, Monday = 1 ... Sunday = 7.
pub fn iso_weekday(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

pub fn day_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Short Finnish date, e.g. `4.03.2024`.
pub fn sheet_date(date: NaiveDate) -> String {
    format!("{}.{:02}.{}", date.day(), date.month(), date.year())
}

fn sum_range(from: usize, to: usize) -> String {
    format!("SUM(INDIRECT(\"R[0]C[-{from}]:R[0]C[-{to}]\"; FALSE))")
}

/// Accumulates columns and remembers where each week total landed.
#[derive(Debug, Default)]
pub struct SheetBuilder {
    columns: Vec<Column>,
    // One-based position (column count right after the push) of every week total.
    subtotal_ends: Vec<usize>,
}

impl SheetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the column count after the push.
    fn push(&mut self, column: Column) -> usize {
        self.columns.push(column);
        self.columns.len()
    }

    pub fn add_day_column(&mut self, day: &DayReport) -> usize {
        self.push(std::array::from_fn(|row| match LAYOUT[row] {
            Slot::Date => Cell::Text(sheet_date(day.date)),
            Slot::DayName => Cell::Text(day_name(day.date).to_owned()),
            Slot::Status(status) => Cell::Number(day.status.get(status)),
            Slot::Language(code) => Cell::Number(day.language.get(&code)),
            Slot::Audience(code) => Cell::Number(day.audience.get(&code)),
            Slot::Topic(code) => Cell::Number(day.topic.get(&code)),
            Slot::Blank => Cell::Empty,
        }))
    }

    /// Weekday without activity: date, day name and a zero check-out count.
    pub fn add_placeholder_column(&mut self, date: NaiveDate) -> usize {
        self.push(std::array::from_fn(|row| match LAYOUT[row] {
            Slot::Date => Cell::Text(sheet_date(date)),
            Slot::DayName => Cell::Text(day_name(date).to_owned()),
            Slot::Status(STATUS_CHECKED_OUT) => Cell::Number(0),
            _ => Cell::Empty,
        }))
    }

    pub fn add_empty_column(&mut self) -> usize {
        self.push(std::array::from_fn(|_| Cell::Empty))
    }

    fn add_formula_column(&mut self, title: &str, formula: Option<String>) -> usize {
        self.push(std::array::from_fn(|row| match LAYOUT[row] {
            Slot::DayName => Cell::Text(title.to_owned()),
            slot if slot.is_counter() => formula.clone().map_or(Cell::Empty, Cell::Formula),
            _ => Cell::Empty,
        }))
    }

    /// Sums every column since the previous week total (or since the start).
    pub fn add_subtotal_column(&mut self, title: &str) -> usize {
        let look_behind = self.len() - self.subtotal_ends.last().copied().unwrap_or(0);
        let formula = (look_behind > 0).then(|| format!("={}", sum_range(look_behind, 1)));
        let end = self.add_formula_column(title, formula);
        self.subtotal_ends.push(end);
        end
    }

    /// Sums the ranges between week totals, skipping the week totals.
    pub fn add_total_column(&mut self, title: &str) -> usize {
        let len = self.len();
        let mut parts = Vec::new();
        let mut last = 0;
        for &end in &self.subtotal_ends {
            parts.push(sum_range(len - last, len - end + 2));
            last = end;
        }
        if last < len {
            parts.push(sum_range(len - last, 1));
        }

        let formula = (!parts.is_empty()).then(|| format!("={}", parts.join(" + ")));
        self.add_formula_column(title, formula)
    }

    pub fn finish(self) -> Sheet {
        Sheet {
            columns: self.columns,
        }
    }
}

/// Lays out daily reports as columns with week totals and a grand total.
///
/// Weekend days without activity get no column. A new week starts when the
/// weekday goes down; the finished week gets a total plus a spacer column
/// first.
pub fn layout_report(days: &[DayReport]) -> Sheet {
    if days.is_empty() {
        return Sheet::default();
    }

    let mut builder = SheetBuilder::new();
    let mut prev_weekday = 0;
    for day in days {
        let weekday = iso_weekday(day.date);
        if weekday < prev_weekday {
            builder.add_subtotal_column(WEEK_TOTAL_TITLE);
            builder.add_empty_column();
        }

        if !day.entries.is_empty() {
            builder.add_day_column(day);
        } else if weekday <= 5 {
            builder.add_placeholder_column(day.date);
        }

        prev_weekday = weekday;
    }

    builder.add_subtotal_column(WEEK_TOTAL_TITLE);
    builder.add_empty_column();
    builder.add_total_column(TOTAL_TITLE);

    tracing::debug!(columns = builder.len(), "laid out report");
    builder.finish()
}

/// Column-major grid of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    columns: Vec<Column>,
}

impl Sheet {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Row-major view for rendering.
    pub fn transpose(&self) -> Vec<Vec<&Cell>> {
        if self.columns.is_empty() {
            return Vec::new();
        }
        (0..ROWS)
            .map(|row| self.columns.iter().map(|column| &column[row]).collect())
            .collect()
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut out = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(writer);
        for row in self.transpose() {
            out.write_record(row.iter().map(|cell| cell.to_string()))
                .context("write csv row")?;
        }
        out.flush().context("flush csv")?;
        Ok(())
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<table>\n");
        for row in self.transpose() {
            html.push_str("  <tr>\n");
            for cell in row {
                html.push_str("    <td>");
                html.push_str(&escape_html(&cell.to_string()));
                html.push_str("</td>\n");
            }
            html.push_str("  </tr>\n");
        }
        html.push_str("</table>\n");
        html
    }
}

impl Serialize for Sheet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.columns.iter().map(|column| column.as_slice()))
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportRow;

    fn date(value: &str) -> NaiveDate {
        value.parse().unwrap()
    }

    fn active_day(value: &str, checked_out: u64) -> DayReport {
        let mut day = DayReport::empty(date(value));
        for _ in 0..checked_out {
            day.status.increment(STATUS_CHECKED_OUT.to_owned());
            day.language.increment(LanguageCode::Somali);
            day.audience.increment(AudienceCode::Kids);
            day.topic.increment(TopicCode::Languages);
        }
        day.entries.push(ReportRow {
            transaction_id: 1,
            book_id: "b".to_owned(),
            status: STATUS_CHECKED_OUT.to_owned(),
            entry_date: date(value).and_hms_opt(12, 0, 0).unwrap(),
            title: "t".to_owned(),
            language: LanguageCode::Somali,
            audience: AudienceCode::Kids,
            topic: TopicCode::Languages,
            book_errors: Vec::new(),
        });
        day
    }

    fn title(column: &Column) -> String {
        column[1].to_string()
    }

    fn formula(column: &Column) -> String {
        column[2].to_string()
    }

    #[test]
    fn layout_has_nine_languages_two_audiences_five_topics() {
        let count = |pred: fn(&Slot) -> bool| LAYOUT.iter().filter(|s| pred(s)).count();
        assert_eq!(count(|s| matches!(s, Slot::Status(_))), 4);
        assert_eq!(count(|s| matches!(s, Slot::Language(_))), 9);
        assert_eq!(count(|s| matches!(s, Slot::Audience(_))), 2);
        assert_eq!(count(|s| matches!(s, Slot::Topic(_))), 5);
    }

    #[test]
    fn weekday_numbering_runs_monday_to_sunday() {
        assert_eq!(iso_weekday(date("2024-03-04")), 1);
        assert_eq!(iso_weekday(date("2024-03-10")), 7);
        assert_eq!(day_name(date("2024-03-10")), "Sunday");
        assert_eq!(sheet_date(date("2024-03-04")), "4.03.2024");
        assert_eq!(sheet_date(date("2024-12-25")), "25.12.2024");
    }

    #[test]
    fn single_week_gets_one_week_total_and_a_grand_total() {
        let days = vec![
            active_day("2024-03-04", 2),
            DayReport::empty(date("2024-03-05")),
            DayReport::empty(date("2024-03-06")),
        ];
        let sheet = layout_report(&days);
        let columns = sheet.columns();
        assert_eq!(columns.len(), 6);

        assert_eq!(columns[0][0], Cell::Text("4.03.2024".to_owned()));
        assert_eq!(columns[0][1], Cell::Text("Monday".to_owned()));
        assert_eq!(columns[0][2], Cell::Number(2));
        assert_eq!(columns[0][15], Cell::Number(2));
        assert_eq!(columns[0][25], Cell::Number(2));
        assert_eq!(columns[0][33], Cell::Number(2));

        assert_eq!(title(&columns[1]), "Tuesday");
        assert_eq!(columns[1][2], Cell::Number(0));
        assert!(columns[1][3..].iter().all(|c| *c == Cell::Empty));

        assert_eq!(title(&columns[3]), WEEK_TOTAL_TITLE);
        assert_eq!(
            formula(&columns[3]),
            "=SUM(INDIRECT(\"R[0]C[-3]:R[0]C[-1]\"; FALSE))"
        );
        assert!(columns[4].iter().all(|c| *c == Cell::Empty));
        assert_eq!(title(&columns[5]), TOTAL_TITLE);
        assert_eq!(
            formula(&columns[5]),
            "=SUM(INDIRECT(\"R[0]C[-5]:R[0]C[-3]\"; FALSE)) + SUM(INDIRECT(\"R[0]C[-1]:R[0]C[-1]\"; FALSE))"
        );
    }

    #[test]
    fn week_boundary_inserts_total_and_spacer() {
        let days = vec![
            active_day("2024-03-08", 1),
            DayReport::empty(date("2024-03-09")),
            active_day("2024-03-10", 1),
            active_day("2024-03-11", 3),
        ];
        let sheet = layout_report(&days);
        let titles = sheet.columns().iter().map(title).collect::<Vec<_>>();
        assert_eq!(
            titles,
            vec![
                "Friday",
                "Sunday",
                WEEK_TOTAL_TITLE,
                "",
                "Monday",
                WEEK_TOTAL_TITLE,
                "",
                TOTAL_TITLE,
            ]
        );

        let columns = sheet.columns();
        assert_eq!(
            formula(&columns[2]),
            "=SUM(INDIRECT(\"R[0]C[-2]:R[0]C[-1]\"; FALSE))"
        );
        assert_eq!(
            formula(&columns[5]),
            "=SUM(INDIRECT(\"R[0]C[-2]:R[0]C[-1]\"; FALSE))"
        );
        assert_eq!(
            formula(&columns[7]),
            "=SUM(INDIRECT(\"R[0]C[-7]:R[0]C[-6]\"; FALSE)) + \
             SUM(INDIRECT(\"R[0]C[-4]:R[0]C[-3]\"; FALSE)) + \
             SUM(INDIRECT(\"R[0]C[-1]:R[0]C[-1]\"; FALSE))"
        );
    }

    #[test]
    fn leading_empty_weekend_yields_blank_first_week_total() {
        let days = vec![
            DayReport::empty(date("2024-03-09")),
            DayReport::empty(date("2024-03-10")),
            active_day("2024-03-11", 1),
        ];
        let sheet = layout_report(&days);
        let columns = sheet.columns();
        assert_eq!(title(&columns[0]), WEEK_TOTAL_TITLE);
        assert_eq!(columns[0][2], Cell::Empty);
        assert_eq!(title(&columns[2]), "Monday");
    }

    #[test]
    fn formula_rows_match_counter_rows() {
        let days = vec![active_day("2024-03-04", 1)];
        let sheet = layout_report(&days);
        let columns = sheet.columns();
        let data = &columns[0];
        let total = columns.last().unwrap();
        for row in 2..ROWS {
            let is_number = matches!(data[row], Cell::Number(_));
            let is_formula = matches!(total[row], Cell::Formula(_));
            assert_eq!(is_number, is_formula, "row {row}");
        }
        assert_eq!(total[0], Cell::Empty);
    }

    #[test]
    fn empty_days_produce_empty_sheet() {
        let sheet = layout_report(&[]);
        assert!(sheet.is_empty());
        assert!(sheet.transpose().is_empty());
    }

    #[test]
    fn transpose_and_render() {
        let sheet = layout_report(&[active_day("2024-03-04", 1)]);
        let rows = sheet.transpose();
        assert_eq!(rows.len(), ROWS);
        assert!(rows.iter().all(|row| row.len() == sheet.columns().len()));

        let mut csv = Vec::new();
        sheet.write_csv(&mut csv).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert_eq!(csv.lines().count(), ROWS);
        assert!(csv.starts_with("4.03.2024,,,"));

        let html = sheet.to_html();
        assert!(html.contains("<td>Monday</td>"));
        assert!(html.contains("&quot;R[0]C[-1]:R[0]C[-1]&quot;"));

        let json = serde_json::to_value(&sheet).unwrap();
        assert_eq!(json[0][2], 1);
        assert_eq!(json[0][1], "Monday");
        assert_eq!(json[0].as_array().unwrap().len(), ROWS);
    }
}
