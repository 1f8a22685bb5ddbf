use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use chrono::{Days, NaiveDate, NaiveDateTime};

use crate::cli::{ReportArgs, ReportFormat};
use crate::model::{
    AudienceCode, KNOWN_STATUSES, LanguageCode, ReportRow, STATUS_CHECKED_OUT, TopicCode,
};
use crate::sheet::{Sheet, layout_report};
use crate::store::{LocalFsStore, Store};

pub async fn run(args: ReportArgs) -> anyhow::Result<()> {
    let out_path = Path::new(&args.out);
    if out_path.exists() && !args.force {
        anyhow::bail!("report output already exists: {}", out_path.display());
    }
    let query = ReportQuery::new(args.from, args.to)?;

    let store = LocalFsStore::open(&args.store.data_dir)
        .await
        .context("open store")?;
    let result = export_report(&store, &query).await;
    store.close().await.context("close store")?;
    let sheet = result?;

    if sheet.is_empty() {
        tracing::info!(
            from = %query.date_from(),
            to = %query.date_to(),
            "no transactions in range; nothing to report"
        );
        return Ok(());
    }

    let rendered = match args.format {
        ReportFormat::Csv => {
            let mut buf = Vec::new();
            sheet.write_csv(&mut buf).context("render csv")?;
            buf
        }
        ReportFormat::Html => sheet.to_html().into_bytes(),
        ReportFormat::Json => serde_json::to_vec_pretty(&sheet).context("render json")?,
    };

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create report output dir: {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if args.force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options
        .open(out_path)
        .with_context(|| format!("open report output: {}", out_path.display()))?;
    file.write_all(&rendered)
        .with_context(|| format!("write report: {}", out_path.display()))?;
    file.flush()
        .with_context(|| format!("flush report: {}", out_path.display()))?;

    tracing::info!(
        out = %out_path.display(),
        columns = sheet.columns().len(),
        "wrote report"
    );
    Ok(())
}

/// Inclusive calendar-day range of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuery {
    date_from: NaiveDate,
    date_to: NaiveDate,
}

impl ReportQuery {
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> anyhow::Result<Self> {
        if date_from > date_to {
            anyhow::bail!("report range is reversed: {date_from} is after {date_to}");
        }
        Ok(Self { date_from, date_to })
    }

    pub fn date_from(&self) -> NaiveDate {
        self.date_from
    }

    pub fn date_to(&self) -> NaiveDate {
        self.date_to
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let date = at.date();
        self.date_from <= date && date <= self.date_to
    }

    /// Every calendar day of the range, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let date_to = self.date_to;
        std::iter::successors(Some(self.date_from), move |d| {
            d.checked_add_days(Days::new(1)).filter(|next| *next <= date_to)
        })
    }

    pub fn day_count(&self) -> usize {
        (self.date_to - self.date_from).num_days() as usize + 1
    }
}

/// Counts keyed by label. Keys seen for the first time are appended with a
/// zero count before being incremented, so nothing is ever dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally<K> {
    counts: Vec<(K, u64)>,
}

impl<K: PartialEq> Tally<K> {
    pub fn with_keys(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            counts: keys.into_iter().map(|k| (k, 0)).collect(),
        }
    }

    pub fn increment(&mut self, key: K) {
        match self.counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((key, 1)),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.counts
            .iter()
            .find(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)
            .map_or(0, |(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(k, count)| (k, *count))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, count)| count).sum()
    }
}

/// Activity of one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayReport {
    pub date: NaiveDate,
    pub entries: Vec<ReportRow>,
    pub status: Tally<String>,
    pub language: Tally<LanguageCode>,
    pub audience: Tally<AudienceCode>,
    pub topic: Tally<TopicCode>,
}

impl DayReport {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
            status: Tally::with_keys(KNOWN_STATUSES.iter().map(|s| (*s).to_owned())),
            language: Tally::with_keys(LanguageCode::ALL),
            audience: Tally::with_keys(AudienceCode::ALL),
            topic: Tally::with_keys(TopicCode::ALL),
        }
    }

    /// Status is always counted; classifications only for check-outs.
    fn record(&mut self, row: ReportRow) {
        self.status.increment(row.status.clone());
        if row.status == STATUS_CHECKED_OUT {
            self.language.increment(row.language);
            self.audience.increment(row.audience);
            self.topic.increment(row.topic);
        }
        self.entries.push(row);
    }
}

/// Buckets joined rows per calendar day over the whole query range.
///
/// Days without activity get an empty report. No rows at all means there is
/// nothing to report and the result is empty.
pub fn prepare_report(query: &ReportQuery, rows: Vec<ReportRow>) -> Vec<DayReport> {
    if rows.is_empty() {
        return Vec::new();
    }

    let mut per_date: BTreeMap<NaiveDate, DayReport> = BTreeMap::new();
    for row in rows {
        let date = row.entry_date.date();
        per_date
            .entry(date)
            .or_insert_with(|| DayReport::empty(date))
            .record(row);
    }

    let reports = query
        .days()
        .map(|date| {
            per_date
                .remove(&date)
                .unwrap_or_else(|| DayReport::empty(date))
        })
        .collect::<Vec<_>>();

    if !per_date.is_empty() {
        tracing::debug!(
            dates = per_date.len(),
            "ignoring rows dated outside the report range"
        );
    }
    reports
}

/// Query, aggregate and lay out a report for `query`.
pub async fn export_report(store: &dyn Store, query: &ReportQuery) -> anyhow::Result<Sheet> {
    let rows = store
        .select_report_rows(query)
        .await
        .context("select report rows")?;
    tracing::info!(
        rows = rows.len(),
        from = %query.date_from(),
        to = %query.date_to(),
        "preparing report"
    );

    let days = prepare_report(query, rows);
    Ok(layout_report(&days))
}
