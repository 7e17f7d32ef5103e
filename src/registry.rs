//! Dashboard registry: the declarative description of every dashboard, its
//! filters and its charts.
//!
//! The registry is loaded once at start-up and never mutated afterwards, so it
//! can be shared freely between request handlers. Declaration order of
//! dashboards, filters and charts is preserved.

use std::{fmt, fs, path::Path};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::{filters::ActiveFilters, template};

#[derive(Debug, Default)]
pub(crate) struct Registry {
    dashboards: IndexMap<String, Dashboard>,
}

impl Registry {
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read dashboards file {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("invalid dashboards file {}", path.display()))
    }

    pub(crate) fn from_toml(text: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(text)?;
        let mut dashboards = IndexMap::with_capacity(file.dashboards.len());
        for (slug, raw) in file.dashboards {
            let dashboard = Dashboard::from_raw(&slug, raw)
                .with_context(|| format!("dashboard `{slug}`"))?;
            dashboards.insert(slug, dashboard);
        }
        Ok(Self { dashboards })
    }

    pub(crate) fn get(&self, slug: &str) -> Option<&Dashboard> {
        self.dashboards.get(slug)
    }

    pub(crate) fn dashboards(&self) -> impl Iterator<Item = &Dashboard> {
        self.dashboards.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.dashboards.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.dashboards.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct Dashboard {
    pub(crate) slug: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) settings: DashboardSettings,
    pub(crate) filters: IndexMap<String, FilterSpec>,
    pub(crate) charts: IndexMap<String, ChartSpec>,
    pub(crate) layout: Option<Vec<Vec<String>>>,
}

impl Dashboard {
    fn from_raw(slug: &str, raw: RawDashboard) -> Result<Self> {
        let mut filters = IndexMap::with_capacity(raw.filters.len());
        for (key, flt) in raw.filters {
            let spec = FilterSpec::from_raw(&key, flt).with_context(|| format!("filter `{key}`"))?;
            filters.insert(key, spec);
        }
        let charts = raw
            .charts
            .into_iter()
            .map(|(chart_slug, chart)| {
                let spec = ChartSpec {
                    slug: chart_slug.clone(),
                    title: chart.title,
                    database: chart.db,
                    query: chart.query,
                    kind: ChartKind::from(chart.library.as_deref().unwrap_or_default()),
                    display: chart.display,
                    settings: chart.settings,
                };
                (chart_slug, spec)
            })
            .collect();
        Ok(Self {
            slug: slug.to_string(),
            title: raw.title,
            description: raw.description,
            settings: raw.settings,
            filters,
            charts,
            layout: raw.layout,
        })
    }

    pub(crate) fn chart(&self, slug: &str) -> Option<&ChartSpec> {
        self.charts.get(slug)
    }

    /// Names of the databases referenced by any chart, in first-use order.
    pub(crate) fn databases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for db in self.charts.values().filter_map(|c| c.database.as_deref()) {
            if !names.contains(&db) {
                names.push(db);
            }
        }
        names
    }

    /// Filters with a default value, keyed by filter name.
    pub(crate) fn default_filters(&self) -> IndexMap<&str, &str> {
        self.filters
            .iter()
            .filter_map(|(key, spec)| Some((key.as_str(), spec.default.as_deref()?)))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct DashboardSettings {
    pub(crate) allow_fullscreen: bool,
    /// Reload period of the dashboard page, in minutes.
    pub(crate) autorefresh: Option<f64>,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            allow_fullscreen: true,
            autorefresh: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterKind {
    Text,
    Date,
    Number,
    Select,
    Other,
}

impl From<&str> for FilterKind {
    fn from(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "date" => Self::Date,
            "number" => Self::Number,
            "select" => Self::Select,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DynamicSource {
    pub(crate) database: String,
    pub(crate) query: String,
}

/// Where the choices of a `select` filter come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FilterOptions {
    None,
    Static(Vec<String>),
    Dynamic(DynamicSource),
}

#[derive(Debug)]
pub(crate) struct FilterSpec {
    pub(crate) key: String,
    pub(crate) name: Option<String>,
    pub(crate) kind: FilterKind,
    /// Only truthy defaults are kept: `0`, `false`, `""` and empty
    /// collections count as no default.
    pub(crate) default: Option<String>,
    pub(crate) options: FilterOptions,
}

impl FilterSpec {
    fn from_raw(key: &str, raw: RawFilter) -> Result<Self> {
        let kind = FilterKind::from(raw.kind.as_deref().unwrap_or_default());
        let dynamic = match (raw.db, raw.query) {
            (Some(database), Some(query)) => Some(DynamicSource { database, query }),
            (None, None) => None,
            _ => bail!("`db` and `query` must be given together"),
        };
        let options = match (raw.options, dynamic) {
            (Some(_), Some(_)) => bail!("`options` cannot be combined with `db` and `query`"),
            (Some(values), None) => {
                FilterOptions::Static(values.iter().map(scalar_to_string).collect())
            }
            (None, Some(source)) => FilterOptions::Dynamic(source),
            (None, None) => FilterOptions::None,
        };
        if kind != FilterKind::Select && options != FilterOptions::None {
            bail!("options are only allowed on `select` filters");
        }
        Ok(Self {
            key: key.to_string(),
            name: raw.name,
            kind,
            default: raw
                .default
                .as_ref()
                .filter(|value| is_truthy(value))
                .map(scalar_to_string),
            options,
        })
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChartKind {
    Vega,
    VegaLite,
    Metric,
    Markdown,
    Table,
    Map,
    Other(String),
}

impl ChartKind {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::Vega => "vega",
            Self::VegaLite => "vega-lite",
            Self::Metric => "metric",
            Self::Markdown => "markdown",
            Self::Table => "table",
            Self::Map => "map",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for ChartKind {
    fn from(value: &str) -> Self {
        match value {
            "vega" => Self::Vega,
            "vega-lite" => Self::VegaLite,
            "metric" => Self::Metric,
            "markdown" => Self::Markdown,
            "table" => Self::Table,
            "map" => Self::Map,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChartKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChartSpec {
    pub(crate) slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    #[serde(rename = "db", skip_serializing_if = "Option::is_none")]
    pub(crate) database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) query: Option<String>,
    #[serde(rename = "library")]
    pub(crate) kind: ChartKind,
    pub(crate) display: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) settings: Option<serde_json::Value>,
}

impl ChartSpec {
    /// Returns a copy whose query has its optional fragments resolved.
    pub(crate) fn with_filters(&self, active: &ActiveFilters) -> ChartSpec {
        ChartSpec {
            query: self
                .query
                .as_deref()
                .map(|query| template::render_query(query, active)),
            ..self.clone()
        }
    }

    /// Database and query, when the chart is backed by SQL.
    pub(crate) fn sql(&self) -> Option<(&str, &str)> {
        if self.kind == ChartKind::Markdown {
            return None;
        }
        Some((self.database.as_deref()?, self.query.as_deref()?))
    }
}

fn is_truthy(value: &toml::Value) -> bool {
    match value {
        toml::Value::String(s) => !s.is_empty(),
        toml::Value::Integer(i) => *i != 0,
        toml::Value::Float(f) => *f != 0.0,
        toml::Value::Boolean(b) => *b,
        toml::Value::Array(values) => !values.is_empty(),
        toml::Value::Table(table) => !table.is_empty(),
        toml::Value::Datetime(_) => true,
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    dashboards: IndexMap<String, RawDashboard>,
}

#[derive(Debug, Deserialize)]
struct RawDashboard {
    title: String,
    description: Option<String>,
    #[serde(default)]
    settings: DashboardSettings,
    #[serde(default)]
    filters: IndexMap<String, RawFilter>,
    #[serde(default)]
    charts: IndexMap<String, RawChart>,
    layout: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Deserialize)]
struct RawFilter {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    default: Option<toml::Value>,
    options: Option<Vec<toml::Value>>,
    db: Option<String>,
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChart {
    title: Option<String>,
    db: Option<String>,
    query: Option<String>,
    library: Option<String>,
    #[serde(default)]
    display: serde_json::Value,
    settings: Option<serde_json::Value>,
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r##"
[dashboards.job-dashboard]
title = "Job dashboard"
description = "Gathering metrics about jobs"

[dashboards.job-dashboard.settings]
allow_fullscreen = true
autorefresh = 1

[dashboards.job-dashboard.filters.date_start]
name = "Date Start"
type = "date"
default = "2021-01-01"

[dashboards.job-dashboard.filters.date_end]
name = "Date End"
type = "date"

[dashboards.job-dashboard.filters.source]
name = "Source"
type = "select"
db = "jobs"
query = "SELECT DISTINCT source FROM offers_view ORDER BY source"

[dashboards.job-dashboard.filters.level]
type = "select"
options = ["junior", "senior"]

[dashboards.job-dashboard.charts.analysis-note]
library = "markdown"
display = "# Analysis details"

[dashboards.job-dashboard.charts.offers-count]
title = "Total number of offers"
db = "jobs"
query = "SELECT count(*) as count FROM offers_view WHERE TRUE [[ AND source = :source ]]"
library = "metric"
display = { field = "count", prefix = "", suffix = " offers" }

[dashboards.job-dashboard.charts.offers-day]
title = "Number of offers by day"
db = "jobs"
query = "SELECT date(date) as day, count(*) as count FROM offers_view WHERE TRUE [[ AND date >= date(:date_start) ]] [[ AND date <= date(:date_end) ]] GROUP BY day ORDER BY day"
library = "vega"
display = { mark = { type = "line", tooltip = true }, encoding = { x = { field = "day", type = "temporal" } } }

[dashboards.no-filters]
title = "No filters"

[dashboards.no-filters.charts.total]
title = "Total"
db = "jobs"
query = "SELECT count(*) as count FROM offers_view"
library = "metric"
display = { field = "count" }
"##;
