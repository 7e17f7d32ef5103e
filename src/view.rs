//! HTML pages for the dashboard list, dashboards and single charts.
//!
//! Pages only carry markup and chart markers; drawing is left to the client
//! script served from `/-/static/dashboards.js`, which keys off each chart's
//! `data-library` attribute and reads its spec from the embedded JSON.

use std::fmt::Write;

use anyhow::Result;
use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{
    filters::ActiveFilters,
    registry::{ChartKind, ChartSpec, Dashboard, FilterKind, FilterSpec, Registry},
};

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub(crate) const LIST_PATH: &str = "/-/dashboards";

/// Client libraries the chart renderer draws with.
const VENDOR_SCRIPTS: [&str; 6] = [
    "https://cdn.jsdelivr.net/npm/vega@5",
    "https://cdn.jsdelivr.net/npm/vega-lite@5",
    "https://cdn.jsdelivr.net/npm/vega-embed@6",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
    "https://cdn.jsdelivr.net/npm/marked@12/marked.min.js",
    "https://cdn.jsdelivr.net/npm/dompurify@3/dist/purify.min.js",
];
const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";

/// Everything needed to render one dashboard.
pub(crate) struct DashboardPage<'a> {
    pub(crate) dashboard: &'a Dashboard,
    /// Charts with their optional fragments already resolved.
    pub(crate) charts: Vec<ChartSpec>,
    pub(crate) active: &'a ActiveFilters,
    pub(crate) options: &'a IndexMap<String, Vec<String>>,
    pub(crate) embed: bool,
}

pub(crate) struct ChartPage<'a> {
    pub(crate) dashboard: &'a Dashboard,
    pub(crate) chart: ChartSpec,
    pub(crate) active: &'a ActiveFilters,
    pub(crate) embed: bool,
}

pub(crate) fn dashboard_list(registry: &Registry) -> Result<String> {
    let mut body = String::new();
    writeln!(body, "<h1>Dashboards</h1>")?;
    if registry.is_empty() {
        writeln!(body, "<p>No dashboards found</p>")?;
    }
    for dashboard in registry.dashboards() {
        writeln!(
            body,
            r#"<h2><a href="{}">{}</a></h2>"#,
            dashboard_url(&dashboard.slug),
            escape(&dashboard.title)
        )?;
        if let Some(description) = &dashboard.description {
            writeln!(body, "<p>{}</p>", escape(description))?;
        }
    }
    page("Dashboards", None, false, &body)
}

pub(crate) fn dashboard(view: &DashboardPage<'_>) -> Result<String> {
    let dashboard = view.dashboard;
    let query_string = view.active.query_string();
    let mut body = String::new();

    writeln!(body, "<h1>{}</h1>", escape(&dashboard.title))?;
    if let Some(description) = &dashboard.description {
        writeln!(body, "<p>{}</p>", escape(description))?;
    }
    if !view.embed && !dashboard.filters.is_empty() {
        filter_form(&mut body, dashboard, view.active, view.options)?;
    }
    if dashboard.settings.allow_fullscreen {
        writeln!(
            body,
            r#"<button type="button" class="fullscreen" onclick="toggleFullscreen()">Fullscreen</button>"#
        )?;
    }
    if let Some(layout) = &dashboard.layout {
        grid_style(&mut body, layout)?;
    }

    writeln!(body, r#"<section class="content grid">"#)?;
    for chart in &view.charts {
        writeln!(
            body,
            r#"<div id="card-{}" class="grid-item">"#,
            escape(&chart.slug)
        )?;
        if let Some(title) = &chart.title {
            writeln!(
                body,
                r#"<p><a href="{}">{}</a></p>"#,
                with_query(&chart_url(&dashboard.slug, &chart.slug), &query_string),
                escape(title)
            )?;
        }
        chart_element(&mut body, &dashboard.slug, chart, &query_string, false)?;
        writeln!(body, "</div>")?;
    }
    writeln!(body, "</section>")?;

    let refresh = dashboard
        .settings
        .autorefresh
        .map(|minutes| (minutes * 60.0).round());
    page(&dashboard.title, refresh, view.embed, &body)
}

pub(crate) fn chart(view: &ChartPage<'_>) -> Result<String> {
    let dashboard = view.dashboard;
    let chart = &view.chart;
    let query_string = view.active.query_string();
    let mut body = String::new();

    writeln!(
        body,
        r#"<h1><a href="{}">{}</a></h1>"#,
        with_query(&dashboard_url(&dashboard.slug), &query_string),
        escape(&dashboard.title)
    )?;
    if let Some(title) = &chart.title {
        writeln!(body, "<h2>{}</h2>", escape(title))?;
    }
    writeln!(body, r#"<section class="content">"#)?;
    chart_element(&mut body, &dashboard.slug, chart, &query_string, true)?;
    writeln!(body, "</section>")?;
    if let Some((_, query)) = chart.sql() {
        if !view.embed {
            writeln!(body, "<pre><code>{}</code></pre>", escape(query))?;
        }
        writeln!(
            body,
            r#"<p><a href="{}">View SQL results</a></p>"#,
            with_query(&data_url(&dashboard.slug, &chart.slug), &query_string)
        )?;
    }
    let title = chart.title.as_deref().unwrap_or(&dashboard.title);
    page(title, None, view.embed, &body)
}

fn page(title: &str, refresh: Option<f64>, embed: bool, body: &str) -> Result<String> {
    let mut html = String::new();
    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html>\n<head>")?;
    writeln!(html, r#"<meta charset="utf-8">"#)?;
    if let Some(seconds) = refresh {
        writeln!(html, r#"<meta http-equiv="refresh" content="{seconds}">"#)?;
    }
    writeln!(html, "<title>{}</title>", escape(title))?;
    writeln!(html, r#"<link rel="stylesheet" href="{LEAFLET_CSS}">"#)?;
    for src in VENDOR_SCRIPTS {
        writeln!(html, r#"<script src="{src}"></script>"#)?;
    }
    writeln!(html, r#"<script src="/-/static/dashboards.js" defer></script>"#)?;
    writeln!(html, "</head>")?;
    writeln!(html, r#"<body class="{}">"#, if embed { "embed" } else { "page" })?;
    if !embed {
        writeln!(
            html,
            r#"<nav><ul><li><a href="{LIST_PATH}">Dashboards</a></li></ul></nav>"#
        )?;
    }
    html.push_str(body);
    writeln!(html, "</body>\n</html>")?;
    Ok(html)
}

fn filter_form(
    out: &mut String,
    dashboard: &Dashboard,
    active: &ActiveFilters,
    options: &IndexMap<String, Vec<String>>,
) -> Result<()> {
    writeln!(out, r#"<form class="filters" method="get">"#)?;
    for spec in dashboard.filters.values() {
        let value = active.get(&spec.key).unwrap_or_default();
        writeln!(
            out,
            r#"<label for="filter-{key}">{}</label>"#,
            escape(spec.label()),
            key = escape(&spec.key)
        )?;
        match spec.kind {
            FilterKind::Select => {
                let choices = options.get(&spec.key).map_or(&[][..], Vec::as_slice);
                select_input(out, spec, value, choices)?;
            }
            kind => {
                let input_type = match kind {
                    FilterKind::Date => "date",
                    FilterKind::Number => "number",
                    _ => "text",
                };
                writeln!(
                    out,
                    r#"<input id="filter-{key}" type="{input_type}" name="{key}" value="{}">"#,
                    escape(value),
                    key = escape(&spec.key)
                )?;
            }
        }
    }
    writeln!(out, r#"<button type="submit">Apply</button>"#)?;
    writeln!(out, "</form>")?;
    Ok(())
}

fn select_input(
    out: &mut String,
    spec: &FilterSpec,
    value: &str,
    choices: &[String],
) -> Result<()> {
    writeln!(
        out,
        r#"<select id="filter-{key}" name="{key}">"#,
        key = escape(&spec.key)
    )?;
    writeln!(out, r#"<option value="">---</option>"#)?;
    for choice in choices {
        let selected = if choice == value { " selected" } else { "" };
        writeln!(
            out,
            r#"<option value="{0}"{selected}>{0}</option>"#,
            escape(choice)
        )?;
    }
    writeln!(out, "</select>")?;
    Ok(())
}

fn grid_style(out: &mut String, layout: &[Vec<String>]) -> Result<()> {
    write!(out, "<style>\n.grid {{ grid-template-areas: ")?;
    for row in layout {
        out.push('"');
        for slug in row {
            write!(out, "{} ", escape(slug))?;
        }
        out.push_str("\" ");
    }
    writeln!(out, ";}}")?;
    let mut seen: Vec<&str> = Vec::new();
    for slug in layout.iter().flatten() {
        if seen.contains(&slug.as_str()) {
            continue;
        }
        seen.push(slug);
        writeln!(out, "#card-{0} {{ grid-area: {0}; }}", escape(slug))?;
    }
    writeln!(out, "</style>")?;
    Ok(())
}

fn chart_element(
    out: &mut String,
    dashboard_slug: &str,
    chart: &ChartSpec,
    query_string: &str,
    full_height: bool,
) -> Result<()> {
    let id = escape(&chart.slug);
    if chart.kind == ChartKind::Markdown {
        let text = chart.display.as_str().unwrap_or_default();
        writeln!(
            out,
            r#"<div id="chart-{id}" class="markdown" data-library="markdown">{}</div>"#,
            escape(text)
        )?;
        return Ok(());
    }
    let mut data = match chart.sql() {
        Some(_) => format!(
            r#" data-url="{}""#,
            with_query(&data_url(dashboard_slug, &chart.slug), query_string)
        ),
        None => String::new(),
    };
    if full_height {
        data.push_str(" data-full-height");
    }
    if chart.sql().is_some() {
        writeln!(
            out,
            r#"<span id="chart-tooltip-{id}" class="chart-tooltip" style="visibility: hidden" title="Results are truncated">&#9888;</span>"#
        )?;
    }
    writeln!(
        out,
        r#"<div id="chart-{id}" class="chart" data-library="{}"{data}></div>"#,
        escape(chart.kind.as_str())
    )?;
    writeln!(
        out,
        r#"<script type="application/json" id="chart-spec-{id}">{}</script>"#,
        script_json(chart)?
    )?;
    Ok(())
}

pub(crate) fn dashboard_url(slug: &str) -> String {
    format!("{LIST_PATH}/{}", utf8_percent_encode(slug, SEGMENT))
}

pub(crate) fn chart_url(slug: &str, chart_slug: &str) -> String {
    format!(
        "{}/{}",
        dashboard_url(slug),
        utf8_percent_encode(chart_slug, SEGMENT)
    )
}

fn data_url(slug: &str, chart_slug: &str) -> String {
    format!("{}/data", chart_url(slug, chart_slug))
}

fn with_query(url: &str, query_string: &str) -> String {
    if query_string.is_empty() {
        url.to_string()
    } else {
        escape(&format!("{url}?{query_string}"))
    }
}

/// Serializes `value` as JSON safe to place inside a `<script>` element.
fn script_json<T: serde::Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    Ok(json
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026"))
}

pub(crate) fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
