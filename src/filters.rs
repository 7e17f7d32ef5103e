//! Reconciles request query parameters with a dashboard's declared filters.

use indexmap::IndexMap;
use tracing::debug;
use url::form_urlencoded;

use crate::{
    database::Databases,
    error::Error,
    registry::{Dashboard, FilterKind, FilterOptions},
};

/// Filter values supplied by the request, restricted to declared filters.
///
/// Entries follow the dashboard's declaration order. Values are kept verbatim;
/// no coercion against the filter type happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ActiveFilters(IndexMap<String, String>);

impl ActiveFilters {
    /// Keeps the request parameters whose key is a declared filter.
    ///
    /// When a key is repeated, its first value wins.
    pub(crate) fn resolve(dashboard: &Dashboard, params: &[(String, String)]) -> Self {
        dashboard
            .filters
            .keys()
            .filter_map(|key| {
                params
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, value)| (key.clone(), value.clone()))
            })
            .collect()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// URL-encoded form of the active filters, for links that keep the
    /// current filter state.
    pub(crate) fn query_string(&self) -> String {
        encode(self.iter())
    }
}

impl FromIterator<(String, String)> for ActiveFilters {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub(crate) fn encode<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Location to redirect to when the request carries no filter but the
/// dashboard declares defaults.
///
/// The redirected request always carries at least one filter, so this cannot
/// loop.
pub(crate) fn default_redirect(
    dashboard: &Dashboard,
    active: &ActiveFilters,
    path: &str,
) -> Option<String> {
    if !active.is_empty() {
        return None;
    }
    let defaults = dashboard.default_filters();
    if defaults.is_empty() {
        return None;
    }
    Some(format!("{path}?{}", encode(defaults)))
}

/// Choices of every `select` filter, keyed by filter name.
///
/// Dynamic sources are queried on each call; the first column of every row
/// becomes an option.
pub(crate) async fn resolve_options(
    dashboard: &Dashboard,
    databases: &Databases,
) -> Result<IndexMap<String, Vec<String>>, Error> {
    let mut resolved = IndexMap::new();
    for (key, spec) in &dashboard.filters {
        if spec.kind != FilterKind::Select {
            continue;
        }
        let options = match &spec.options {
            FilterOptions::None => Vec::new(),
            FilterOptions::Static(values) => values.clone(),
            FilterOptions::Dynamic(source) => {
                debug!("Loading options of filter {} from {}", key, source.database);
                databases
                    .get(&source.database)?
                    .first_column(&source.query)
                    .await?
            }
        };
        resolved.insert(key.clone(), options);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, SAMPLE};

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn active_filters_are_the_intersection() {
        let registry = Registry::from_toml(SAMPLE).unwrap();
        let dashboard = registry.get("job-dashboard").unwrap();
        let active = ActiveFilters::resolve(
            dashboard,
            &params(&[
                ("unknown", "1"),
                ("source", "Indeed"),
                ("date_start", "not a date"),
                ("_shape", "array"),
            ]),
        );
        let pairs: Vec<_> = active.iter().collect();
        assert_eq!(pairs, [("date_start", "not a date"), ("source", "Indeed")]);
        assert_eq!(active.get("date_end"), None);
    }

    #[test]
    fn first_repeated_value_wins() {
        let registry = Registry::from_toml(SAMPLE).unwrap();
        let dashboard = registry.get("job-dashboard").unwrap();
        let active = ActiveFilters::resolve(
            dashboard,
            &params(&[("source", "a"), ("source", "b")]),
        );
        assert_eq!(active.get("source"), Some("a"));
    }

    #[test]
    fn empty_values_are_active() {
        let registry = Registry::from_toml(SAMPLE).unwrap();
        let dashboard = registry.get("job-dashboard").unwrap();
        let active = ActiveFilters::resolve(dashboard, &params(&[("date_start", "")]));
        assert!(!active.is_empty());
        assert_eq!(active.query_string(), "date_start=");
        assert_eq!(
            default_redirect(dashboard, &active, "/-/dashboards/job-dashboard"),
            None
        );
    }

    #[test]
    fn query_string_is_url_encoded() {
        let active: ActiveFilters = [
            ("source".to_string(), "Pôle emploi & co".to_string()),
            ("date_start".to_string(), "2021-01-01".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            active.query_string(),
            "source=P%C3%B4le+emploi+%26+co&date_start=2021-01-01"
        );
    }

    #[test]
    fn redirects_to_defaults_without_filters() {
        let registry = Registry::from_toml(SAMPLE).unwrap();
        let dashboard = registry.get("job-dashboard").unwrap();
        let active = ActiveFilters::resolve(dashboard, &params(&[("other", "x")]));
        assert_eq!(
            default_redirect(dashboard, &active, "/-/dashboards/job-dashboard"),
            Some("/-/dashboards/job-dashboard?date_start=2021-01-01".to_string())
        );

        let active = ActiveFilters::resolve(dashboard, &params(&[("date_end", "2022-01-01")]));
        assert_eq!(default_redirect(dashboard, &active, "/"), None);
    }

    #[test]
    fn no_redirect_without_defaults() {
        let registry = Registry::from_toml(SAMPLE).unwrap();
        let dashboard = registry.get("no-filters").unwrap();
        let active = ActiveFilters::resolve(dashboard, &[]);
        assert_eq!(default_redirect(dashboard, &active, "/"), None);
    }

    #[test]
    fn resolving_twice_gives_the_same_query() {
        let registry = Registry::from_toml(SAMPLE).unwrap();
        let dashboard = registry.get("job-dashboard").unwrap();
        let request = params(&[("date_start", "2021-01-01"), ("date_end", "")]);
        let render = || {
            let active = ActiveFilters::resolve(dashboard, &request);
            let chart = dashboard.chart("offers-day").unwrap().with_filters(&active);
            (active.query_string(), chart.query)
        };
        let first = render();
        assert_eq!(first, render());
        assert_eq!(
            first.1.as_deref(),
            Some("SELECT date(date) as day, count(*) as count FROM offers_view WHERE TRUE  AND date >= date(:date_start)   GROUP BY day ORDER BY day")
        );
    }

    #[tokio::test]
    async fn static_and_empty_options() {
        let registry = Registry::from_toml(
            r#"
            [dashboards.d]
            title = "D"
            [dashboards.d.filters.level]
            type = "select"
            options = ["junior", "senior"]
            [dashboards.d.filters.empty]
            type = "select"
            [dashboards.d.filters.text]
            type = "text"
            "#,
        )
        .unwrap();
        let dashboard = registry.get("d").unwrap();
        let options = resolve_options(dashboard, &Databases::default())
            .await
            .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options["level"], ["junior", "senior"]);
        assert!(options["empty"].is_empty());
    }

    #[tokio::test]
    async fn dynamic_options_need_a_known_database() {
        let registry = Registry::from_toml(SAMPLE).unwrap();
        let dashboard = registry.get("job-dashboard").unwrap();
        let err = resolve_options(dashboard, &Databases::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
