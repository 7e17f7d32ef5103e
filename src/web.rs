use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use percent_encoding::percent_decode_str;
use tracing::{info, warn};
use warp::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    path::FullPath,
    reply::{self, Reply, Response},
    Filter, Rejection,
};

use crate::{
    database::{Database, Databases},
    error::{self, Error},
    filters::{self, ActiveFilters},
    permission::{Actor, Actors, Permissions},
    registry::{ChartSpec, Dashboard, Registry},
    view,
};

/// Client-side chart renderer, always served at `/-/static/dashboards.js`.
const DASHBOARDS_JS: &str = include_str!("../static/dashboards.js");

/// Read-only state shared by every request.
pub(crate) struct App {
    pub(crate) registry: Registry,
    pub(crate) databases: Databases,
    pub(crate) permissions: Permissions,
    pub(crate) actors: Actors,
}

impl App {
    pub(crate) fn new(
        registry: Registry,
        databases: Databases,
        permissions: Permissions,
        actors: Actors,
    ) -> Self {
        for dashboard in registry.dashboards() {
            for name in dashboard.databases() {
                if !databases.contains(name) {
                    warn!(
                        "Dashboard {} uses unconfigured database {}",
                        dashboard.slug, name
                    );
                }
            }
        }
        Self {
            registry,
            databases,
            permissions,
            actors,
        }
    }

    fn dashboard(&self, slug: &str) -> Result<&Dashboard, Error> {
        self.registry
            .get(slug)
            .ok_or_else(|| Error::NotFound(format!("Dashboard not found: {slug}")))
    }

    /// Looks up a database and checks that `actor` may run SQL on it.
    fn sql_database(&self, name: &str, actor: Option<&Actor>) -> Result<&Database, Error> {
        let database = self.databases.get(name)?;
        self.permissions
            .check_execute_sql(database.name(), database.allow_sql(), actor)?;
        Ok(database)
    }
}

/// The parts of a request every dashboard route looks at.
struct RequestInfo {
    path: String,
    params: Vec<(String, String)>,
    authorization: Option<String>,
    /// Values of every `Cookie` header, in request order.
    cookies: Vec<String>,
}

impl RequestInfo {
    fn actor<'a>(&self, app: &'a App) -> Option<&'a Actor> {
        app.actors.authenticate(self.authorization.as_deref())
    }
}

fn request_info() -> impl Filter<Extract = (RequestInfo,), Error = Rejection> + Clone {
    warp::path::full()
        .and(warp::query::<Vec<(String, String)>>())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::header::headers_cloned())
        .map(
            |path: FullPath,
             params: Vec<(String, String)>,
             authorization: Option<String>,
             headers: HeaderMap| RequestInfo {
                path: path.as_str().to_string(),
                params,
                authorization,
                cookies: headers
                    .get_all(header::COOKIE)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .map(String::from)
                    .collect(),
            },
        )
}

fn with_app(app: Arc<App>) -> impl Filter<Extract = (Arc<App>,), Error = Infallible> + Clone {
    warp::any().map(move || app.clone())
}

pub(crate) fn routes(
    app: Arc<App>,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let base = warp::get().and(warp::path("-")).and(warp::path("dashboards"));

    let list = base
        .clone()
        .and(warp::path::end())
        .and(with_app(app.clone()))
        .and(request_info())
        .and_then(list_handler);

    let dashboard = base
        .clone()
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_app(app.clone()))
        .and(request_info())
        .and_then(|slug: String, app: Arc<App>, req: RequestInfo| {
            dashboard_handler(app, slug, req, false)
        });

    let dashboard_embed = base
        .clone()
        .and(warp::path::param::<String>())
        .and(warp::path("embed"))
        .and(warp::path::end())
        .and(with_app(app.clone()))
        .and(request_info())
        .and_then(|slug: String, app: Arc<App>, req: RequestInfo| {
            dashboard_handler(app, slug, req, true)
        });

    let chart = base
        .clone()
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_app(app.clone()))
        .and(request_info())
        .and_then(|slug: String, chart_slug: String, app: Arc<App>, req: RequestInfo| {
            chart_handler(app, slug, chart_slug, req, false)
        });

    let chart_embed = base
        .clone()
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path("embed"))
        .and(warp::path::end())
        .and(with_app(app.clone()))
        .and(request_info())
        .and_then(|slug: String, chart_slug: String, app: Arc<App>, req: RequestInfo| {
            chart_handler(app, slug, chart_slug, req, true)
        });

    let chart_data = base
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path("data"))
        .and(warp::path::end())
        .and(with_app(app))
        .and(request_info())
        .and_then(data_handler);

    let script = warp::get()
        .and(warp::path("-"))
        .and(warp::path("static"))
        .and(warp::path("dashboards.js"))
        .and(warp::path::end())
        .map(|| {
            reply::with_header(
                DASHBOARDS_JS,
                header::CONTENT_TYPE,
                "text/javascript; charset=utf-8",
            )
            .into_response()
        });

    list.or(dashboard)
        .unify()
        .or(dashboard_embed)
        .unify()
        .or(chart)
        .unify()
        .or(chart_embed)
        .unify()
        .or(chart_data)
        .unify()
        .or(script)
        .unify()
        .recover(error::recover)
        .unify()
}

/// Runs the web server.
pub(crate) async fn serve(app: Arc<App>, addr: SocketAddr, static_dir: Option<PathBuf>) {
    let log = warp::log("sql_dashboard_server::access");
    let routes = routes(app);
    info!("Listening on {}", addr);
    if let Some(dir) = static_dir {
        let statics = warp::get()
            .and(warp::path("-"))
            .and(warp::path("static"))
            .and(warp::fs::dir(dir));
        warp::serve(statics.or(routes).with(log)).run(addr).await;
    } else {
        warp::serve(routes.with(log)).run(addr).await;
    }
}

async fn list_handler(app: Arc<App>, req: RequestInfo) -> Result<Response, Rejection> {
    app.permissions.check_view_instance(req.actor(&app))?;
    let html = view::dashboard_list(&app.registry).map_err(Error::from)?;
    Ok(reply::html(html).into_response())
}

async fn dashboard_handler(
    app: Arc<App>,
    slug: String,
    req: RequestInfo,
    embed: bool,
) -> Result<Response, Rejection> {
    let actor = req.actor(&app);
    app.permissions.check_view_instance(actor)?;
    let dashboard = app.dashboard(&decode(&slug))?;
    for name in dashboard.databases() {
        app.sql_database(name, actor)?;
    }

    let active = ActiveFilters::resolve(dashboard, &req.params);
    if let Some(location) = filters::default_redirect(dashboard, &active, &req.path) {
        info!("Redirecting {} to its default filters", dashboard.slug);
        return Ok(redirect(&location, &req.cookies)?);
    }

    let options = filters::resolve_options(dashboard, &app.databases).await?;
    let page = view::DashboardPage {
        dashboard,
        charts: dashboard
            .charts
            .values()
            .map(|chart| chart.with_filters(&active))
            .collect(),
        active: &active,
        options: &options,
        embed,
    };
    let html = view::dashboard(&page).map_err(Error::from)?;
    Ok(reply::html(html).into_response())
}

/// Resolves the dashboard and chart of a chart route and checks access.
fn find_chart<'a>(
    app: &'a App,
    slug: &str,
    chart_slug: &str,
    actor: Option<&Actor>,
) -> Result<(&'a Dashboard, &'a ChartSpec), Error> {
    app.permissions.check_view_instance(actor)?;
    let dashboard = app.dashboard(&decode(slug))?;
    let chart_slug = decode(chart_slug);
    let chart = dashboard
        .chart(&chart_slug)
        .ok_or_else(|| Error::NotFound(format!("Chart does not exist: {chart_slug}")))?;
    if let Some(name) = chart.database.as_deref() {
        app.sql_database(name, actor)?;
    }
    Ok((dashboard, chart))
}

async fn chart_handler(
    app: Arc<App>,
    slug: String,
    chart_slug: String,
    req: RequestInfo,
    embed: bool,
) -> Result<Response, Rejection> {
    let (dashboard, chart) = find_chart(&app, &slug, &chart_slug, req.actor(&app))?;
    let active = ActiveFilters::resolve(dashboard, &req.params);
    let page = view::ChartPage {
        dashboard,
        chart: chart.with_filters(&active),
        active: &active,
        embed,
    };
    let html = view::chart(&page).map_err(Error::from)?;
    Ok(reply::html(html).into_response())
}

async fn data_handler(
    slug: String,
    chart_slug: String,
    app: Arc<App>,
    req: RequestInfo,
) -> Result<Response, Rejection> {
    let (dashboard, chart) = find_chart(&app, &slug, &chart_slug, req.actor(&app))?;
    let active = ActiveFilters::resolve(dashboard, &req.params);
    let chart = chart.with_filters(&active);
    let Some((name, query)) = chart.sql() else {
        return Err(Error::NotFound(format!("Chart has no query: {}", chart.slug)).into());
    };
    let params = active
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let result = app.databases.get(name)?.execute(query, params).await?;
    Ok(reply::json(&result).into_response())
}

/// A `302 Found` to `location` that echoes the request's cookies.
fn redirect(location: &str, cookies: &[String]) -> Result<Response, Error> {
    let mut res = reply::with_status(reply::reply(), StatusCode::FOUND).into_response();
    let headers = res.headers_mut();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(location).context("invalid redirect location")?,
    );
    for (name, value) in cookies.iter().flat_map(|header| parse_cookies(header)) {
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_str(&format!("{name}={value}")).context("invalid cookie")?,
        );
    }
    Ok(res)
}

fn parse_cookies(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| !name.is_empty())
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::Value;
    use warp::{http::Response as HttpResponse, hyper::body::Bytes};

    use super::*;
    use crate::{
        database::{create_jobs_db, DatabaseSettings},
        registry::SAMPLE,
    };

    const TOKEN: &str = "t0k3n";

    struct TestApp {
        _dir: tempfile::TempDir, // to prevent the database file from being deleted while the test is running
        app: Arc<App>,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with(SAMPLE, "")
        }

        fn with(registry: &str, permissions: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = create_jobs_db(dir.path());
            let databases = Databases::new(
                HashMap::from([(
                    "jobs".to_string(),
                    DatabaseSettings {
                        path,
                        allow_sql: None,
                    },
                )]),
                1000,
            );
            let actors: Actors = toml::from_str(&format!("[{TOKEN}]\nid = \"user\"\n")).unwrap();
            let app = App::new(
                Registry::from_toml(registry).unwrap(),
                databases,
                toml::from_str(permissions).unwrap(),
                actors,
            );
            Self {
                _dir: dir,
                app: Arc::new(app),
            }
        }

        async fn get(&self, path: &str) -> HttpResponse<Bytes> {
            warp::test::request()
                .path(path)
                .reply(&routes(self.app.clone()))
                .await
        }

        async fn get_as_user(&self, path: &str) -> HttpResponse<Bytes> {
            warp::test::request()
                .path(path)
                .header("authorization", format!("Bearer {TOKEN}"))
                .reply(&routes(self.app.clone()))
                .await
        }
    }

    fn text(res: &HttpResponse<Bytes>) -> String {
        String::from_utf8(res.body().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn dashboard_list() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards").await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = text(&res);
        assert!(body.contains("<h1>Dashboards</h1>"));
        assert!(body.contains(r#"<a href="/-/dashboards/job-dashboard">Job dashboard</a>"#));
        assert!(body.contains(r#"<a href="/-/dashboards/no-filters">No filters</a>"#));
    }

    #[tokio::test]
    async fn dashboard_list_empty() {
        let app = TestApp::with("", "");
        let res = app.get("/-/dashboards").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(text(&res).contains("<p>No dashboards found</p>"));
    }

    #[tokio::test]
    async fn dashboard_list_permissions() {
        for (permissions, authenticated, expected) in [
            ("allow = false", false, StatusCode::FORBIDDEN),
            ("allow = false", true, StatusCode::FORBIDDEN),
            ("allow = true", false, StatusCode::OK),
            ("allow = true", true, StatusCode::OK),
            (r#"allow = { id = "user" }"#, false, StatusCode::FORBIDDEN),
            (r#"allow = { id = "user" }"#, true, StatusCode::OK),
        ] {
            let app = TestApp::with(SAMPLE, permissions);
            let res = if authenticated {
                app.get_as_user("/-/dashboards").await
            } else {
                app.get("/-/dashboards").await
            };
            assert_eq!(res.status(), expected, "{permissions} / {authenticated}");
        }
    }

    #[tokio::test]
    async fn dashboard_view() {
        let app = TestApp::new();
        let res = app
            .get("/-/dashboards/job-dashboard?date_start=2021-01-01&unknown=1")
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = text(&res);
        assert!(body.contains("<h1>Job dashboard</h1>"));
        assert!(body.contains("<p>Gathering metrics about jobs</p>"));
        assert!(!body.contains("grid-template-areas"));
        // Options of the dynamic filter come from the database.
        assert!(body.contains(r#"<option value="APEC">APEC</option>"#));
        assert!(body.contains(r#"<option value="Indeed">Indeed</option>"#));
        assert!(body.contains(
            r#"<a href="/-/dashboards/job-dashboard/offers-count?date_start=2021-01-01">Total number of offers</a>"#
        ));
        assert!(!body.contains("unknown=1"));
    }

    #[tokio::test]
    async fn dashboard_redirects_to_defaults() {
        let app = TestApp::new();
        let res = warp::test::request()
            .path("/-/dashboards/job-dashboard?other=1")
            .header("cookie", "ds_actor=abc; theme=dark")
            .reply(&routes(app.app.clone()))
            .await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(
            res.headers()[header::LOCATION],
            "/-/dashboards/job-dashboard?date_start=2021-01-01"
        );
        let cookies: Vec<_> = res
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies, ["ds_actor=abc", "theme=dark"]);
    }

    #[tokio::test]
    async fn no_redirect_with_empty_filter() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/job-dashboard?date_end=").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_redirect_without_defaults() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/no-filters").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(text(&res).contains("<h1>No filters</h1>"));
    }

    #[tokio::test]
    async fn dashboard_embed() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/job-dashboard/embed").await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(
            res.headers()[header::LOCATION],
            "/-/dashboards/job-dashboard/embed?date_start=2021-01-01"
        );

        let res = app
            .get("/-/dashboards/job-dashboard/embed?date_start=2021-01-01")
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = text(&res);
        assert!(body.contains("<h1>Job dashboard</h1>"));
        assert!(!body.contains(r#"<li><a href="/-/dashboards">Dashboards</a></li>"#));
    }

    #[tokio::test]
    async fn dashboard_view_percent_encoded_slug() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/job%2Ddashboard?date_start=x").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dashboard_view_unknown() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/unknown-dashboard").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dashboard_view_unknown_chart_db() {
        let registry = SAMPLE.replacen(
            "db = \"jobs\"\nquery = \"SELECT count(*)",
            "db = \"unknown_db\"\nquery = \"SELECT count(*)",
            1,
        );
        let app = TestApp::with(&registry, "");
        let res = app.get("/-/dashboards/job-dashboard?date_start=x").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(&res), "Database does not exist: unknown_db");
    }

    #[tokio::test]
    async fn chart_view_unknown_chart_db() {
        let registry = SAMPLE.replacen(
            "db = \"jobs\"\nquery = \"SELECT count(*)",
            "db = \"unknown_db\"\nquery = \"SELECT count(*)",
            1,
        );
        let app = TestApp::with(&registry, "");
        for path in [
            "/-/dashboards/job-dashboard/offers-count",
            "/-/dashboards/job-dashboard/offers-count/embed",
            "/-/dashboards/job-dashboard/offers-count/data",
        ] {
            let res = app.get(path).await;
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
            assert_eq!(text(&res), "Database does not exist: unknown_db");
        }
        // Other charts of the dashboard are unaffected.
        let res = app.get("/-/dashboards/job-dashboard/offers-day").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dashboard_view_permissions() {
        let path = "/-/dashboards/job-dashboard?date_start=2021-01-01";
        for (permissions, authenticated, expected) in [
            ("allow = false", false, StatusCode::FORBIDDEN),
            ("allow = false", true, StatusCode::FORBIDDEN),
            ("allow_sql = false", false, StatusCode::FORBIDDEN),
            ("allow_sql = false", true, StatusCode::FORBIDDEN),
            ("allow = true", false, StatusCode::OK),
            ("allow_sql = true", true, StatusCode::OK),
            (r#"allow = { id = "user" }"#, false, StatusCode::FORBIDDEN),
            (r#"allow = { id = "user" }"#, true, StatusCode::OK),
            (r#"allow_sql = { id = "user" }"#, false, StatusCode::FORBIDDEN),
            (r#"allow_sql = { id = "user" }"#, true, StatusCode::OK),
        ] {
            let app = TestApp::with(SAMPLE, permissions);
            let res = if authenticated {
                app.get_as_user(path).await
            } else {
                app.get(path).await
            };
            assert_eq!(res.status(), expected, "{permissions} / {authenticated}");
        }
    }

    #[tokio::test]
    async fn permission_is_checked_before_redirect() {
        let app = TestApp::with(SAMPLE, "allow_sql = false");
        let res = app.get("/-/dashboards/job-dashboard").await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn dashboard_chart() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/job-dashboard/offers-day").await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = text(&res);
        assert!(body.contains(r#"<li><a href="/-/dashboards">Dashboards</a></li>"#));
        assert!(body.contains("Job dashboard</a></h1>"));
        assert!(body.contains("Number of offers by day"));
        assert!(body.contains("View SQL results"));

        let res = app.get("/-/dashboards/job-dashboard/analysis-note").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!text(&res).contains("View SQL results"));
    }

    #[tokio::test]
    async fn dashboard_chart_parameters() {
        let app = TestApp::new();
        let res = app
            .get("/-/dashboards/job-dashboard/offers-day?date_start=2021-01-01")
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(text(&res).contains(
            "SELECT date(date) as day, count(*) as count FROM offers_view WHERE TRUE  AND date &gt;= date(:date_start)   GROUP BY day ORDER BY day"
        ));

        let res = app
            .get("/-/dashboards/job-dashboard/offers-day?date_start=")
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(text(&res).contains(
            "SELECT date(date) as day, count(*) as count FROM offers_view WHERE TRUE   GROUP BY day ORDER BY day"
        ));
    }

    #[tokio::test]
    async fn dashboard_chart_embed() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/job-dashboard/offers-day/embed").await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = text(&res);
        assert!(!body.contains(r#"<li><a href="/-/dashboards">Dashboards</a></li>"#));
        assert!(body.contains(r#"data-library="vega""#));
    }

    #[tokio::test]
    async fn dashboard_chart_unknown() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/unknown-dashboard/offers-day").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let res = app.get("/-/dashboards/job-dashboard/unknown-chart").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(&res), "Chart does not exist: unknown-chart");
    }

    #[tokio::test]
    async fn chart_data() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/job-dashboard/offers-day/data").await;
        assert_eq!(res.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(json["columns"], serde_json::json!(["day", "count"]));
        assert_eq!(json["rows"].as_array().unwrap().len(), 4);
        assert_eq!(json["truncated"], false);

        let res = app
            .get("/-/dashboards/job-dashboard/offers-day/data?date_start=2021-02-01")
            .await;
        let json: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            json["rows"],
            serde_json::json!([
                {"day": "2021-02-01", "count": 1},
                {"day": "2021-03-01", "count": 1},
            ])
        );

        let res = app
            .get("/-/dashboards/job-dashboard/offers-count/data?source=Indeed")
            .await;
        let json: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(json["rows"], serde_json::json!([{"count": 2}]));
    }

    #[tokio::test]
    async fn chart_data_without_query() {
        let app = TestApp::new();
        let res = app.get("/-/dashboards/job-dashboard/analysis-note/data").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chart_data_forbidden() {
        let app = TestApp::with(SAMPLE, r#"allow_sql = { id = "user" }"#);
        let res = app.get("/-/dashboards/job-dashboard/offers-day/data").await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let res = app.get_as_user("/-/dashboards/job-dashboard/offers-day/data").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn method_not_allowed() {
        let app = TestApp::new();
        let res = warp::test::request()
            .method("POST")
            .path("/-/dashboards")
            .reply(&routes(app.app.clone()))
            .await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn redirect_echoes_every_cookie_header() {
        let cookies = [
            "ds_actor=abc".to_string(),
            "theme=dark; lang=fr".to_string(),
        ];
        let res = redirect("/-/dashboards/d?x=1", &cookies).unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "/-/dashboards/d?x=1");
        let echoed: Vec<_> = res
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(echoed, ["ds_actor=abc", "theme=dark", "lang=fr"]);
    }

    #[tokio::test]
    async fn chart_renderer_script() {
        let app = TestApp::new();
        let res = app.get("/-/static/dashboards.js").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "text/javascript; charset=utf-8"
        );
        let body = text(&res);
        assert!(body.contains("function toggleFullscreen()"));
        assert!(body.contains("['vega-lite', renderVegaLiteChart]"));
        assert!(body.contains("el.dataset.url"));

        let res = app.get("/-/static/other.js").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn cookies_are_parsed() {
        let cookies: Vec<_> = parse_cookies("a=1; b = 2;; =x; c=d=e").collect();
        assert_eq!(cookies, [("a", "1"), ("b ", " 2"), ("c", "d=e")]);
    }
}
