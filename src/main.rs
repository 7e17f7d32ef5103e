mod database;
mod error;
mod filters;
mod permission;
mod registry;
mod settings;
mod template;
mod view;
mod web;

use std::{process::exit, sync::Arc};

use clap::Parser;
use database::Databases;
use registry::Registry;
use settings::{Args, Settings};
use tracing::info;
use tracing_subscriber::EnvFilter;
use web::App;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = match Settings::from_file(&args.config) {
        Ok(ret) => ret,
        Err(error) => {
            eprintln!(
                "Problem while loading settings from {}. {}",
                args.config.display(),
                error
            );
            exit(1);
        }
    };

    let registry = match Registry::from_file(&settings.registry) {
        Ok(ret) => ret,
        Err(error) => {
            eprintln!("Problem while loading dashboards. {error:#}");
            exit(1);
        }
    };
    info!(
        "Loaded {} dashboards from {}",
        registry.len(),
        settings.registry.display()
    );

    let databases = Databases::new(settings.databases, settings.max_returned_rows);
    let app = App::new(registry, databases, settings.permissions, settings.actors);
    web::serve(Arc::new(app), settings.web.address, settings.web.static_dir).await;
}
