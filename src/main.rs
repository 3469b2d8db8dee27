mod config;
mod error;
mod feed;
mod model;
mod realtime;
mod schedule;
mod stops;

#[cfg(test)]
mod test_utils;

use std::env;
use std::sync::{Arc, Mutex};

use actix_web::{get, middleware::Logger, post, web, App, HttpResponse, HttpServer, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::select;

use crate::config::Config;
use crate::error::TimetableResult;
use crate::feed::{monitor_feed, FeedClient};
use crate::model::TimetableUpdate;
use crate::realtime::RealtimeUpdateManager;
use crate::schedule::ScheduleStore;

#[derive(Clone)]
pub struct ContextData {
    config: Config,
    schedule: ScheduleStore,
    realtime: Arc<Mutex<RealtimeUpdateManager>>,
}

#[derive(Deserialize)]
struct TimesQuery {
    range_start_mins: Option<u32>,
    range_end_mins: Option<u32>,
}

#[derive(Serialize)]
struct TimesResponse {
    /// Lets clients compute countdowns without trusting their own clock.
    current_time: DateTime<Utc>,
    trips: Vec<TimetableUpdate>,
}

#[get("/ok")]
async fn ok() -> TimetableResult<impl Responder> {
    Ok(HttpResponse::Ok().finish())
}

#[get("/stops/{stop_code}/times")]
async fn get_stop_times(
    params: web::Path<(String,)>,
    query: web::Query<TimesQuery>,
    ctx: web::Data<ContextData>,
) -> TimetableResult<impl Responder> {
    let (stop_code,) = params.into_inner();

    let window = stops::DepartureWindow::around_now(
        query.range_start_mins.unwrap_or(2),
        query.range_end_mins.unwrap_or(720),
    );
    let trips = stops::get_stop_departures(&ctx, &stop_code, &window).await?;

    Ok(web::Json(TimesResponse {
        current_time: window.now,
        trips,
    }))
}

#[post("/management/gtfs/import")]
async fn import_gtfs(ctx: web::Data<ContextData>) -> TimetableResult<impl Responder> {
    let imported = schedule::import::import_static(
        ctx.schedule.clone(),
        ctx.config.gtfs_static_dir.clone(),
        ctx.config.import_days,
    )
    .await?;

    Ok(web::Json(json!({
        "importedDepartures": imported,
    })))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::try_init().ok();

    log::debug!("Debug logging enabled");

    dotenvy::from_filename(".env").ok();

    let config = Config::from_env().expect("Invalid configuration");

    let schedule = ScheduleStore::new(config.database_path.clone());
    let realtime = Arc::new(Mutex::new(RealtimeUpdateManager::new()));

    let feed_client = FeedClient::new(&config.feed).expect("Invalid feed config");
    let monitor = monitor_feed(feed_client, Arc::clone(&realtime));

    let listen_address = config.listen_address.clone();
    let allow_origin = config.allow_origin.clone();

    let ctx = ContextData {
        config,
        schedule,
        realtime,
    };

    log::info!("Starting server at {}", listen_address);

    let server = HttpServer::new(move || {
        let logger = Logger::default();

        let mut cors = actix_cors::Cors::default()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec!["accept"]);

        if let Some(allowed_origin) = &allow_origin {
            if allowed_origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(allowed_origin);
            }
        }

        App::new()
            .wrap(logger)
            .wrap(cors)
            .app_data(web::Data::new(ctx.clone()))
            .service(ok)
            .service(get_stop_times)
            .service(import_gtfs)
    })
    .bind(listen_address)?
    .run();

    select! {
        res = server => {
            log::info!("Server stopped");
            res?;
        }
        () = monitor => {
            log::info!("Feed monitor stopped");
        }
    }

    Ok(())
}
