#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use config::Config;
use ginlong_rs::api;
use ginlong_rs::api::transport::ReqwestTransport;
use ginlong_rs::model::PortalConfig;
use ginlong_rs::service::InverterService;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, State};
use std::sync::Arc;
use tokio::sync::Mutex;

mod metrics;

const PORTAL_DOMAIN: &str = "m.ginlong.com";

#[derive(Clone, serde::Deserialize)]
pub struct GinlongConfig {
    domain: String,
    username: String,
    password: String,
    plant_id: String,
}

type SharedService = Arc<Mutex<InverterService<ReqwestTransport>>>;

pub fn read_settings() -> GinlongConfig {
    let mut settings = Config::default();
    settings
        .merge(config::Environment::with_prefix("GINLONG"))
        .unwrap()
        .set_default("domain", PORTAL_DOMAIN)
        .unwrap();

    settings.try_into().expect("Configuration error")
}

/// Discover the account once, register a gauge per capability and keep
/// polling at whatever pace the service requests.
async fn poll(service: SharedService) {
    let capabilities = service.lock().await.discover().await;
    if capabilities.is_empty() {
        log::error!("No inverters discovered, nothing will be collected");
    }
    metrics::register_subscribers(&mut *service.lock().await, &capabilities);

    loop {
        let schedule = service.lock().await.async_update().await;
        log::debug!("Scheduling next update in {:?}.", schedule.delay());
        tokio::time::sleep(schedule.delay()).await;
    }
}

#[get("/metrics")]
async fn metrics_route() -> Result<String, api::Error> {
    metrics::read().await
}

#[get("/status")]
async fn status_route(state: &State<SharedService>) -> String {
    let service = state.lock().await;
    match service.last_updated() {
        Some(last_updated) => format!("{} (last update: {})", service.status(), last_updated),
        None => format!("{}", service.status()),
    }
}

#[launch]
fn rocket() -> Rocket<Build> {
    env_logger::init();

    let settings = read_settings();
    let config = PortalConfig {
        domain: settings.domain,
        username: settings.username,
        password: settings.password,
        plant_id: settings.plant_id,
    };
    let transport = ReqwestTransport::new().expect("HTTP client error");
    let service: SharedService = Arc::new(Mutex::new(InverterService::new(config, transport)));
    let poller = service.clone();

    rocket::build()
        .manage(service)
        .mount("/", routes![metrics_route, status_route])
        .attach(AdHoc::on_liftoff("poller", |_| {
            Box::pin(async move {
                tokio::spawn(poll(poller));
            })
        }))
}
