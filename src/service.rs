use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, Timelike, Utc};

use crate::api::transport::HttpTransport;
use crate::api::GinlongApi;
use crate::model::{Attribute, InverterData, Measurement, PortalConfig, PowerState};

/// Don't login every time
const HRS_BETWEEN_LOGIN: i64 = 2;

/* Autodiscovery retries */
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Delay until the next update cycle, requested by the cycle that just
/// completed. The host loop owns the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Cycle failed, retry with a fresh login.
    Retry,
    Ok,
}

impl Schedule {
    pub fn delay(self) -> Duration {
        match self {
            Schedule::Retry => Duration::from_secs(60),
            Schedule::Ok => Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Online,
    Offline,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Online => f.write_str("Online"),
            Status::Offline => f.write_str("Offline"),
        }
    }
}

/// Consumer of updates for one registered (inverter, attribute) pair.
///
/// Implementations decide whether to accept an update; an update carrying
/// the same timestamp as the last accepted one has already been seen and
/// must not be applied again. `LastMeasured` packages that bookkeeping.
pub trait ServiceSubscriber: Send + Sync {
    /// Called when the service has an update for the registered attribute.
    fn data_updated(&self, value: &Measurement, last_updated: DateTime<Utc>);

    /// Timestamp of the last update this subscriber accepted.
    fn last_measured(&self) -> Option<DateTime<Utc>>;
}

/// Timestamp of the last accepted update, shared bookkeeping for
/// `ServiceSubscriber` implementations.
#[derive(Default)]
pub struct LastMeasured(Mutex<Option<DateTime<Utc>>>);

impl LastMeasured {
    pub fn new() -> LastMeasured {
        LastMeasured::default()
    }

    /// True when `at` differs from the last accepted timestamp.
    pub fn outdated(&self, at: DateTime<Utc>) -> bool {
        self.get() != Some(at)
    }

    pub fn record(&self, at: DateTime<Utc>) {
        if let Ok(mut measured) = self.0.lock() {
            *measured = Some(at);
        }
    }

    pub fn get(&self) -> Option<DateTime<Utc>> {
        self.0.lock().ok().and_then(|measured| *measured)
    }
}

/// Serves all inverters on one Ginlong account: drives the poll cycle,
/// bounds the session age and dispatches measurements to subscribers.
pub struct InverterService<T> {
    api: GinlongApi<T>,
    logintime: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
    subscriptions: HashMap<String, HashMap<Attribute, Arc<dyn ServiceSubscriber>>>,
}

impl<T: HttpTransport> InverterService<T> {
    pub fn new(config: PortalConfig, transport: T) -> InverterService<T> {
        InverterService {
            api: GinlongApi::new(config, transport),
            logintime: None,
            last_updated: None,
            subscriptions: HashMap::new(),
        }
    }

    async fn login(&mut self) -> bool {
        if !self.api.is_online() && self.api.login().await {
            self.logintime = Some(Utc::now());
        }
        self.api.is_online()
    }

    fn logout(&mut self) {
        self.api.logout();
        self.logintime = None;
    }

    /// Discover the attributes every inverter on the account supports.
    /// Retries a few times before giving up with an empty capability map.
    pub async fn discover(&mut self) -> HashMap<String, Vec<Attribute>> {
        let mut retries = 0;
        let mut capabilities = HashMap::new();
        while capabilities.is_empty() && retries <= MAX_RETRIES {
            capabilities = self.do_discover().await;
            if capabilities.is_empty() {
                log::info!("Discovery failed, retry attempt #{}", retries + 1);
                retries += 1;
                /* Don't rush the retries */
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        if capabilities.is_empty() {
            log::warn!("Failed to discover.");
        }
        capabilities
    }

    async fn do_discover(&mut self) -> HashMap<String, Vec<Attribute>> {
        let mut capabilities = HashMap::new();
        if self.login().await {
            for serial in self.serials() {
                match self.api.fetch_inverter_data(&serial).await {
                    Ok(data) => {
                        capabilities.insert(serial, data.keys());
                    }
                    Err(err) => {
                        log::debug!("No data for {} during discovery: {:?}", serial, err)
                    }
                }
            }
        }
        capabilities
    }

    fn serials(&self) -> Vec<String> {
        self.api
            .inverters()
            .map(|inverters| inverters.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Subscribe to changes in `attribute` of inverter `serial`. One
    /// subscriber per pair, re-subscribing replaces the previous one.
    pub fn subscribe(
        &mut self,
        subscriber: Arc<dyn ServiceSubscriber>,
        serial: &str,
        attribute: Attribute,
    ) {
        log::info!(
            "Subscribing to attribute {} for inverter {}",
            attribute,
            serial
        );
        self.subscriptions
            .entry(serial.to_string())
            .or_default()
            .insert(attribute, subscriber);
    }

    /// Run one update cycle: fetch every inverter, push the measurements to
    /// subscribers and report the requested re-schedule. A failed fetch
    /// drops the session so the next cycle starts with a fresh login.
    pub async fn async_update(&mut self) -> Schedule {
        let mut update = Schedule::Retry;
        if self.login().await {
            for serial in self.serials() {
                match self.api.fetch_inverter_data(&serial).await {
                    Ok(data) => {
                        update = Schedule::Ok;
                        self.last_updated = Some(Utc::now());
                        self.update_devices(&data);
                    }
                    Err(err) => {
                        log::info!("Fetching data for {} failed: {:?}", serial, err);
                        update = Schedule::Retry;
                        /* Reset session and login again next cycle */
                        self.logout();
                    }
                }
            }
        }

        if let Some(logintime) = self.logintime {
            if logintime + chrono::Duration::hours(HRS_BETWEEN_LOGIN) < Utc::now() {
                /* Time to login again */
                self.logout();
            }
        }
        update
    }

    /// Update all registered subscribers from one measurement set.
    fn update_devices(&self, data: &InverterData) {
        self.dispatch(data, Local::now());
    }

    fn dispatch(&self, data: &InverterData, now: DateTime<Local>) {
        let serial = match data.serial() {
            Some(serial) => serial,
            None => return,
        };
        let subscriptions = match self.subscriptions.get(serial) {
            Some(subscriptions) => subscriptions,
            None => return,
        };
        let last_updated = match self.last_updated {
            Some(last_updated) => last_updated,
            None => return,
        };
        for attribute in data.keys() {
            let subscriber = match subscriptions.get(&attribute) {
                Some(subscriber) => subscriber,
                None => continue,
            };
            let value = match data.get(attribute) {
                Some(value) => value,
                None => continue,
            };
            let value = if attribute == Attribute::EnergyToday {
                self.energy_today_fix(value.clone(), data, subscriptions, now)
            } else {
                value.clone()
            };
            log::debug!("Updating attribute {} with value {}", attribute, value);
            subscriber.data_updated(&value, last_updated);
        }
    }

    /// Energy today is not reset at midnight but in the morning when the
    /// inverter switches back on, which replays yesterday's counter until
    /// sunrise. Report 0 while the inverter is off or standing by in the
    /// morning, except when the state reading itself is older than a 10
    /// minute grace window.
    fn energy_today_fix(
        &self,
        raw: Measurement,
        data: &InverterData,
        subscriptions: &HashMap<Attribute, Arc<dyn ServiceSubscriber>>,
        now: DateTime<Local>,
    ) -> Measurement {
        if now.hour() >= 12 {
            return raw;
        }
        let state: Option<PowerState> = data
            .get(Attribute::State)
            .and_then(Measurement::as_i64)
            .and_then(num::FromPrimitive::from_i64);
        match state {
            Some(PowerState::Standby) => Measurement::Float(0.0),
            Some(PowerState::Off) => {
                let state_measured = subscriptions
                    .get(&Attribute::State)
                    .and_then(|subscriber| subscriber.last_measured());
                match state_measured {
                    Some(at) if at + chrono::Duration::minutes(10) < now.with_timezone(&Utc) => raw,
                    _ => Measurement::Float(0.0),
                }
            }
            None => raw,
        }
    }

    pub fn status(&self) -> Status {
        if self.api.is_online() {
            Status::Online
        } else {
            Status::Offline
        }
    }

    /// When the service last received fresh data.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::transport::testing::{ok, StubTransport};
    use chrono::TimeZone;
    use serde_json::json;

    fn portal_config() -> PortalConfig {
        PortalConfig {
            domain: "portal.test".to_string(),
            username: "user".to_string(),
            password: "secret".to_string(),
            plant_id: "300001".to_string(),
        }
    }

    fn accept_response() -> serde_json::Value {
        json!({ "result": { "isAccept": 1 } })
    }

    fn list_response() -> serde_json::Value {
        json!({
            "result": {
                "paginationAjax": {
                    "data": [
                        { "sn": "1111", "deviceId": 100001 },
                        { "sn": "2222", "deviceId": 100002 },
                    ]
                }
            }
        })
    }

    fn detail_response(serial: &str) -> serde_json::Value {
        json!({
            "result": {
                "deviceWapper": {
                    "sn": serial,
                    "state": 3,
                    "realTimeDataPower": [
                        { "key": "1ao", "value": "1.5" },
                        { "key": "1bd", "value": "12.5" },
                    ]
                }
            }
        })
    }

    fn online_transport() -> Arc<StubTransport> {
        let transport = Arc::new(StubTransport::new());
        transport.respond("validateLogin.json", ok(accept_response()));
        transport.respond("inverterListAjax.json", ok(list_response()));
        transport
    }

    /// Accepts every update once per timestamp and records what it applied.
    struct Recording {
        applied: Mutex<Vec<Measurement>>,
        measured: LastMeasured,
    }

    impl Recording {
        fn new() -> Arc<Recording> {
            Arc::new(Recording {
                applied: Mutex::new(Vec::new()),
                measured: LastMeasured::new(),
            })
        }

        fn applied(&self) -> Vec<Measurement> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl ServiceSubscriber for Recording {
        fn data_updated(&self, value: &Measurement, last_updated: DateTime<Utc>) {
            if self.measured.outdated(last_updated) {
                self.applied.lock().unwrap().push(value.clone());
                self.measured.record(last_updated);
            }
        }

        fn last_measured(&self) -> Option<DateTime<Utc>> {
            self.measured.get()
        }
    }

    /// Subscriber whose last accepted timestamp never moves.
    struct Pinned {
        at: Option<DateTime<Utc>>,
    }

    impl ServiceSubscriber for Pinned {
        fn data_updated(&self, _value: &Measurement, _last_updated: DateTime<Utc>) {}

        fn last_measured(&self) -> Option<DateTime<Utc>> {
            self.at
        }
    }

    fn measurement_set(serial: &str, state: i64, energy_today: f64) -> InverterData {
        let mut data = HashMap::new();
        data.insert(Attribute::Serial, Measurement::Text(serial.to_string()));
        data.insert(Attribute::State, Measurement::Integer(state));
        data.insert(Attribute::EnergyToday, Measurement::Float(energy_today));
        InverterData::new(data)
    }

    fn morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap()
    }

    fn afternoon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2023, 6, 1, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn login_performs_discovery_at_most_once() {
        let transport = online_transport();
        let mut service = InverterService::new(portal_config(), transport.clone());

        assert!(service.login().await);
        assert!(service.login().await);

        assert_eq!(1, transport.count_calls("validateLogin.json"));
        assert_eq!(1, transport.count_calls("inverterListAjax.json"));
    }

    #[tokio::test]
    async fn failed_login_skips_fetches() {
        let transport = Arc::new(StubTransport::new());
        let mut service = InverterService::new(portal_config(), transport.clone());

        let schedule = service.async_update().await;

        assert_eq!(Schedule::Retry, schedule);
        assert_eq!(Status::Offline, service.status());
        assert_eq!(0, transport.count_calls("goDetailAjax.json"));
    }

    #[tokio::test]
    async fn successful_cycle_updates_subscribers() {
        let transport = online_transport();
        transport.respond("goDetailAjax.json:100001", ok(detail_response("1111")));
        transport.respond("goDetailAjax.json:100002", ok(detail_response("2222")));
        let mut service = InverterService::new(portal_config(), transport);
        let recorder = Recording::new();
        service.subscribe(recorder.clone(), "1111", Attribute::AcPower);

        let schedule = service.async_update().await;

        assert_eq!(Schedule::Ok, schedule);
        assert_eq!(Status::Online, service.status());
        assert!(service.last_updated().is_some());
        assert_eq!(vec![Measurement::Float(1.5)], recorder.applied());
    }

    #[tokio::test]
    async fn partial_failure_still_delivers_earlier_updates() {
        let transport = online_transport();
        /* first inverter responds, second one does not */
        transport.respond("goDetailAjax.json:100001", ok(detail_response("1111")));
        let mut service = InverterService::new(portal_config(), transport);
        let recorder = Recording::new();
        service.subscribe(recorder.clone(), "1111", Attribute::AcPower);

        let schedule = service.async_update().await;

        assert_eq!(vec![Measurement::Float(1.5)], recorder.applied());
        assert_eq!(Schedule::Retry, schedule);
        assert_eq!(Status::Offline, service.status());
    }

    #[tokio::test]
    async fn stale_session_is_dropped_after_the_cycle() {
        let transport = online_transport();
        transport.respond("goDetailAjax.json:100001", ok(detail_response("1111")));
        transport.respond("goDetailAjax.json:100002", ok(detail_response("2222")));
        let mut service = InverterService::new(portal_config(), transport);
        assert!(service.login().await);
        service.logintime = Some(Utc::now() - chrono::Duration::hours(3));

        let schedule = service.async_update().await;

        assert_eq!(Schedule::Ok, schedule);
        assert_eq!(Status::Offline, service.status());
        assert!(service.logintime.is_none());
    }

    #[test]
    fn same_timestamp_is_applied_once() {
        let mut service = InverterService::new(portal_config(), Arc::new(StubTransport::new()));
        let recorder = Recording::new();
        service.subscribe(recorder.clone(), "1111", Attribute::EnergyToday);
        service.last_updated = Some(Utc::now());
        let data = measurement_set("1111", 3, 12.5);

        service.dispatch(&data, afternoon());
        service.dispatch(&data, afternoon());

        assert_eq!(1, recorder.applied().len());
    }

    #[test]
    fn morning_standby_forces_zero() {
        let mut service = InverterService::new(portal_config(), Arc::new(StubTransport::new()));
        let recorder = Recording::new();
        service.subscribe(recorder.clone(), "1111", Attribute::EnergyToday);
        service.subscribe(Recording::new(), "1111", Attribute::State);
        service.last_updated = Some(Utc::now());

        service.dispatch(&measurement_set("1111", 2, 12.5), morning());

        assert_eq!(vec![Measurement::Float(0.0)], recorder.applied());
    }

    #[test]
    fn morning_off_with_recent_state_forces_zero() {
        let mut service = InverterService::new(portal_config(), Arc::new(StubTransport::new()));
        let recorder = Recording::new();
        let now = morning();
        service.subscribe(recorder.clone(), "1111", Attribute::EnergyToday);
        service.subscribe(
            Arc::new(Pinned {
                at: Some(now.with_timezone(&Utc) - chrono::Duration::minutes(5)),
            }),
            "1111",
            Attribute::State,
        );
        service.last_updated = Some(now.with_timezone(&Utc));

        service.dispatch(&measurement_set("1111", 1, 12.5), now);

        assert_eq!(vec![Measurement::Float(0.0)], recorder.applied());
    }

    #[test]
    fn morning_off_with_stale_state_delivers_raw_value() {
        let mut service = InverterService::new(portal_config(), Arc::new(StubTransport::new()));
        let recorder = Recording::new();
        let now = morning();
        service.subscribe(recorder.clone(), "1111", Attribute::EnergyToday);
        service.subscribe(
            Arc::new(Pinned {
                at: Some(now.with_timezone(&Utc) - chrono::Duration::minutes(15)),
            }),
            "1111",
            Attribute::State,
        );
        service.last_updated = Some(now.with_timezone(&Utc));

        service.dispatch(&measurement_set("1111", 1, 12.5), now);

        assert_eq!(vec![Measurement::Float(12.5)], recorder.applied());
    }

    #[test]
    fn afternoon_delivers_raw_value() {
        let mut service = InverterService::new(portal_config(), Arc::new(StubTransport::new()));
        let recorder = Recording::new();
        service.subscribe(recorder.clone(), "1111", Attribute::EnergyToday);
        service.subscribe(Recording::new(), "1111", Attribute::State);
        service.last_updated = Some(Utc::now());

        service.dispatch(&measurement_set("1111", 2, 12.5), afternoon());

        assert_eq!(vec![Measurement::Float(12.5)], recorder.applied());
    }
}
