pub mod endpoint;
pub mod error;
pub mod extract;
pub mod schema;
pub mod transport;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::{InverterData, PortalConfig};
pub use error::Error;
use schema::Schema;
use transport::HttpTransport;

/* Portal frontend language, 2 = english */
const LANGUAGE: &str = "2";

/// Inverter serial number to portal device id, in stable serial order.
pub type InverterDirectory = BTreeMap<String, String>;

/// Client for the Ginlong Platform 2.0 portal. Offline until `login()`
/// succeeds, forced back offline by `logout()`.
pub struct GinlongApi<T> {
    config: PortalConfig,
    transport: T,
    schema: Schema,
    online: bool,
    inverters: Option<InverterDirectory>,
}

impl<T: HttpTransport> GinlongApi<T> {
    pub fn new(config: PortalConfig, transport: T) -> GinlongApi<T> {
        GinlongApi {
            config,
            transport,
            schema: Schema::portal(),
            online: false,
            inverters: None,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// The discovered inverters of the configured plant, while logged in.
    pub fn inverters(&self) -> Option<&InverterDirectory> {
        self.inverters.as_ref()
    }

    /// Login to the portal and discover the plant's inverters. Only succeeds
    /// when the portal accepts the credentials and discovery yields a
    /// directory. A no-op while already online.
    pub async fn login(&mut self) -> bool {
        if self.online {
            return true;
        }
        self.inverters = None;

        let url = format!("https://{}{}", self.config.domain, endpoint::LOGIN);
        let params = [
            ("userName", self.config.username.clone()),
            ("password", self.config.password.clone()),
            ("lan", LANGUAGE.to_string()),
            ("domain", self.config.domain.clone()),
            ("userType", "C".to_string()),
        ];

        let result = self.transport.post_form(&url, &params).await;
        if !result.success {
            log::error!("Unable to reach {}", self.config.domain);
            return false;
        }
        let accepted = result
            .content
            .as_ref()
            .and_then(|content| content.get("result"))
            .and_then(|result| result.get("isAccept"))
            .and_then(Value::as_i64)
            == Some(1);
        if !accepted {
            log::error!(
                "Unable to login to {}, are username and password correct?",
                self.config.domain
            );
            return false;
        }

        match self.fetch_inverter_list().await {
            Some(inverters) => {
                log::info!("Login successful, {} inverter(s) found", inverters.len());
                self.inverters = Some(inverters);
                self.online = true;
            }
            None => {
                log::error!(
                    "Inverter discovery failed for plant {}",
                    self.config.plant_id
                );
                self.online = false;
            }
        }
        self.online
    }

    /// Drop the portal session.
    pub fn logout(&mut self) {
        self.online = false;
        self.inverters = None;
    }

    /// Fetch the paginated device list of the configured plant and build
    /// serial to device id pairs. `None` on any transport or parse failure.
    async fn fetch_inverter_list(&self) -> Option<InverterDirectory> {
        let url = format!("http://{}{}", self.config.domain, endpoint::INVERTER_LIST);
        let params = [
            ("orderBy", "updateDate".to_string()),
            ("orderType", "2".to_string()),
            ("pageIndex", "1".to_string()),
            ("plantId", self.config.plant_id.clone()),
            ("sequenceNum", "9".to_string()),
            ("showAddFlg", "1".to_string()),
        ];

        let result = self.transport.get_json(&url, &params).await;
        if !result.success {
            return None;
        }
        let records = result
            .content
            .as_ref()?
            .get("result")?
            .get("paginationAjax")?
            .get("data")?
            .as_array()?;

        let mut inverters = InverterDirectory::new();
        for record in records {
            let serial = record.get("sn").and_then(Value::as_str);
            let device_id = record.get("deviceId").and_then(id_string);
            if let (Some(serial), Some(device_id)) = (serial, device_id) {
                inverters.insert(serial.to_string(), device_id);
            }
        }
        Some(inverters)
    }

    /// Fetch and extract the current measurements of one inverter.
    pub async fn fetch_inverter_data(&self, serial: &str) -> Result<InverterData, Error> {
        log::info!("Fetching data for serial: {}", serial);
        if !self.online {
            return Err(Error::NotLoggedIn);
        }
        let device_id = self
            .inverters
            .as_ref()
            .and_then(|inverters| inverters.get(serial))
            .ok_or_else(|| Error::UnknownDevice(serial.to_string()))?
            .clone();
        let payload = self.inverter_details(&device_id).await?;
        let data = extract::extract(&self.schema, &payload)?;
        log::debug!("Collected {} measurements for {}", data.len(), serial);
        Ok(data)
    }

    async fn inverter_details(&self, device_id: &str) -> Result<Value, Error> {
        let url = format!("http://{}{}", self.config.domain, endpoint::INVERTER_DETAIL);
        let params = [("deviceId", device_id.to_string())];

        let result = self.transport.get_json(&url, &params).await;
        if !result.success {
            return Err(Error::ApiError(format!(
                "unable to fetch details for device with id {}",
                device_id
            )));
        }
        result
            .content
            .ok_or_else(|| Error::InvalidResponse("empty response body".to_string()))
    }
}

/// Device ids arrive as numbers or strings depending on portal version.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}
