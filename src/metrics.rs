use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ginlong_rs::api::transport::HttpTransport;
use ginlong_rs::model::{Attribute, Measurement};
use ginlong_rs::service::{InverterService, LastMeasured, ServiceSubscriber};
use prometheus::{Encoder, GaugeVec, TextEncoder};

lazy_static! {
    static ref MEASUREMENT_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "inverter_measurement",
            "last value the portal reported for one inverter attribute",
        ),
        &["serial", "attribute"],
    )
    .unwrap();
}

/// Feeds one subscribed inverter attribute into the Prometheus registry.
/// Text valued attributes never set the gauge and therefore never accept.
struct GaugeSubscriber {
    serial: String,
    attribute: Attribute,
    measured: LastMeasured,
}

impl ServiceSubscriber for GaugeSubscriber {
    fn data_updated(&self, value: &Measurement, last_updated: DateTime<Utc>) {
        if !self.measured.outdated(last_updated) {
            return;
        }
        if let Some(value) = value.as_f64() {
            MEASUREMENT_GAUGE
                .with_label_values(&[&self.serial, self.attribute.as_str()])
                .set(value);
            self.measured.record(last_updated);
        }
    }

    fn last_measured(&self) -> Option<DateTime<Utc>> {
        self.measured.get()
    }
}

/// Register a gauge subscriber for every discovered (serial, attribute)
/// capability.
pub fn register_subscribers<T: HttpTransport>(
    service: &mut InverterService<T>,
    capabilities: &HashMap<String, Vec<Attribute>>,
) {
    for (serial, attributes) in capabilities {
        for attribute in attributes {
            let subscriber = GaugeSubscriber {
                serial: serial.clone(),
                attribute: *attribute,
                measured: LastMeasured::new(),
            };
            service.subscribe(Arc::new(subscriber), serial, *attribute);
        }
    }
}

/// Read metrics from the Prometheus exporter registry.
pub async fn read() -> Result<String, ginlong_rs::api::Error> {
    // Gather the metrics.
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).or(Err(ginlong_rs::api::Error::FormatError))
}
