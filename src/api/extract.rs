use std::collections::HashMap;

use serde_json::Value;

use crate::api::error::Error;
use crate::api::schema::{Schema, SectionKind, ValueType};
use crate::model::{Attribute, InverterData, Measurement};

/// Collect all schema-declared measurements from an inverter detail payload.
///
/// A missing subsection or a value that cannot be coerced into its declared
/// type only omits the affected attributes; the detail object itself is the
/// one hard requirement.
pub fn extract(schema: &Schema, payload: &Value) -> Result<InverterData, Error> {
    let wrapper = payload
        .get("result")
        .and_then(|result| result.get("deviceWapper"))
        .ok_or_else(|| Error::InvalidResponse("no deviceWapper in payload".to_string()))?;

    let mut data = HashMap::new();
    for section in schema.sections() {
        let subtree = match section.name {
            None => wrapper,
            Some(name) => match wrapper.get(name) {
                Some(subtree) => subtree,
                None => {
                    log::debug!("Section {} not present in payload", name);
                    continue;
                }
            },
        };
        for field in &section.fields {
            let raw = match section.kind {
                SectionKind::Element => element_value(subtree, field.raw_key),
                SectionKind::Record => record_value(subtree, field.raw_key),
            };
            if let Some(raw) = raw {
                match coerce(raw, field.value_type, field.precision) {
                    Some(value) => {
                        data.insert(field.attribute, value);
                    }
                    None => log::debug!(
                        "Skipping {}, cannot read {} as {:?}",
                        field.attribute,
                        raw,
                        field.value_type
                    ),
                }
            }
        }
    }
    post_process(&mut data);
    Ok(InverterData::new(data))
}

/// Direct lookup in a mapping subtree.
fn element_value<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    data.get(key).filter(|value| !value.is_null())
}

/// Scan a list of `{key, value}` records. The scan continues after a hit, so
/// with duplicate keys the last record wins.
fn record_value<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    let mut result = None;
    for record in data.as_array()? {
        if record.get("key").and_then(Value::as_str) == Some(key) {
            if let Some(value) = record.get("value").filter(|value| !value.is_null()) {
                result = Some(value);
            }
        }
    }
    result
}

fn coerce(raw: &Value, value_type: ValueType, precision: Option<i32>) -> Option<Measurement> {
    match value_type {
        ValueType::Text => match raw {
            Value::String(value) => Some(Measurement::Text(value.clone())),
            Value::Number(value) => Some(Measurement::Text(value.to_string())),
            _ => None,
        },
        ValueType::Integer => match raw {
            Value::Number(value) => value
                .as_i64()
                .or_else(|| value.as_f64().map(|float| float as i64))
                .map(Measurement::Integer),
            Value::String(value) => value.trim().parse().ok().map(Measurement::Integer),
            _ => None,
        },
        ValueType::Float => {
            let value = match raw {
                Value::Number(value) => value.as_f64(),
                Value::String(value) => value.trim().parse().ok(),
                _ => None,
            }?;
            Some(Measurement::Float(match precision {
                Some(precision) => round_to(value, precision),
                None => value,
            }))
        }
    }
}

fn round_to(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor).round() / factor
}

/// Cleanup of a freshly collected measurement set.
fn post_process(data: &mut HashMap<Attribute, Measurement>) {
    /* The portal reports both timestamps in milliseconds */
    scale_timestamp(data, Attribute::TimestampOnline);
    scale_timestamp(data, Attribute::TimestampUpdate);
    /* Unused phases are still in the payload as 0.0, remove them */
    purge_if_unused(data, 0.0, &[Attribute::Phase1Current, Attribute::Phase1Voltage]);
    purge_if_unused(data, 0.0, &[Attribute::Phase2Current, Attribute::Phase2Voltage]);
    purge_if_unused(data, 0.0, &[Attribute::Phase3Current, Attribute::Phase3Voltage]);
}

fn scale_timestamp(data: &mut HashMap<Attribute, Measurement>, attribute: Attribute) {
    if let Some(value) = data.get(&attribute).and_then(Measurement::as_f64) {
        data.insert(attribute, Measurement::Float(value / 1000.0));
    }
}

/// Remove `elements` when every one of them is present and equal to `value`.
fn purge_if_unused(data: &mut HashMap<Attribute, Measurement>, value: f64, elements: &[Attribute]) {
    for element in elements {
        match data.get(element) {
            Some(Measurement::Float(actual)) if *actual == value => {}
            _ => return,
        }
    }
    for element in elements {
        data.remove(element);
    }
}
