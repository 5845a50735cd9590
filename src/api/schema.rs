use crate::model::Attribute;

/// How values are read out of a payload section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// The section is a plain mapping, values are read by field name.
    Element,
    /// The section is a list of `{key, value}` records, values are read by
    /// scanning for the matching key. The last matching record wins.
    Record,
}

/// Declared type a raw payload value is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Integer,
    Float,
}

/// One row of the schema: where an attribute lives in the payload and how
/// its raw value becomes a measurement.
#[derive(Debug, Clone)]
pub struct Field {
    pub attribute: Attribute,
    pub raw_key: &'static str,
    pub value_type: ValueType,
    /// Decimal places to round to, floats only.
    pub precision: Option<i32>,
}

impl Field {
    fn text(attribute: Attribute, raw_key: &'static str) -> Field {
        Field {
            attribute,
            raw_key,
            value_type: ValueType::Text,
            precision: None,
        }
    }

    fn integer(attribute: Attribute, raw_key: &'static str) -> Field {
        Field {
            attribute,
            raw_key,
            value_type: ValueType::Integer,
            precision: None,
        }
    }

    fn float(attribute: Attribute, raw_key: &'static str, precision: i32) -> Field {
        Field {
            attribute,
            raw_key,
            value_type: ValueType::Float,
            precision: Some(precision),
        }
    }

    /// Unrounded float, for values that are post-processed afterwards.
    fn float_raw(attribute: Attribute, raw_key: &'static str) -> Field {
        Field {
            attribute,
            raw_key,
            value_type: ValueType::Float,
            precision: None,
        }
    }
}

/// One payload section and the fields declared under it.
#[derive(Debug, Clone)]
pub struct Section {
    /// Subsection name inside the detail object, `None` for the detail
    /// object itself.
    pub name: Option<&'static str>,
    pub kind: SectionKind,
    pub fields: Vec<Field>,
}

/// Read-only mapping between portal payloads and measurement attributes.
/// Constructed once and passed by reference into the extractor.
#[derive(Debug, Clone)]
pub struct Schema {
    sections: Vec<Section>,
}

impl Schema {
    /// The Ginlong Platform 2.0 inverter detail schema.
    ///
    /// The two receive/update timestamps are declared float without rounding:
    /// the portal emits milliseconds and post-processing rescales them to
    /// fractional seconds.
    pub fn portal() -> Schema {
        Schema {
            sections: vec![
                Section {
                    name: None,
                    kind: SectionKind::Element,
                    fields: vec![
                        Field::text(Attribute::Serial, "sn"),
                        Field::text(Attribute::PlantId, "plantId"),
                        Field::float(Attribute::Latitude, "lat", 7),
                        Field::float(Attribute::Longitude, "lon", 7),
                        Field::text(Attribute::Address, "address"),
                        Field::text(Attribute::DeviceId, "deviceId"),
                        Field::text(Attribute::DataloggerSerial, "dataloggerSn"),
                        Field::float_raw(Attribute::TimestampOnline, "receiveTimestamps"),
                        Field::float_raw(Attribute::TimestampUpdate, "updateDate"),
                        Field::integer(Attribute::State, "state"),
                    ],
                },
                Section {
                    name: Some("realTimeDataImp"),
                    kind: SectionKind::Record,
                    fields: vec![Field::float(Attribute::Temperature, "1df", 1)],
                },
                Section {
                    name: Some("realTimeDataOther"),
                    kind: SectionKind::Record,
                    fields: vec![Field::float(Attribute::PowerLimit, "1rv", 2)],
                },
                Section {
                    name: Some("realTimeDataState"),
                    kind: SectionKind::Record,
                    fields: vec![Field::integer(Attribute::PowerState, "1fd")],
                },
                Section {
                    name: Some("realTimeDataPower"),
                    kind: SectionKind::Record,
                    fields: vec![
                        Field::float(Attribute::AcPower, "1ao", 2),
                        Field::float(Attribute::AcFrequency, "1ar", 2),
                        Field::float(Attribute::EnergyLastMonth, "1ru", 2),
                        Field::float(Attribute::EnergyToday, "1bd", 2),
                        Field::float(Attribute::EnergyThisMonth, "1be", 2),
                        Field::float(Attribute::EnergyThisYear, "1bf", 2),
                        Field::float(Attribute::EnergyTotal, "1bc", 2),
                        Field::float(Attribute::String1Voltage, "1a", 2),
                        Field::float(Attribute::String2Voltage, "1b", 2),
                        Field::float(Attribute::String3Voltage, "1c", 2),
                        Field::float(Attribute::String4Voltage, "1d", 2),
                        Field::float(Attribute::String1Current, "1j", 2),
                        Field::float(Attribute::String2Current, "1k", 2),
                        Field::float(Attribute::String3Current, "1l", 2),
                        Field::float(Attribute::String4Current, "1m", 2),
                        Field::float(Attribute::String1Power, "1s", 2),
                        Field::float(Attribute::String2Power, "1t", 2),
                        Field::float(Attribute::String3Power, "1u", 2),
                        Field::float(Attribute::String4Power, "1v", 2),
                        Field::float(Attribute::Phase1Voltage, "1af", 2),
                        Field::float(Attribute::Phase2Voltage, "1ag", 2),
                        Field::float(Attribute::Phase3Voltage, "1ah", 2),
                        Field::float(Attribute::Phase1Current, "1ai", 2),
                        Field::float(Attribute::Phase2Current, "1aj", 2),
                        Field::float(Attribute::Phase3Current, "1ak", 2),
                    ],
                },
                Section {
                    name: Some("dataJSON"),
                    kind: SectionKind::Element,
                    fields: vec![
                        Field::float(Attribute::BatteryRemainingCapacity, "1cv", 2),
                        Field::float(Attribute::BatteryTotalEnergyCharged, "1cx", 2),
                        Field::float(Attribute::BatteryTotalEnergyDischarged, "1cy", 2),
                        Field::float(Attribute::BatteryDailyEnergyCharged, "1cz", 2),
                        Field::float(Attribute::BatteryDailyEnergyDischarged, "1da", 2),
                        Field::float(Attribute::GridDailyOnGridEnergy, "1bw", 2),
                        Field::float(Attribute::GridDailyEnergyPurchased, "1bx", 2),
                        Field::float(Attribute::GridDailyEnergyUsed, "1co", 2),
                        Field::float(Attribute::GridMonthlyEnergyPurchased, "1bz", 2),
                        Field::float(Attribute::GridMonthlyEnergyUsed, "1cp", 2),
                        Field::float(Attribute::GridYearlyEnergyPurchased, "1cb", 2),
                        Field::float(Attribute::GridYearlyEnergyUsed, "1cq", 2),
                        Field::float(Attribute::GridTotalOnGridEnergy, "1bu", 2),
                        Field::float(Attribute::GridTotalConsumptionEnergy, "1cn", 2),
                        Field::float(Attribute::GridTotalPower, "1bq", 2),
                        Field::float(Attribute::GridTotalConsumptionPower, "1cj", 2),
                        Field::float(Attribute::GridTotalEnergyUsed, "1bv", 2),
                    ],
                },
            ],
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Lookup of `attribute`, if the schema declares it.
    pub fn field(&self, attribute: Attribute) -> Option<&Field> {
        self.sections
            .iter()
            .flat_map(|section| section.fields.iter())
            .find(|field| field.attribute == attribute)
    }

    /// Attributes declared under the section called `name`, in declaration
    /// order.
    pub fn section_attributes(&self, name: Option<&str>) -> Vec<Attribute> {
        self.sections
            .iter()
            .filter(|section| section.name == name)
            .flat_map(|section| section.fields.iter().map(|field| field.attribute))
            .collect()
    }
}
