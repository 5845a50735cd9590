use std::collections::HashMap;
use std::fmt;

use num_derive::FromPrimitive;

/// Portal account configuration. Valid for all Ginlong Platform 2.0 brands
/// (Solis, Solarman, Sofar Solar).
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub domain: String,
    pub username: String,
    pub password: String,
    pub plant_id: String,
}

/// Power state reported by the inverter in the top-level `state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum PowerState {
    Off = 1,
    Standby = 2,
}

/// Every measurement the portal schema declares. Replaces the dynamic
/// attribute lookup of the portal frontend with a closed identifier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Serial,
    PlantId,
    Latitude,
    Longitude,
    Address,
    DeviceId,
    DataloggerSerial,
    TimestampOnline,
    TimestampUpdate,
    State,
    Temperature,
    PowerLimit,
    PowerState,
    AcPower,
    AcFrequency,
    EnergyLastMonth,
    EnergyToday,
    EnergyThisMonth,
    EnergyThisYear,
    EnergyTotal,
    String1Voltage,
    String2Voltage,
    String3Voltage,
    String4Voltage,
    String1Current,
    String2Current,
    String3Current,
    String4Current,
    String1Power,
    String2Power,
    String3Power,
    String4Power,
    Phase1Voltage,
    Phase2Voltage,
    Phase3Voltage,
    Phase1Current,
    Phase2Current,
    Phase3Current,
    BatteryRemainingCapacity,
    BatteryTotalEnergyCharged,
    BatteryTotalEnergyDischarged,
    BatteryDailyEnergyCharged,
    BatteryDailyEnergyDischarged,
    GridDailyOnGridEnergy,
    GridDailyEnergyPurchased,
    GridDailyEnergyUsed,
    GridMonthlyEnergyPurchased,
    GridMonthlyEnergyUsed,
    GridYearlyEnergyPurchased,
    GridYearlyEnergyUsed,
    GridTotalOnGridEnergy,
    GridTotalConsumptionEnergy,
    GridTotalPower,
    GridTotalConsumptionPower,
    GridTotalEnergyUsed,
}

impl Attribute {
    /// Stable name used for logging and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Serial => "serial",
            Attribute::PlantId => "plant_id",
            Attribute::Latitude => "latitude",
            Attribute::Longitude => "longitude",
            Attribute::Address => "address",
            Attribute::DeviceId => "device_id",
            Attribute::DataloggerSerial => "datalogger_serial",
            Attribute::TimestampOnline => "timestamp_online",
            Attribute::TimestampUpdate => "timestamp_update",
            Attribute::State => "state",
            Attribute::Temperature => "temperature",
            Attribute::PowerLimit => "power_limit",
            Attribute::PowerState => "power_state",
            Attribute::AcPower => "ac_power",
            Attribute::AcFrequency => "ac_frequency",
            Attribute::EnergyLastMonth => "energy_last_month",
            Attribute::EnergyToday => "energy_today",
            Attribute::EnergyThisMonth => "energy_this_month",
            Attribute::EnergyThisYear => "energy_this_year",
            Attribute::EnergyTotal => "energy_total",
            Attribute::String1Voltage => "string1_voltage",
            Attribute::String2Voltage => "string2_voltage",
            Attribute::String3Voltage => "string3_voltage",
            Attribute::String4Voltage => "string4_voltage",
            Attribute::String1Current => "string1_current",
            Attribute::String2Current => "string2_current",
            Attribute::String3Current => "string3_current",
            Attribute::String4Current => "string4_current",
            Attribute::String1Power => "string1_power",
            Attribute::String2Power => "string2_power",
            Attribute::String3Power => "string3_power",
            Attribute::String4Power => "string4_power",
            Attribute::Phase1Voltage => "phase1_voltage",
            Attribute::Phase2Voltage => "phase2_voltage",
            Attribute::Phase3Voltage => "phase3_voltage",
            Attribute::Phase1Current => "phase1_current",
            Attribute::Phase2Current => "phase2_current",
            Attribute::Phase3Current => "phase3_current",
            Attribute::BatteryRemainingCapacity => "battery_remaining_capacity",
            Attribute::BatteryTotalEnergyCharged => "battery_total_energy_charged",
            Attribute::BatteryTotalEnergyDischarged => "battery_total_energy_discharged",
            Attribute::BatteryDailyEnergyCharged => "battery_daily_energy_charged",
            Attribute::BatteryDailyEnergyDischarged => "battery_daily_energy_discharged",
            Attribute::GridDailyOnGridEnergy => "grid_daily_on_grid_energy",
            Attribute::GridDailyEnergyPurchased => "grid_daily_energy_purchased",
            Attribute::GridDailyEnergyUsed => "grid_daily_energy_used",
            Attribute::GridMonthlyEnergyPurchased => "grid_monthly_energy_purchased",
            Attribute::GridMonthlyEnergyUsed => "grid_monthly_energy_used",
            Attribute::GridYearlyEnergyPurchased => "grid_yearly_energy_purchased",
            Attribute::GridYearlyEnergyUsed => "grid_yearly_energy_used",
            Attribute::GridTotalOnGridEnergy => "grid_total_on_grid_energy",
            Attribute::GridTotalConsumptionEnergy => "grid_total_consumption_energy",
            Attribute::GridTotalPower => "grid_total_power",
            Attribute::GridTotalConsumptionPower => "grid_total_consumption_power",
            Attribute::GridTotalEnergyUsed => "grid_total_energy_used",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted measurement value.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Measurement {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Measurement::Integer(value) => Some(*value as f64),
            Measurement::Float(value) => Some(*value),
            Measurement::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Measurement::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Measurement::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Measurement::Text(value) => write!(f, "{}", value),
            Measurement::Integer(value) => write!(f, "{}", value),
            Measurement::Float(value) => write!(f, "{}", value),
        }
    }
}

/// Measurement set for one inverter from one fetch.
#[derive(Debug, Clone)]
pub struct InverterData {
    data: HashMap<Attribute, Measurement>,
}

impl InverterData {
    pub(crate) fn new(data: HashMap<Attribute, Measurement>) -> Self {
        InverterData { data }
    }

    pub fn get(&self, attribute: Attribute) -> Option<&Measurement> {
        self.data.get(&attribute)
    }

    /// Serial number of the inverter this set was measured on.
    pub fn serial(&self) -> Option<&str> {
        self.get(Attribute::Serial).and_then(Measurement::as_text)
    }

    /// All available measurements, with `state` moved to the front so the
    /// energy today fix never races the state update.
    pub fn keys(&self) -> Vec<Attribute> {
        let mut available: Vec<Attribute> = self.data.keys().copied().collect();
        if let Some(position) = available.iter().position(|a| *a == Attribute::State) {
            available.remove(position);
            available.insert(0, Attribute::State);
        }
        available
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
