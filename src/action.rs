//! Manually recorded machine actions (new coffee pack, cleaning, descaling).

use crate::error::AppError;
use crate::sink::{ACTIONS_MEASUREMENT, DataPoint, FieldValue, Measurement, Sink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Generic,
    Maintenance,
}

impl ActionCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionCategory::Generic => "generic",
            ActionCategory::Maintenance => "maintenance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    NewCoffeePack,
    /// Back flush with a cleaning agent.
    BackFlush,
    DescaleBrewGroup,
    DescalePressureReliefValve,
    DescaleExpansionValve,
    /// Full descaling of the machine, seals included.
    DescaleFull,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::NewCoffeePack,
        ActionType::BackFlush,
        ActionType::DescaleBrewGroup,
        ActionType::DescalePressureReliefValve,
        ActionType::DescaleExpansionValve,
        ActionType::DescaleFull,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::NewCoffeePack => "new_coffee_pack",
            ActionType::BackFlush => "back_flush",
            ActionType::DescaleBrewGroup => "descale_brew_group",
            ActionType::DescalePressureReliefValve => "descale_pressure_relief_valve",
            ActionType::DescaleExpansionValve => "descale_expansion_valve",
            ActionType::DescaleFull => "descale_full",
        }
    }

    pub fn category(self) -> ActionCategory {
        match self {
            ActionType::NewCoffeePack => ActionCategory::Generic,
            _ => ActionCategory::Maintenance,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::InvalidAction(value.to_string()))
    }
}

/// Category of a raw action type string, if it names a known action.
pub fn categorize(value: &str) -> Option<ActionCategory> {
    value.parse::<ActionType>().ok().map(ActionType::category)
}

pub fn record_action(
    sink: &dyn Sink,
    database: &str,
    timestamp: SystemTime,
    action: ActionType,
) -> Result<(), AppError> {
    let category = action.category();
    let point = DataPoint {
        timestamp,
        tags: [
            ("action_type".to_string(), action.as_str().to_string()),
            ("action_category".to_string(), category.as_str().to_string()),
        ]
        .into_iter()
        .collect(),
        fields: [
            ("type".to_string(), FieldValue::Text(title_case(action.as_str()))),
            ("category".to_string(), FieldValue::Text(title_case(category.as_str()))),
        ]
        .into_iter()
        .collect(),
    };

    sink.emit_data_points(&Measurement::new(database, ACTIONS_MEASUREMENT), &[point])?;
    info!(action = %action, category = category.as_str(), "Recorded action");
    Ok(())
}

fn title_case(value: &str) -> String {
    value
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
