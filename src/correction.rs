//! Retroactive fixes for brews that were already persisted, e.g. a shot the
//! classifier got wrong.

use crate::brew::ShotType;
use crate::error::AppError;
use crate::sink::{
    BREW_MEASUREMENT, FieldValue, Fields, Measurement, SUMMARY_MEASUREMENT, Sink, SinkError, Tag,
};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrewCorrection {
    pub shot_type: ShotType,
    #[serde(default)]
    pub beans_weight: Option<f64>,
    #[serde(default)]
    pub grind_setting: Option<f64>,
}

impl BrewCorrection {
    fn extra_fields(&self) -> Fields {
        let mut fields = Fields::new();
        if let Some(beans_weight) = self.beans_weight.filter(|weight| *weight > 0.0) {
            fields.insert("beans_weight".to_string(), FieldValue::Float(beans_weight));
        }
        if let Some(grind_setting) = self.grind_setting.filter(|setting| *setting > 0.0) {
            fields.insert("grind_setting".to_string(), FieldValue::Float(grind_setting));
        }
        fields
    }
}

/// Retag the stored summary and sample series of brew `brew_id`, in that order.
pub fn correct_brew(
    sink: &dyn Sink,
    database: &str,
    brew_id: &str,
    correction: &BrewCorrection,
) -> Result<(), AppError> {
    if correction.shot_type == ShotType::Unspecified {
        return Err(AppError::InvalidCorrection(
            "shot type must be single or double".to_string(),
        ));
    }

    let selector = Tag::new("id", brew_id);
    let replacement = Tag::new("shot_type", correction.shot_type.to_string());
    let extra_fields = correction.extra_fields();

    // The summary goes first: a brew without one is unknown and stays untouched.
    sink.modify_measurement(
        &Measurement::new(database, SUMMARY_MEASUREMENT),
        &selector,
        &replacement,
        &extra_fields,
    )
    .map_err(|err| match err {
        SinkError::NotFound(_) => AppError::UnknownBrew(brew_id.to_string()),
        other => AppError::Sink(other),
    })?;

    sink.modify_measurement(
        &Measurement::new(database, BREW_MEASUREMENT),
        &selector,
        &replacement,
        &extra_fields,
    )
    .map_err(|source| {
        warn!(brew_id, error = %source, "Brew summary corrected but sample series was not");
        AppError::PartialCorrection {
            brew_id: brew_id.to_string(),
            source,
        }
    })?;

    info!(
        brew_id,
        shot_type = %correction.shot_type,
        "Corrected brew shot type"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DataPoint;
    use crate::sink::memory::MemorySink;
    use std::time::UNIX_EPOCH;

    fn stored_brew(sink: &MemorySink, id: &str) -> Result<(), SinkError> {
        let point = DataPoint {
            timestamp: UNIX_EPOCH,
            tags: [
                ("id".to_string(), id.to_string()),
                ("shot_type".to_string(), "single".to_string()),
            ]
            .into_iter()
            .collect(),
            fields: [("weight".to_string(), FieldValue::Float(61.64))]
                .into_iter()
                .collect(),
        };
        sink.emit_data_points(&Measurement::new("brews", "brew"), &[point.clone(), point.clone()])?;
        sink.emit_data_points(&Measurement::new("brews", "summary"), &[point])
    }

    #[test]
    fn correction_retags_brew_and_summary() -> Result<(), AppError> {
        let sink = MemorySink::new();
        stored_brew(&sink, "abc")?;
        let correction = BrewCorrection {
            shot_type: ShotType::Double,
            beans_weight: Some(18.0),
            grind_setting: Some(0.0),
        };

        correct_brew(&sink, "brews", "abc", &correction)?;

        for name in ["brew", "summary"] {
            for point in sink.points(&Measurement::new("brews", name)) {
                assert_eq!(point.tags.get("shot_type").map(String::as_str), Some("double"));
                assert_eq!(point.fields.get("beans_weight"), Some(&FieldValue::Float(18.0)));
                assert_eq!(point.fields.get("grind_setting"), None);
            }
        }
        Ok(())
    }

    #[test]
    fn unknown_brew_is_reported() -> Result<(), AppError> {
        let sink = MemorySink::new();
        stored_brew(&sink, "abc")?;
        let correction = BrewCorrection {
            shot_type: ShotType::Double,
            beans_weight: None,
            grind_setting: None,
        };

        let result = correct_brew(&sink, "brews", "other", &correction);

        assert!(matches!(result, Err(AppError::UnknownBrew(id)) if id == "other"));
        Ok(())
    }

    #[test]
    fn brew_without_summary_is_left_untouched() -> Result<(), AppError> {
        let sink = MemorySink::new();
        let point = DataPoint {
            timestamp: UNIX_EPOCH,
            tags: [
                ("id".to_string(), "abc".to_string()),
                ("shot_type".to_string(), "single".to_string()),
            ]
            .into_iter()
            .collect(),
            fields: Fields::new(),
        };
        sink.emit_data_points(&Measurement::new("brews", "brew"), &[point])?;
        let correction = BrewCorrection {
            shot_type: ShotType::Double,
            beans_weight: None,
            grind_setting: None,
        };

        let result = correct_brew(&sink, "brews", "abc", &correction);

        assert!(matches!(result, Err(AppError::UnknownBrew(_))));
        let brew = sink.points(&Measurement::new("brews", "brew"));
        assert_eq!(brew[0].tags.get("shot_type").map(String::as_str), Some("single"));
        Ok(())
    }

    #[test]
    fn missing_sample_series_reports_partial_correction() -> Result<(), AppError> {
        let sink = MemorySink::new();
        let point = DataPoint {
            timestamp: UNIX_EPOCH,
            tags: [("id".to_string(), "abc".to_string())].into_iter().collect(),
            fields: Fields::new(),
        };
        sink.emit_data_points(&Measurement::new("brews", "summary"), &[point])?;
        let correction = BrewCorrection {
            shot_type: ShotType::Single,
            beans_weight: None,
            grind_setting: None,
        };

        let result = correct_brew(&sink, "brews", "abc", &correction);

        assert!(matches!(
            result,
            Err(AppError::PartialCorrection { brew_id, source: SinkError::NotFound(_) })
                if brew_id == "abc"
        ));
        Ok(())
    }

    #[test]
    fn unspecified_shot_type_is_rejected() {
        let sink = MemorySink::new();
        let correction = BrewCorrection {
            shot_type: ShotType::Unspecified,
            beans_weight: None,
            grind_setting: None,
        };

        let result = correct_brew(&sink, "brews", "abc", &correction);

        assert!(matches!(result, Err(AppError::InvalidCorrection(_))));
    }
}
