//! Weight-based shot classification.
//!
//! The final poured weight is compared against the expected single and double
//! shot weights; whichever is closer wins, ties go to double.

use crate::brew::{ScannerSettings, ShotType};

/// Static per-engine metadata attached to every emitted brew.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrewMetadata {
    pub beans_weight: f64,
    pub grind_setting: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotClassifier {
    expected_single_shot_weight: f64,
    expected_double_shot_weight: f64,
    single_shot_beans_weight: f64,
    double_shot_beans_weight: f64,
    grind_setting: f64,
}

impl ShotClassifier {
    pub fn new(settings: &ScannerSettings) -> Self {
        Self {
            expected_single_shot_weight: settings.expected_single_shot_weight,
            expected_double_shot_weight: settings.expected_double_shot_weight,
            single_shot_beans_weight: settings.single_shot_beans_weight,
            double_shot_beans_weight: settings.double_shot_beans_weight,
            grind_setting: settings.grind_setting,
        }
    }

    pub fn classify(&self, final_weight: f64) -> ShotType {
        let to_single = (final_weight - self.expected_single_shot_weight).abs();
        let to_double = (final_weight - self.expected_double_shot_weight).abs();
        if to_single < to_double {
            ShotType::Single
        } else {
            ShotType::Double
        }
    }

    pub fn metadata(&self, shot_type: ShotType) -> BrewMetadata {
        let beans_weight = match shot_type {
            ShotType::Single => self.single_shot_beans_weight,
            ShotType::Double | ShotType::Unspecified => self.double_shot_beans_weight,
        };
        BrewMetadata {
            beans_weight,
            grind_setting: self.grind_setting,
        }
    }
}

impl Default for ShotClassifier {
    fn default() -> Self {
        Self::new(&ScannerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(single: f64, double: f64) -> ShotClassifier {
        ShotClassifier::new(&ScannerSettings {
            expected_single_shot_weight: single,
            expected_double_shot_weight: double,
            ..ScannerSettings::default()
        })
    }

    #[test]
    fn closer_to_single_is_single() {
        let classifier = classifier(45.0, 90.0);

        assert_eq!(classifier.classify(47.81), ShotType::Single);
        assert_eq!(classifier.classify(61.64), ShotType::Single);
    }

    #[test]
    fn closer_to_double_is_double() {
        let classifier = classifier(45.0, 90.0);

        assert_eq!(classifier.classify(86.72), ShotType::Double);
        assert_eq!(classifier.classify(82.23), ShotType::Double);
    }

    #[test]
    fn tie_resolves_to_double() {
        let classifier = classifier(30.0, 60.0);

        assert_eq!(classifier.classify(45.0), ShotType::Double);
    }

    #[test]
    fn metadata_uses_beans_weight_for_shot_type() {
        let classifier = ShotClassifier::default();

        let single = classifier.metadata(ShotType::Single);
        let double = classifier.metadata(ShotType::Double);

        assert_eq!(single.beans_weight, 8.75);
        assert_eq!(double.beans_weight, 16.0);
        assert_eq!(single.grind_setting, double.grind_setting);
    }
}
