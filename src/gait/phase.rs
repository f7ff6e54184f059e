use std::{fmt, sync::Arc};

use serde::{Serialize, Serializer};

use crate::error::FrameError;

use super::classifier::{FeatureScaler, PhaseClassifier};
use super::features::FeatureVector;

/// The eight sub-phases of the walking cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GaitPhase {
    InitialContact,
    LoadingResponse,
    MidStance,
    TerminalStance,
    PreSwing,
    InitialSwing,
    MidSwing,
    TerminalSwing,
}

/// Category names the phase model was trained with, and their phase.
const MODEL_LABELS: [(&str, GaitPhase); 8] = [
    ("CONTACTO INICIAL", GaitPhase::InitialContact),
    ("RESPUESTA A LA CARGA", GaitPhase::LoadingResponse),
    ("APOYO MEDIO", GaitPhase::MidStance),
    ("APOYO FINAL", GaitPhase::TerminalStance),
    ("PRE OSCILACION", GaitPhase::PreSwing),
    ("OSCILACION INICIAL", GaitPhase::InitialSwing),
    ("OSCILACION MEDIA", GaitPhase::MidSwing),
    ("OSCILACION FINAL", GaitPhase::TerminalSwing),
];

impl GaitPhase {
    pub fn from_model_label(label: &str) -> Option<Self> {
        MODEL_LABELS
            .iter()
            .find(|(raw, _)| *raw == label)
            .map(|(_, phase)| *phase)
    }

    pub fn display(&self) -> &'static str {
        match self {
            GaitPhase::InitialContact => "INITIAL CONTACT",
            GaitPhase::LoadingResponse => "LOADING RESPONSE",
            GaitPhase::MidStance => "MID-STANCE",
            GaitPhase::TerminalStance => "TERMINAL STANCE",
            GaitPhase::PreSwing => "PRE-SWING",
            GaitPhase::InitialSwing => "INITIAL SWING",
            GaitPhase::MidSwing => "MID-SWING",
            GaitPhase::TerminalSwing => "TERMINAL SWING",
        }
    }
}

/// What the Phase column of a row says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseLabel {
    Phase(GaitPhase),
    /// Model category with no display mapping, shown verbatim.
    Unmapped(String),
    NoPerson,
    /// Not both chains visible, so nothing was classified.
    NoPhase,
    FrameError,
}

impl PhaseLabel {
    /// Map a raw model label; unknown labels pass through so a retrained model
    /// with new categories keeps working.
    pub fn from_model_label(label: &str) -> Self {
        match GaitPhase::from_model_label(label) {
            Some(phase) => PhaseLabel::Phase(phase),
            None => PhaseLabel::Unmapped(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PhaseLabel::Phase(phase) => phase.display(),
            PhaseLabel::Unmapped(raw) => raw,
            PhaseLabel::NoPerson => "NO PERSON",
            PhaseLabel::NoPhase => "NO PHASE",
            PhaseLabel::FrameError => "FRAME ERROR",
        }
    }

    pub fn is_prediction(&self) -> bool {
        matches!(self, PhaseLabel::Phase(_) | PhaseLabel::Unmapped(_))
    }
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PhaseLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Scales a feature vector, classifies it, and maps the result for display.
#[derive(Clone)]
pub struct PhaseAnnotator {
    scaler: FeatureScaler,
    classifier: Arc<dyn PhaseClassifier>,
}

impl PhaseAnnotator {
    pub fn new(scaler: FeatureScaler, classifier: Arc<dyn PhaseClassifier>) -> Self {
        Self { scaler, classifier }
    }

    pub fn annotate(&self, features: &FeatureVector) -> Result<PhaseLabel, FrameError> {
        let scaled = self.scaler.transform(features);
        let raw = self
            .classifier
            .classify(&scaled)
            .map_err(|err| FrameError::Classifier(format!("{err:#}")))?;
        Ok(PhaseLabel::from_model_label(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Fixed(&'static str);

    impl PhaseClassifier for Fixed {
        fn classify(&self, _scaled: &[f64; FeatureVector::LEN]) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl PhaseClassifier for Failing {
        fn classify(&self, _scaled: &[f64; FeatureVector::LEN]) -> anyhow::Result<String> {
            Err(anyhow!("model unavailable"))
        }
    }

    /// Echoes the first scaled component so tests can see the scaler ran.
    struct EchoFirst;

    impl PhaseClassifier for EchoFirst {
        fn classify(&self, scaled: &[f64; FeatureVector::LEN]) -> anyhow::Result<String> {
            Ok(format!("{}", scaled[0]))
        }
    }

    #[test]
    fn every_model_label_maps_to_a_distinct_display_label() {
        let mut seen = std::collections::HashSet::new();
        for (raw, phase) in MODEL_LABELS {
            assert_eq!(PhaseLabel::from_model_label(raw), PhaseLabel::Phase(phase));
            assert!(seen.insert(phase.display()));
        }
        assert_eq!(PhaseLabel::from_model_label("APOYO MEDIO").as_str(), "MID-STANCE");
        assert_eq!(PhaseLabel::from_model_label("PRE OSCILACION").as_str(), "PRE-SWING");
    }

    #[test]
    fn unmapped_labels_pass_through() {
        let label = PhaseLabel::from_model_label("DOBLE APOYO");
        assert_eq!(label, PhaseLabel::Unmapped("DOBLE APOYO".into()));
        assert_eq!(label.to_string(), "DOBLE APOYO");
        assert!(label.is_prediction());
        assert!(!PhaseLabel::NoPhase.is_prediction());
    }

    #[test]
    fn annotator_scales_before_classifying() {
        let scaler = FeatureScaler::new(vec![10.0; 9], vec![5.0; 9]).unwrap();
        let annotator = PhaseAnnotator::new(scaler, Arc::new(EchoFirst));
        let label = annotator.annotate(&FeatureVector([20.0; 9])).unwrap();
        assert_eq!(label, PhaseLabel::Unmapped("2".into()));
    }

    #[test]
    fn annotator_maps_classifier_output() {
        let annotator = PhaseAnnotator::new(FeatureScaler::identity(), Arc::new(Fixed("OSCILACION FINAL")));
        let label = annotator.annotate(&FeatureVector([0.0; 9])).unwrap();
        assert_eq!(label, PhaseLabel::Phase(GaitPhase::TerminalSwing));
    }

    #[test]
    fn classifier_failure_is_a_frame_error() {
        let annotator = PhaseAnnotator::new(FeatureScaler::identity(), Arc::new(Failing));
        let err = annotator.annotate(&FeatureVector([0.0; 9])).unwrap_err();
        assert!(matches!(err, FrameError::Classifier(msg) if msg.contains("model unavailable")));
    }

    #[test]
    fn sentinel_labels_serialize_as_text() {
        assert_eq!(serde_json::to_string(&PhaseLabel::NoPerson).unwrap(), "\"NO PERSON\"");
    }
}
