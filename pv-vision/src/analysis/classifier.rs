//! Squat form classification
//!
//! Form labels come from a sequence classifier over a sliding window of
//! [`SquatFeatures`]. The model itself is an external collaborator behind
//! [`FormClassifier`]; [`RuleBasedSquatClassifier`] is a threshold-based
//! stand-in for deployments without a model service.
//!
//! Raw predictions are noisy, so [`PredictionSmoother`] votes over the most
//! recent predictions, weighting each vote by its confidence.

use super::squat::SquatFeatures;
use crate::error::Result;
use std::collections::VecDeque;

/// Squat form labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SquatLabel {
    Good,
    BackRound,
    BackWarp,
    Head,
    InnerThigh,
    Shallow,
    Toe,
}

impl SquatLabel {
    pub const ALL: [SquatLabel; 7] = [
        SquatLabel::Good,
        SquatLabel::BackRound,
        SquatLabel::BackWarp,
        SquatLabel::Head,
        SquatLabel::InnerThigh,
        SquatLabel::Shallow,
        SquatLabel::Toe,
    ];

    /// Label as produced by the model
    pub fn as_str(&self) -> &'static str {
        match self {
            SquatLabel::Good => "good",
            SquatLabel::BackRound => "bad_back_round",
            SquatLabel::BackWarp => "bad_back_warp",
            SquatLabel::Head => "bad_head",
            SquatLabel::InnerThigh => "bad_inner_thigh",
            SquatLabel::Shallow => "bad_shallow",
            SquatLabel::Toe => "bad_toe",
        }
    }

    /// Coaching sentence shown and spoken for the label
    pub fn explanation(&self) -> &'static str {
        match self {
            SquatLabel::Good => "Good form! Keep it up.",
            SquatLabel::BackRound => "Your back is rounding. Keep your spine neutral.",
            SquatLabel::BackWarp => "Your back is excessively arched. Maintain a neutral spine.",
            SquatLabel::Head => {
                "Head position incorrect. Look slightly downward, keeping your neck aligned with your spine."
            }
            SquatLabel::InnerThigh => "Knees collapsing inward. Keep knees aligned with toes.",
            SquatLabel::Shallow => "Squat is too shallow. Try to go deeper with proper form.",
            SquatLabel::Toe => {
                "Foot positioning issue. Keep feet shoulder-width apart with toes slightly turned out."
            }
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, SquatLabel::Good)
    }
}

/// One classifier output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: SquatLabel,
    /// In [0, 1]
    pub confidence: f64,
}

/// Sequence classifier over a full feature window
pub trait FormClassifier: Send + Sync {
    /// Classify the window, oldest frame first
    ///
    /// `Ok(None)` means the classifier declined to label this window.
    fn classify(&self, window: &[SquatFeatures]) -> Result<Option<Prediction>>;
}

/// Thresholds for [`RuleBasedSquatClassifier`]
#[derive(Debug, Clone)]
pub struct RuleThresholds {
    /// Head-torso angle above this is a head error
    pub max_head_torso: f64,
    /// Torso lean from vertical above this counts as rounding
    pub max_torso_lean: f64,
    /// Torso lean below this while deep counts as over-arching
    pub min_torso_lean_at_depth: f64,
    /// Knee separation below this fraction of hip width counts as collapse
    pub min_knee_separation: f64,
    /// Ankle separation range, as a fraction of hip width
    pub ankle_separation: (f64, f64),
    /// Depth reached by the window's deepest frame to count as a real descent
    pub descent_depth: f64,
    /// Depth a descent must reach to not be shallow
    pub full_depth: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            max_head_torso: 45.0,
            max_torso_lean: 50.0,
            min_torso_lean_at_depth: 5.0,
            min_knee_separation: 0.7,
            ankle_separation: (0.8, 2.5),
            descent_depth: -0.2,
            full_depth: -0.1,
        }
    }
}

/// Threshold checks over the window's deepest frame
#[derive(Debug, Clone, Default)]
pub struct RuleBasedSquatClassifier {
    pub thresholds: RuleThresholds,
}

impl FormClassifier for RuleBasedSquatClassifier {
    fn classify(&self, window: &[SquatFeatures]) -> Result<Option<Prediction>> {
        let t = &self.thresholds;
        let Some(deepest) = window
            .iter()
            .max_by(|a, b| a.average_depth().total_cmp(&b.average_depth()))
        else {
            return Ok(None);
        };

        let depth = deepest.average_depth();
        let descended = depth >= t.descent_depth;
        let at_depth = depth >= t.full_depth;

        let label = if deepest.head_torso_angle > t.max_head_torso {
            SquatLabel::Head
        } else if deepest.torso_vertical_angle > t.max_torso_lean {
            SquatLabel::BackRound
        } else if at_depth && deepest.torso_vertical_angle < t.min_torso_lean_at_depth {
            SquatLabel::BackWarp
        } else if descended && deepest.knee_distance < t.min_knee_separation {
            SquatLabel::InnerThigh
        } else if deepest.ankle_distance < t.ankle_separation.0
            || deepest.ankle_distance > t.ankle_separation.1
        {
            SquatLabel::Toe
        } else if descended && !at_depth {
            SquatLabel::Shallow
        } else {
            SquatLabel::Good
        };

        // Rules have no calibrated probability; fixed confidence keeps the vote unweighted
        Ok(Some(Prediction {
            label,
            confidence: 0.8,
        }))
    }
}

/// Confidence-weighted vote over the most recent predictions
#[derive(Debug, Clone)]
pub struct PredictionSmoother {
    capacity: usize,
    recent: VecDeque<Prediction>,
}

impl PredictionSmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, prediction: Prediction) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(prediction);
    }

    /// Winning label with its mean confidence
    ///
    /// Ties on total confidence go to the label predicted most recently.
    pub fn current(&self) -> Option<Prediction> {
        let mut totals: Vec<(SquatLabel, f64, u32)> = Vec::new();
        // Newest first so the first label to reach a tied total is the most recent
        for p in self.recent.iter().rev() {
            match totals.iter_mut().find(|(label, _, _)| *label == p.label) {
                Some(entry) => {
                    entry.1 += p.confidence;
                    entry.2 += 1;
                }
                None => totals.push((p.label, p.confidence, 1)),
            }
        }

        let mut best: Option<(SquatLabel, f64, u32)> = None;
        for entry in totals {
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }

        best.map(|(label, total, count)| Prediction {
            label,
            confidence: total / count as f64,
        })
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::super::squat::SquatPosture;

    fn p(label: SquatLabel, confidence: f64) -> Prediction {
        Prediction { label, confidence }
    }

    /// Upright, knees and feet hip-width apart, hips just above the knees
    fn good_posture() -> SquatPosture {
        SquatPosture {
            left_knee_angle: 95.0,
            right_knee_angle: 95.0,
            left_hip_angle: 100.0,
            right_hip_angle: 100.0,
            torso_vertical_angle: 20.0,
            head_torso_angle: 15.0,
            knee_distance: 1.0,
            ankle_distance: 1.2,
            left_depth: -0.05,
            right_depth: -0.05,
        }
    }

    fn depth(posture: SquatPosture, depth: f64) -> SquatPosture {
        SquatPosture {
            left_depth: depth,
            right_depth: depth,
            ..posture
        }
    }

    fn label_of(postures: &[SquatPosture]) -> SquatLabel {
        let window: Vec<_> = postures
            .iter()
            .map(|posture| SquatFeatures::new(*posture, None, 30.0))
            .collect();
        RuleBasedSquatClassifier::default()
            .classify(&window)
            .unwrap()
            .unwrap()
            .label
    }

    #[test]
    fn each_rule_yields_its_label() {
        let good = good_posture();
        let cases = [
            (good, SquatLabel::Good),
            (
                SquatPosture {
                    head_torso_angle: 60.0,
                    ..good
                },
                SquatLabel::Head,
            ),
            (
                SquatPosture {
                    torso_vertical_angle: 60.0,
                    ..good
                },
                SquatLabel::BackRound,
            ),
            (
                SquatPosture {
                    torso_vertical_angle: 2.0,
                    ..good
                },
                SquatLabel::BackWarp,
            ),
            (
                SquatPosture {
                    knee_distance: 0.5,
                    ..good
                },
                SquatLabel::InnerThigh,
            ),
            (
                SquatPosture {
                    ankle_distance: 3.0,
                    ..good
                },
                SquatLabel::Toe,
            ),
            (depth(good, -0.15), SquatLabel::Shallow),
        ];

        for (posture, expected) in cases {
            assert_eq!(label_of(&[posture]), expected, "{:?}", posture);
        }
    }

    #[test]
    fn earlier_rules_take_priority() {
        let good = good_posture();
        let everything_wrong = SquatPosture {
            head_torso_angle: 60.0,
            torso_vertical_angle: 60.0,
            knee_distance: 0.5,
            ankle_distance: 3.0,
            ..good
        };
        assert_eq!(label_of(&[everything_wrong]), SquatLabel::Head);

        let no_head = SquatPosture {
            head_torso_angle: 15.0,
            ..everything_wrong
        };
        assert_eq!(label_of(&[no_head]), SquatLabel::BackRound);

        let knees_and_feet = SquatPosture {
            torso_vertical_angle: 20.0,
            ..no_head
        };
        assert_eq!(label_of(&[knees_and_feet]), SquatLabel::InnerThigh);

        let feet_and_shallow = depth(
            SquatPosture {
                knee_distance: 1.0,
                ..knees_and_feet
            },
            -0.15,
        );
        assert_eq!(label_of(&[feet_and_shallow]), SquatLabel::Toe);
    }

    #[test]
    fn depth_gated_rules_need_a_descent() {
        let good = good_posture();

        // Knees together while standing is not a collapse
        let standing_knees = depth(
            SquatPosture {
                knee_distance: 0.5,
                ..good
            },
            -0.4,
        );
        assert_eq!(label_of(&[standing_knees]), SquatLabel::Good);

        // Upright torso only counts as arching at full depth
        let upright_half_squat = depth(
            SquatPosture {
                torso_vertical_angle: 2.0,
                ..good
            },
            -0.15,
        );
        assert_eq!(label_of(&[upright_half_squat]), SquatLabel::Shallow);
    }

    #[test]
    fn deepest_frame_decides() {
        let good = good_posture();
        let standing_head_down = depth(
            SquatPosture {
                head_torso_angle: 60.0,
                ..good
            },
            -0.4,
        );
        assert_eq!(label_of(&[standing_head_down, good]), SquatLabel::Good);

        let deep_head_down = SquatPosture {
            head_torso_angle: 60.0,
            ..good
        };
        assert_eq!(
            label_of(&[depth(good, -0.4), deep_head_down, depth(good, -0.3)]),
            SquatLabel::Head
        );
    }

    #[test]
    fn rule_predictions_vote_evenly() {
        let good = good_posture();
        let mut smoother = PredictionSmoother::new(3);
        let classifier = RuleBasedSquatClassifier::default();
        for posture in [good, depth(good, -0.15), depth(good, -0.15)] {
            let window = [SquatFeatures::new(posture, None, 30.0)];
            smoother.push(classifier.classify(&window).unwrap().unwrap());
        }
        let current = smoother.current().unwrap();
        assert_eq!(current.label, SquatLabel::Shallow);
        assert!((current.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn labels_are_distinct_and_explained() {
        let names: std::collections::HashSet<_> =
            SquatLabel::ALL.iter().map(|l| l.as_str()).collect();
        assert_eq!(names.len(), SquatLabel::ALL.len());
        for label in SquatLabel::ALL {
            assert!(!label.explanation().is_empty());
            assert_eq!(label.is_good(), label == SquatLabel::Good);
        }
    }

    #[test]
    fn majority_wins_with_mean_confidence() {
        let mut smoother = PredictionSmoother::new(5);
        smoother.push(p(SquatLabel::Good, 0.9));
        smoother.push(p(SquatLabel::Head, 0.6));
        smoother.push(p(SquatLabel::Good, 0.7));

        let current = smoother.current().unwrap();
        assert_eq!(current.label, SquatLabel::Good);
        assert!((current.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn confident_minority_can_outvote() {
        let mut smoother = PredictionSmoother::new(5);
        smoother.push(p(SquatLabel::Good, 0.2));
        smoother.push(p(SquatLabel::Good, 0.2));
        smoother.push(p(SquatLabel::Toe, 0.95));
        assert_eq!(smoother.current().unwrap().label, SquatLabel::Toe);
    }

    #[test]
    fn window_forgets_old_predictions() {
        let mut smoother = PredictionSmoother::new(2);
        smoother.push(p(SquatLabel::Head, 0.9));
        smoother.push(p(SquatLabel::Good, 0.5));
        smoother.push(p(SquatLabel::Good, 0.5));
        assert_eq!(smoother.current().unwrap().label, SquatLabel::Good);

        smoother.reset();
        assert!(smoother.current().is_none());
    }

    #[test]
    fn tie_goes_to_most_recent() {
        let mut smoother = PredictionSmoother::new(5);
        smoother.push(p(SquatLabel::Head, 0.5));
        smoother.push(p(SquatLabel::Good, 0.5));
        assert_eq!(smoother.current().unwrap().label, SquatLabel::Good);
    }

    #[test]
    fn empty_window_is_not_labelled() {
        let classifier = RuleBasedSquatClassifier::default();
        assert!(classifier.classify(&[]).unwrap().is_none());
    }
}
