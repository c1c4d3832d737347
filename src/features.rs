//! Feature vector construction.
//!
//! Layout (for the default 468-point face mesh and 21-point hands):
//! - `[0, 936)`: face points as (dx, dy) relative to face landmark 1
//! - `[936, 978)`: left hand as (dx, dy) relative to hand landmark 8, or 42 zeros
//! - `[978, 1020)`: right hand, same rule
//!
//! Offsets are translation-invariant but not scale-invariant. The classifier was trained on
//! exactly this normalization, so it must not change.

use serde::{Deserialize, Serialize};

use crate::error::{EmotionError, Result};
use crate::types::{LandmarkSet, Landmarks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureLayout {
    pub face_points: usize,
    pub hand_points: usize,
    /// Face landmark subtracted from every face point (1 = nose tip on the 468 mesh).
    pub face_reference: usize,
    /// Hand landmark subtracted from every point of that hand (8 = index fingertip).
    pub hand_reference: usize,
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            face_points: 468,
            hand_points: 21,
            face_reference: 1,
            hand_reference: 8,
        }
    }
}

impl FeatureLayout {
    /// Total vector length; constant whatever the hands do.
    pub fn len(&self) -> usize {
        2 * self.face_points + 2 * self.hand_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries contributed by one hand.
    pub fn hand_len(&self) -> usize {
        2 * self.hand_points
    }

    pub fn left_hand_range(&self) -> std::ops::Range<usize> {
        let start = 2 * self.face_points;
        start..start + self.hand_len()
    }

    pub fn right_hand_range(&self) -> std::ops::Range<usize> {
        let start = 2 * self.face_points + self.hand_len();
        start..start + self.hand_len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.face_reference >= self.face_points || self.hand_reference >= self.hand_points {
            return Err(EmotionError::Unavailable(format!(
                "reference landmark out of range (face {}/{}, hand {}/{})",
                self.face_reference, self.face_points, self.hand_reference, self.hand_points
            )));
        }
        Ok(())
    }

    /// Build the feature vector for one frame. `Ok(None)` when no face was found.
    pub fn build(&self, set: &LandmarkSet) -> Result<Option<FeatureVector>> {
        let face = match &set.face {
            Some(face) if !face.is_empty() => face,
            _ => return Ok(None),
        };

        let mut values = Vec::with_capacity(self.len());
        push_relative(&mut values, face, self.face_points, self.face_reference, "face")?;
        self.push_hand(&mut values, set.left_hand.as_ref(), "left hand")?;
        self.push_hand(&mut values, set.right_hand.as_ref(), "right hand")?;

        debug_assert_eq!(values.len(), self.len());
        Ok(Some(FeatureVector(values)))
    }

    fn push_hand(
        &self,
        values: &mut Vec<f32>,
        hand: Option<&Landmarks>,
        group: &'static str,
    ) -> Result<()> {
        match hand {
            Some(hand) if !hand.is_empty() => {
                push_relative(values, hand, self.hand_points, self.hand_reference, group)
            }
            _ => {
                values.extend(std::iter::repeat(0.0).take(self.hand_len()));
                Ok(())
            }
        }
    }
}

fn push_relative(
    values: &mut Vec<f32>,
    group: &Landmarks,
    expected: usize,
    reference: usize,
    name: &'static str,
) -> Result<()> {
    if group.len() != expected {
        return Err(EmotionError::LandmarkCount {
            group: name,
            expected,
            actual: group.len(),
        });
    }
    let origin = group.points[reference];
    for p in &group.points {
        values.push(p.x - origin.x);
        values.push(p.y - origin.y);
    }
    Ok(())
}

/// Fixed-length input to the emotion classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(pub Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
