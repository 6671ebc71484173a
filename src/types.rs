use image::RgbImage;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One decoded video frame, RGB8.
pub type Frame = RgbImage;

/// Per-frame emotion vectors keyed by the zero-based person index.
/// Iteration order is the order the classifier produced them in.
pub type FrameEmotions = BTreeMap<usize, EmotionVector>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clip to a `width` x `height` image. Returns `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x = self.x.max(0.0);
        let y = self.y.max(0.0);
        let right = (self.x + self.width).min(width as f32);
        let bottom = (self.y + self.height).min(height as f32);
        if right - x < 1.0 || bottom - y < 1.0 {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }
}

/// Frame after face detection: boxes are drawn, rectangles kept for the classifier.
#[derive(Debug, Clone)]
pub struct Annotated {
    pub frame: Frame,
    pub faces: Vec<Rect>,
}

/// Title of a polar plot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Person(usize),
    Unknown,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Displayed one-based to match the log keys
            Identity::Person(idx) => write!(f, "person {}", idx + 1),
            Identity::Unknown => write!(f, "unknown"),
        }
    }
}

/// Ordered label -> probability mapping for one person in one frame.
///
/// Serialized as a JSON object whose key order is the label order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmotionVector {
    entries: Vec<(String, f32)>,
}

impl EmotionVector {
    /// Pair `labels` with `probs` positionally. Extra values on either side are dropped.
    pub fn from_labels(labels: &[String], probs: &[f32]) -> Self {
        Self {
            entries: labels
                .iter()
                .zip(probs.iter())
                .map(|(l, p)| (l.clone(), *p))
                .collect(),
        }
    }

    /// Every label mapped to 0.0.
    pub fn zeros<S: AsRef<str>>(labels: &[S]) -> Self {
        Self {
            entries: labels.iter().map(|l| (l.as_ref().to_string(), 0.0)).collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    #[cfg(test)]
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    #[cfg(test)]
    pub fn total(&self) -> f32 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    /// Label with the highest probability.
    pub fn dominant(&self) -> Option<(&str, f32)> {
        self.entries
            .iter()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(l, p)| (l.as_str(), *p))
    }
}

impl Serialize for EmotionVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, prob) in &self.entries {
            map.serialize_entry(label, prob)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EmotionVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VectorVisitor;

        impl<'de> Visitor<'de> for VectorVisitor {
            type Value = EmotionVector;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of emotion label to probability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, prob)) = access.next_entry::<String, f32>()? {
                    entries.push((label, prob));
                }
                Ok(EmotionVector { entries })
            }
        }

        deserializer.deserialize_map(VectorVisitor)
    }
}
